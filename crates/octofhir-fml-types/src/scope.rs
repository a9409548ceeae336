//! Rule scopes
//!
//! A scope maps variable names (group parameters, constants and rule aliases) to
//! their resolved types. A name may be bound to an unknown type (`None`) when its
//! type could not be resolved; lookups of such names succeed without a type.
//!
//! Every rule works on its own copy of the group scope so aliases cannot leak
//! into sibling rules. Rules nested under `then { }` get a [`Scope::child`] of
//! the rule scope: lookups fall through to the parent, and a nested alias may
//! shadow an outer one.

use crate::details::PropertyOrTypeDetails;
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;

/// Scope errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// The name is not bound in this scope or any parent
    #[error("`{name}` is not in scope")]
    NotInScope { name: String },

    /// The name is already bound in this layer
    #[error("Duplicate alias `{name}`")]
    DuplicateAlias { name: String },
}

/// Variable bindings visible to a rule
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: IndexMap<String, Option<PropertyOrTypeDetails>>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an empty layer on top of this scope
    pub fn child(&self) -> Self {
        Self {
            bindings: IndexMap::new(),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Enclosing scope, if this is a nested layer
    pub fn parent(&self) -> Option<&Scope> {
        self.parent.as_deref()
    }

    /// Bind a name in this layer; an existing binding is left untouched
    pub fn bind(
        &mut self,
        name: impl Into<String>,
        details: Option<PropertyOrTypeDetails>,
    ) -> Result<(), ScopeError> {
        let name = name.into();
        if self.bindings.contains_key(&name) {
            return Err(ScopeError::DuplicateAlias { name });
        }
        self.bindings.insert(name, details);
        Ok(())
    }

    /// Look up a name, innermost layer first
    pub fn lookup(&self, name: &str) -> Result<Option<&PropertyOrTypeDetails>, ScopeError> {
        match self.bindings.get(name) {
            Some(details) => Ok(details.as_ref()),
            None => match &self.parent {
                Some(parent) => parent.lookup(name),
                None => Err(ScopeError::NotInScope {
                    name: name.to_string(),
                }),
            },
        }
    }

    /// Check if a name is visible
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name) || self.parent.as_ref().is_some_and(|p| p.contains(name))
    }

    /// Visible names, outermost layer first, each name once
    pub fn names(&self) -> Vec<&str> {
        let mut names = self.parent.as_ref().map(|p| p.names()).unwrap_or_default();
        for name in self.bindings.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Bindings of this layer in binding order
    pub fn local_bindings(&self) -> &IndexMap<String, Option<PropertyOrTypeDetails>> {
        &self.bindings
    }

    /// Number of visible names
    pub fn len(&self) -> usize {
        self.names().len()
    }

    /// Check if no name is visible
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.parent.as_ref().is_none_or(|p| p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SystemType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bind_and_lookup() {
        let mut scope = Scope::new();
        scope
            .bind("v", Some(PropertyOrTypeDetails::system("v", SystemType::String)))
            .unwrap();
        scope.bind("unknown", None).unwrap();

        assert_eq!(
            scope.lookup("v").unwrap().and_then(|d| d.system_type()),
            Some(SystemType::String)
        );
        assert_eq!(scope.lookup("unknown"), Ok(None));
        assert_eq!(
            scope.lookup("missing"),
            Err(ScopeError::NotInScope { name: "missing".into() })
        );
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let mut scope = Scope::new();
        scope
            .bind("a", Some(PropertyOrTypeDetails::system("a", SystemType::Integer)))
            .unwrap();
        let err = scope
            .bind("a", Some(PropertyOrTypeDetails::system("a", SystemType::String)))
            .unwrap_err();

        assert_eq!(err.to_string(), "Duplicate alias `a`");
        assert_eq!(
            scope.lookup("a").unwrap().and_then(|d| d.system_type()),
            Some(SystemType::Integer)
        );
    }

    #[test]
    fn test_copies_are_isolated() {
        let mut group = Scope::new();
        group.bind("src", None).unwrap();

        let mut rule = group.clone();
        rule.bind("alias", None).unwrap();

        assert!(rule.contains("alias"));
        assert!(!group.contains("alias"));
        assert_eq!(rule.names(), vec!["src", "alias"]);
    }

    #[test]
    fn test_child_shadows_parent() {
        let mut rule = Scope::new();
        rule.bind("vs", Some(PropertyOrTypeDetails::system("vs", SystemType::Integer)))
            .unwrap();
        rule.bind("vt", None).unwrap();

        let mut nested = rule.child();
        assert!(!nested.is_empty());
        nested
            .bind("vs", Some(PropertyOrTypeDetails::system("vs", SystemType::String)))
            .unwrap();
        nested.bind("inner", None).unwrap();
        assert!(nested.bind("inner", None).is_err());

        assert_eq!(
            nested.lookup("vs").unwrap().and_then(|d| d.system_type()),
            Some(SystemType::String)
        );
        assert_eq!(nested.lookup("vt"), Ok(None));
        assert_eq!(nested.names(), vec!["vs", "vt", "inner"]);
        assert_eq!(nested.len(), 3);

        assert_eq!(
            rule.lookup("vs").unwrap().and_then(|d| d.system_type()),
            Some(SystemType::Integer)
        );
        assert!(!rule.contains("inner"));
        assert_eq!(nested.parent().map(Scope::len), Some(2));
    }
}
