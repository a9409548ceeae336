//! Group lookup tables
//!
//! [`GroupRegistry`] finds groups by name for dependent invocations that target
//! groups declared outside the map being validated. [`TypedGroupIndex`] records
//! the `<<types>>` groups used by the compatibility check.

use crate::system_types::unversioned;
use indexmap::IndexMap;
use octofhir_fml_ast::{FhirStructureMap, GroupDeclaration, Node, ParameterMode};
use octofhir_fml_model::{ModelResolver, type_canonical};
use std::sync::Arc;

/// URL of a group parameter type name
///
/// A `uses` alias maps to its structure URL, an absolute URL is kept, and any
/// other name is taken as a FHIR core type.
pub fn type_url(map: &FhirStructureMap, type_name: &str) -> String {
    if let Some(structure) = map.structure_by_alias(type_name) {
        return structure.url.clone();
    }
    type_canonical(type_name)
}

/// Groups by name
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    groups: IndexMap<String, Node<GroupDeclaration>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of one map's groups
    pub fn from_structure_map(map: &FhirStructureMap) -> Self {
        let mut registry = Self::new();
        registry.add_structure_map(map);
        registry
    }

    /// Add every group of a map; existing names are kept
    pub fn add_structure_map(&mut self, map: &FhirStructureMap) {
        for group in map.groups.values() {
            self.insert(group.clone());
        }
    }

    /// Add a group; returns `false` when the name is taken
    pub fn insert(&mut self, group: Node<GroupDeclaration>) -> bool {
        if self.groups.contains_key(&group.name) {
            return false;
        }
        self.groups.insert(group.name.clone(), group);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Node<GroupDeclaration>> {
        self.groups.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Unversioned `(source, target)` type URL pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedGroupKey {
    pub source: String,
    pub target: String,
}

impl TypedGroupKey {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: unversioned(source).to_string(),
            target: unversioned(target).to_string(),
        }
    }
}

/// Typed groups keyed by the types they map between
#[derive(Debug, Clone, Default)]
pub struct TypedGroupIndex {
    groups: IndexMap<TypedGroupKey, String>,
}

impl TypedGroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the typed groups of a map
    pub async fn from_structure_map(
        map: &FhirStructureMap,
        source: &Arc<dyn ModelResolver>,
        target: &Arc<dyn ModelResolver>,
    ) -> Self {
        let mut index = Self::new();
        index.add_structure_map(map, source, target).await;
        index
    }

    /// Add the typed groups of a map
    ///
    /// A group is indexed when it is marked `<<types>>` or `<<type+>>`, has exactly
    /// one source and one target parameter, and both parameter types resolve.
    pub async fn add_structure_map(
        &mut self,
        map: &FhirStructureMap,
        source: &Arc<dyn ModelResolver>,
        target: &Arc<dyn ModelResolver>,
    ) {
        for group in map.groups.values() {
            if group.type_mode.is_none() {
                continue;
            }
            let sources: Vec<_> = group.parameters_with_mode(ParameterMode::Source).collect();
            let targets: Vec<_> = group.parameters_with_mode(ParameterMode::Target).collect();
            let ([src], [tgt]) = (sources.as_slice(), targets.as_slice()) else {
                log::debug!("Typed group `{}` does not have one source and one target", group.name);
                continue;
            };
            let (Some(src_type), Some(tgt_type)) = (&src.type_identifier, &tgt.type_identifier)
            else {
                continue;
            };

            let src_url = resolve_url(map, &src_type.inner, source).await;
            let tgt_url = resolve_url(map, &tgt_type.inner, target).await;
            match (src_url, tgt_url) {
                (Some(src_url), Some(tgt_url)) => {
                    self.insert(TypedGroupKey::new(&src_url, &tgt_url), group.name.clone());
                }
                _ => log::debug!("Types of typed group `{}` do not resolve", group.name),
            }
        }
    }

    /// Add an entry; the first group for a pair is kept
    pub fn insert(&mut self, key: TypedGroupKey, group: impl Into<String>) -> bool {
        if self.groups.contains_key(&key) {
            return false;
        }
        self.groups.insert(key, group.into());
        true
    }

    /// The group mapping `source` to `target`, compared without versions
    pub fn get(&self, source: &str, target: &str) -> Option<&str> {
        self.groups
            .get(&TypedGroupKey::new(source, target))
            .map(String::as_str)
    }

    pub fn contains(&self, source: &str, target: &str) -> bool {
        self.get(source, target).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypedGroupKey, &str)> {
        self.groups.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

async fn resolve_url(
    map: &FhirStructureMap,
    type_name: &str,
    resolver: &Arc<dyn ModelResolver>,
) -> Option<String> {
    let url = type_url(map, type_name);
    match resolver.resolve(&url).await {
        Ok(Some(definition)) => Some(definition.url.clone()),
        Ok(None) => None,
        Err(err) => {
            log::warn!("Failed to resolve `{url}`: {err}");
            None
        }
    }
}
