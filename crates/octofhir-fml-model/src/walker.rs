//! Structure definition walker
//!
//! Step-wise navigation over the element tree of a StructureDefinition. A walker is a
//! cheap, immutable cursor: every step returns a new walker. Steps that leave the
//! current definition (type expansion, absolute content references) go through the
//! [`ModelResolver`].

use crate::resolver::{ModelResolver, ModelResolverError};
use crate::structure_definition::{
    ElementDefinition, StructureDefinition, is_system_type, type_canonical,
};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexSet;
use octofhir_fml_diagnostics::{
    ErrorCode, FML0300, FML0301, FML0302, FML0303, FML0304, FML0305, FmlError,
};
use smallvec::{SmallVec, smallvec};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Type codes of an element; almost always one or two
pub type TypeCodes = SmallVec<[String; 4]>;

/// Walker error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkerError {
    #[error("Child `{name}` not found at {path}")]
    ChildNotFound { path: String, name: String },

    #[error("`{name}` matches more than one slice at {path}: {}", .candidates.join(", "))]
    AmbiguousSlice {
        path: String,
        name: String,
        candidates: Vec<String>,
    },

    #[error("Element {path} has no children, content reference or type")]
    MalformedStructure { path: String },

    #[error("Unable to resolve StructureDefinition `{url}`")]
    UnresolvableCanonical { url: String },

    #[error("Unable to resolve content reference `{reference}` at {path}")]
    UnresolvableContentReference { path: String, reference: String },

    #[error(transparent)]
    Resolver(#[from] ModelResolverError),
}

impl WalkerError {
    /// Error code of the model error range
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ChildNotFound { .. } => FML0302,
            Self::AmbiguousSlice { .. } => FML0303,
            Self::MalformedStructure { .. } => FML0304,
            Self::UnresolvableCanonical { .. } => FML0300,
            Self::UnresolvableContentReference { .. } => FML0305,
            Self::Resolver(_) => FML0301,
        }
    }
}

impl From<WalkerError> for FmlError {
    fn from(err: WalkerError) -> Self {
        let url = match &err {
            WalkerError::UnresolvableCanonical { url } => Some(url.clone()),
            _ => None,
        };
        let error = FmlError::model(err.code(), err.to_string());
        match url {
            Some(url) => error.with_url(url),
            None => error,
        }
    }
}

/// A position in the element tree of a StructureDefinition
#[derive(Clone)]
pub struct StructureDefinitionWalker {
    resolver: Arc<dyn ModelResolver>,
    definition: Arc<StructureDefinition>,
    position: usize,
    narrowed: Option<String>,
}

impl StructureDefinitionWalker {
    /// Create a walker at the root of `definition`
    pub fn new(
        resolver: Arc<dyn ModelResolver>,
        definition: Arc<StructureDefinition>,
    ) -> Result<Self, WalkerError> {
        if definition.elements().is_empty() {
            return Err(WalkerError::MalformedStructure {
                path: definition.url.clone(),
            });
        }
        Ok(Self {
            resolver,
            definition,
            position: 0,
            narrowed: None,
        })
    }

    /// Resolve a StructureDefinition and position a walker at its root
    pub async fn from_canonical(
        resolver: Arc<dyn ModelResolver>,
        url: &str,
    ) -> Result<Self, WalkerError> {
        let definition = resolver
            .resolve(url)
            .await?
            .ok_or_else(|| WalkerError::UnresolvableCanonical {
                url: url.to_string(),
            })?;
        Self::new(resolver, definition)
    }

    /// The StructureDefinition this walker is in
    pub fn definition(&self) -> &Arc<StructureDefinition> {
        &self.definition
    }

    /// The element at the current position
    pub fn element(&self) -> &ElementDefinition {
        &self.definition.elements()[self.position]
    }

    /// The resolver used for steps that leave the current definition
    pub fn resolver(&self) -> &Arc<dyn ModelResolver> {
        &self.resolver
    }

    /// Whether the walker is at the root element of its definition
    pub fn is_root(&self) -> bool {
        self.position == 0
    }

    /// Whether the current element has inline child elements
    pub fn has_children(&self) -> bool {
        self.children().next().is_some()
    }

    /// Whether the current element is a backbone element (a non-root element with inline children)
    pub fn is_backbone(&self) -> bool {
        !self.is_root()
            && (self.has_children()
                || self
                    .element()
                    .types
                    .iter()
                    .any(|t| t.code == "BackboneElement"))
    }

    /// Whether the current element holds a backbone or a complex datatype
    ///
    /// Resolves the declared types; an element typed only with primitives or
    /// system types is not composite. The root of a definition never is.
    pub async fn is_composite(&self) -> Result<bool, WalkerError> {
        if self.is_root() {
            return Ok(false);
        }
        if self.is_backbone() {
            return Ok(true);
        }
        let mut expanded = self.expand()?;
        while let Some(walker) = expanded.next().await {
            if !walker?.definition.is_primitive() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Type codes the current element may have
    ///
    /// A choice element reached through a typed name (`valueString`) is narrowed to
    /// that one type.
    pub fn declared_types(&self) -> TypeCodes {
        match &self.narrowed {
            Some(code) => smallvec![code.clone()],
            None => self.element().types.iter().map(|t| t.code.clone()).collect(),
        }
    }

    /// `url#element-id` of the current position
    pub fn canonical_path(&self) -> String {
        let key = self.element().key();
        match &self.narrowed {
            Some(code) => format!("{}#{}", self.definition.url, key.replace("[x]", &capitalize(code))),
            None => format!("{}#{}", self.definition.url, key),
        }
    }

    /// Navigate to a child element
    ///
    /// `name` may select a slice explicitly with `name:sliceName`. When the current
    /// element has no inline children, the child is searched in each of its types.
    pub fn child<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Self, WalkerError>> {
        async move {
            log::debug!("{} -> {}", self.canonical_path(), name);
            if self.has_children() {
                return self.select_child(name)?.follow_content_reference().await;
            }

            let mut expanded = self.expand()?;
            let mut failure = None;
            while let Some(next) = expanded.next().await {
                let found = match next {
                    Ok(walker) => walker.child(name).await,
                    Err(err) => Err(err),
                };
                match found {
                    Ok(walker) => return Ok(walker),
                    Err(WalkerError::ChildNotFound { .. }) => {}
                    Err(err) => {
                        failure.get_or_insert(err);
                    }
                }
            }
            Err(failure.unwrap_or_else(|| WalkerError::ChildNotFound {
                path: self.canonical_path(),
                name: name.to_string(),
            }))
        }
        .boxed()
    }

    /// Navigate a dotted path one segment at a time
    pub async fn walk<S>(&self, segments: &[S]) -> Result<Self, WalkerError>
    where
        S: AsRef<str> + Sync,
    {
        let mut current = self.clone();
        for segment in segments {
            current = current.child(segment.as_ref()).await?;
        }
        Ok(current)
    }

    /// One walker per distinct type the current element may assume
    ///
    /// An element with inline children expands to itself, and a content reference
    /// to the referenced element. FHIRPath system types have no structure and are
    /// left out.
    pub fn expand(&self) -> Result<ExpandedWalkers, WalkerError> {
        let mut pending = VecDeque::new();
        if self.has_children() {
            pending.push_back(Expansion::Ready(self.clone()));
        } else if self.element().content_reference.is_some() {
            pending.push_back(Expansion::ContentReference(self.clone()));
        } else {
            let types = self.declared_types();
            if types.is_empty() {
                return Err(WalkerError::MalformedStructure {
                    path: self.canonical_path(),
                });
            }
            let urls: IndexSet<String> = types
                .iter()
                .map(|code| type_canonical(code))
                .filter(|url| !is_system_type(url))
                .collect();
            pending.extend(urls.into_iter().map(Expansion::Canonical));
        }
        Ok(ExpandedWalkers {
            resolver: Arc::clone(&self.resolver),
            pending,
        })
    }

    fn children(&self) -> impl Iterator<Item = (usize, &ElementDefinition)> + '_ {
        let elements = self.definition.elements();
        let prefix = format!("{}.", elements[self.position].path);
        elements
            .iter()
            .enumerate()
            .skip(self.position + 1)
            .take_while(move |(_, e)| e.path.starts_with(&prefix))
    }

    fn select_child(&self, name: &str) -> Result<Self, WalkerError> {
        let (name, slice) = match name.split_once(':') {
            Some((name, slice)) => (name, Some(slice)),
            None => (name, None),
        };
        let prefix_len = self.element().path.len() + 1;

        let mut candidates: Vec<(usize, Option<String>)> = Vec::new();
        for (position, element) in self.children() {
            let segment = &element.path[prefix_len..];
            if segment.contains('.') {
                continue;
            }
            if let Some(narrowed) = match_segment(segment, element, name) {
                candidates.push((position, narrowed));
            }
        }

        if let Some(slice) = slice {
            let elements = self.definition.elements();
            candidates.retain(|(position, _)| elements[*position].slice_name.as_deref() == Some(slice));
        }

        let chosen = match candidates.len() {
            0 => {
                return Err(WalkerError::ChildNotFound {
                    path: self.canonical_path(),
                    name: name.to_string(),
                });
            }
            1 => candidates.swap_remove(0),
            // the element entry followed by its only slice
            2 => candidates.swap_remove(1),
            _ => {
                let elements = self.definition.elements();
                return Err(WalkerError::AmbiguousSlice {
                    path: self.canonical_path(),
                    name: name.to_string(),
                    candidates: candidates
                        .iter()
                        .map(|(position, _)| elements[*position].key().to_string())
                        .collect(),
                });
            }
        };

        Ok(Self {
            resolver: Arc::clone(&self.resolver),
            definition: Arc::clone(&self.definition),
            position: chosen.0,
            narrowed: chosen.1,
        })
    }

    async fn follow_content_reference(self) -> Result<Self, WalkerError> {
        let Some(reference) = self.element().content_reference.clone() else {
            return Ok(self);
        };
        let unresolvable = || WalkerError::UnresolvableContentReference {
            path: self.canonical_path(),
            reference: reference.clone(),
        };

        let (url, key) = match reference.split_once('#') {
            Some(("", key)) => (None, key),
            Some((url, key)) => (Some(url), key),
            None => (None, reference.as_str()),
        };
        let definition = match url {
            None => Arc::clone(&self.definition),
            Some(url) => self.resolver.resolve(url).await?.ok_or_else(unresolvable)?,
        };
        let position = definition.find_element(key).ok_or_else(unresolvable)?;

        log::debug!("followed content reference {reference}");
        Ok(Self {
            resolver: Arc::clone(&self.resolver),
            definition,
            position,
            narrowed: None,
        })
    }
}

/// Whether a child path segment answers to `name`, and the type it narrows to
fn match_segment(segment: &str, element: &ElementDefinition, name: &str) -> Option<Option<String>> {
    if segment == name {
        return Some(None);
    }
    let base = segment.strip_suffix("[x]")?;
    if name == base {
        return Some(None);
    }
    let suffix = name.strip_prefix(base).filter(|s| !s.is_empty())?;
    element
        .types
        .iter()
        .find(|t| capitalize(&t.code) == suffix)
        .map(|t| Some(t.code.clone()))
}

fn capitalize(code: &str) -> String {
    let mut chars = code.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl PartialEq for StructureDefinitionWalker {
    fn eq(&self, other: &Self) -> bool {
        self.definition.versioned_url() == other.definition.versioned_url()
            && self.element().key() == other.element().key()
            && self.narrowed == other.narrowed
    }
}

impl fmt::Debug for StructureDefinitionWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructureDefinitionWalker")
            .field("path", &self.canonical_path())
            .finish()
    }
}

impl fmt::Display for StructureDefinitionWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_path())
    }
}

enum Expansion {
    Ready(StructureDefinitionWalker),
    ContentReference(StructureDefinitionWalker),
    Canonical(String),
}

/// Lazily resolved walkers produced by [`StructureDefinitionWalker::expand`]
///
/// Each StructureDefinition is fetched only when its walker is requested. The
/// sequence is consumed once.
pub struct ExpandedWalkers {
    resolver: Arc<dyn ModelResolver>,
    pending: VecDeque<Expansion>,
}

impl ExpandedWalkers {
    /// The next walker, or `None` when the sequence is exhausted
    #[allow(clippy::should_implement_trait)]
    pub async fn next(&mut self) -> Option<Result<StructureDefinitionWalker, WalkerError>> {
        let expansion = self.pending.pop_front()?;
        Some(match expansion {
            Expansion::Ready(walker) => Ok(walker),
            Expansion::ContentReference(walker) => walker.follow_content_reference().await,
            Expansion::Canonical(url) => {
                StructureDefinitionWalker::from_canonical(Arc::clone(&self.resolver), &url).await
            }
        })
    }

    /// Number of walkers not yet produced
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Resolve all remaining walkers, failing on the first error
    pub async fn try_collect(mut self) -> Result<Vec<StructureDefinitionWalker>, WalkerError> {
        let mut walkers = Vec::with_capacity(self.pending.len());
        while let Some(walker) = self.next().await {
            walkers.push(walker?);
        }
        Ok(walkers)
    }
}
