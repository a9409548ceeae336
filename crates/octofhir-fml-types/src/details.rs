//! Resolved type bindings
//!
//! A [`PropertyOrTypeDetails`] pairs a dotted property path with the place its type
//! was found: a position in a StructureDefinition's element tree, or a FHIRPath
//! system type. Bindings live for one rule and are never persisted.

use crate::system_types::{SystemType, canonical_eq, system_substitute};
use octofhir_fml_model::{StructureDefinitionWalker, WalkerError, type_canonical};
use std::fmt;

/// Which model a binding was resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelSide {
    Source,
    Target,
}

impl fmt::Display for ModelSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Where a binding's type lives
#[derive(Debug, Clone, PartialEq)]
pub enum TypeTarget {
    /// An element in a StructureDefinition
    Element {
        walker: StructureDefinitionWalker,
        side: ModelSide,
    },
    /// A FHIRPath system type
    System(SystemType),
}

/// A dotted property path and its resolved type
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyOrTypeDetails {
    /// Path the binding was reached through (`src.name.given`)
    pub property_path: String,
    /// The resolved type
    pub target: TypeTarget,
}

impl PropertyOrTypeDetails {
    /// A binding to a StructureDefinition element
    pub fn element(
        property_path: impl Into<String>,
        walker: StructureDefinitionWalker,
        side: ModelSide,
    ) -> Self {
        Self {
            property_path: property_path.into(),
            target: TypeTarget::Element { walker, side },
        }
    }

    /// A binding to a system type
    pub fn system(property_path: impl Into<String>, ty: SystemType) -> Self {
        Self {
            property_path: property_path.into(),
            target: TypeTarget::System(ty),
        }
    }

    /// The element walker, when the type is a model element
    pub fn walker(&self) -> Option<&StructureDefinitionWalker> {
        match &self.target {
            TypeTarget::Element { walker, .. } => Some(walker),
            TypeTarget::System(_) => None,
        }
    }

    /// The model side, when the type is a model element
    pub fn side(&self) -> Option<ModelSide> {
        match &self.target {
            TypeTarget::Element { side, .. } => Some(*side),
            TypeTarget::System(_) => None,
        }
    }

    /// Candidate type URLs used by the compatibility check
    ///
    /// The root of a structure is its own `url|version`; any other element is each
    /// of its declared type codes as a canonical URL.
    pub fn candidate_urls(&self) -> Vec<String> {
        match &self.target {
            TypeTarget::System(ty) => vec![ty.uri()],
            TypeTarget::Element { walker, .. } if walker.is_root() => {
                vec![walker.definition().versioned_url()]
            }
            TypeTarget::Element { walker, .. } => walker
                .declared_types()
                .iter()
                .map(|code| type_canonical(code))
                .collect(),
        }
    }

    /// The system type this binding reduces to, when it has exactly one
    pub fn system_type(&self) -> Option<SystemType> {
        if let TypeTarget::System(ty) = &self.target {
            return Some(*ty);
        }
        let urls = self.candidate_urls();
        match urls.as_slice() {
            [url] => system_substitute(url).and_then(|uri| SystemType::from_uri(&uri)),
            _ => None,
        }
    }

    /// Whether two bindings have the same candidate types
    pub fn same_structure(&self, other: &Self) -> bool {
        let left = self.candidate_urls();
        let right = other.candidate_urls();
        left.len() == right.len()
            && left
                .iter()
                .all(|l| right.iter().any(|r| canonical_eq(l, r)))
    }

    /// Navigate a dotted path below this binding
    pub async fn walk<S>(&self, segments: &[S]) -> Result<Self, WalkerError>
    where
        S: AsRef<str> + Sync,
    {
        if segments.is_empty() {
            return Ok(self.clone());
        }
        let mut path = self.property_path.clone();
        for segment in segments {
            path.push('.');
            path.push_str(segment.as_ref());
        }
        match &self.target {
            TypeTarget::Element { walker, side } => {
                let walker = walker.walk(segments).await?;
                Ok(Self::element(path, walker, *side))
            }
            TypeTarget::System(ty) => Err(WalkerError::ChildNotFound {
                path: ty.uri(),
                name: segments[0].as_ref().to_string(),
            }),
        }
    }

    /// Short human-readable type label
    pub fn type_label(&self) -> String {
        match &self.target {
            TypeTarget::System(ty) => ty.to_string(),
            TypeTarget::Element { walker, .. } if walker.is_root() => {
                walker.definition().type_field.clone()
            }
            TypeTarget::Element { walker, .. } => {
                let types = walker.declared_types();
                if types.is_empty() {
                    walker.element().path.clone()
                } else {
                    types.join(" | ")
                }
            }
        }
    }
}

impl fmt::Display for PropertyOrTypeDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.property_path, self.type_label())
    }
}
