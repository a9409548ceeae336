//! Model resolver trait
//!
//! The resolver is the only collaborator that knows where StructureDefinitions come
//! from. Source and target sides of a map get independent resolvers, which is how a
//! map between two FHIR releases is validated.

use crate::StructureDefinition;
use async_trait::async_trait;
use octofhir_fml_diagnostics::{FML0301, FML0401, FmlError};
use std::sync::Arc;

/// Resolves canonical URLs to StructureDefinitions
#[async_trait]
pub trait ModelResolver: Send + Sync {
    /// Resolve a canonical URL, optionally suffixed with `|version`
    ///
    /// A miss is `Ok(None)`; errors are reserved for failures of the resolver itself.
    async fn resolve(
        &self,
        canonical: &str,
    ) -> Result<Option<Arc<StructureDefinition>>, ModelResolverError>;

    /// FHIR release this resolver serves, when known
    fn fhir_version(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
impl<T: ModelResolver + ?Sized> ModelResolver for Arc<T> {
    async fn resolve(
        &self,
        canonical: &str,
    ) -> Result<Option<Arc<StructureDefinition>>, ModelResolverError> {
        (**self).resolve(canonical).await
    }

    fn fhir_version(&self) -> Option<&str> {
        (**self).fhir_version()
    }
}

/// Model resolver error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelResolverError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Resolver unavailable: {0}")]
    Unavailable(String),
}

impl From<ModelResolverError> for FmlError {
    fn from(err: ModelResolverError) -> Self {
        match err {
            ModelResolverError::IoError(message) => FmlError::system(FML0401, message),
            other => FmlError::model(FML0301, other.to_string()),
        }
    }
}
