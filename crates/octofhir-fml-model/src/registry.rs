//! In-memory StructureDefinition registry implementing ModelResolver

use crate::resolver::{ModelResolver, ModelResolverError};
use crate::StructureDefinition;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// StructureDefinitions indexed by `url` and `url|version`
#[derive(Clone, Default)]
pub struct StructureDefinitionRegistry {
    definitions: Arc<RwLock<IndexMap<String, Arc<StructureDefinition>>>>,
    fhir_version: Option<String>,
}

impl StructureDefinitionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Label the FHIR release this registry represents (`4.0.1`, `5.0.0`, ...)
    pub fn with_fhir_version(mut self, fhir_version: impl Into<String>) -> Self {
        self.fhir_version = Some(fhir_version.into());
        self
    }

    /// Create a registry holding the given definitions
    pub fn from_definitions(definitions: impl IntoIterator<Item = StructureDefinition>) -> Self {
        let registry = Self::new();
        for sd in definitions {
            registry.insert(sd);
        }
        registry
    }

    /// Load a StructureDefinition or a Bundle of them from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ModelResolverError> {
        let registry = Self::new();
        registry.load_json(json)?;
        Ok(registry)
    }

    /// Register a definition under its url and, when versioned, `url|version`
    ///
    /// A later definition with the same key replaces the earlier one.
    pub fn insert(&self, sd: StructureDefinition) {
        let sd = Arc::new(sd);
        let mut definitions = self.definitions.write();
        if sd.version.is_some() {
            definitions.insert(sd.versioned_url(), Arc::clone(&sd));
        }
        log::debug!("registered StructureDefinition {}", sd.versioned_url());
        definitions.insert(sd.url.clone(), sd);
    }

    /// Add every StructureDefinition in a JSON document, returning how many were added
    ///
    /// The document is a StructureDefinition or a Bundle; other resources are skipped.
    pub fn load_json(&self, json: &str) -> Result<usize, ModelResolverError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ModelResolverError::ParseError(e.to_string()))?;
        self.load_value(value)
    }

    fn load_value(&self, value: Value) -> Result<usize, ModelResolverError> {
        match value.get("resourceType").and_then(Value::as_str) {
            Some("StructureDefinition") => {
                let sd: StructureDefinition = serde_json::from_value(value)
                    .map_err(|e| ModelResolverError::InvalidResource(e.to_string()))?;
                self.insert(sd);
                Ok(1)
            }
            Some("Bundle") => {
                let entries = value
                    .get("entry")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let mut count = 0;
                for entry in entries {
                    if let Some(resource) = entry.get("resource") {
                        count += self.load_value(resource.clone())?;
                    }
                }
                Ok(count)
            }
            Some(other) => {
                log::debug!("skipping {other} resource");
                Ok(0)
            }
            None => Err(ModelResolverError::InvalidResource(
                "missing resourceType".to_string(),
            )),
        }
    }

    /// Add the definitions in one JSON file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, ModelResolverError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelResolverError::IoError(format!("{}: {}", path.display(), e)))?;
        self.load_json(&json)
    }

    /// Add the definitions in every `*.json` file of a directory
    ///
    /// Files are read in name order. Files that fail to parse are skipped with a warning.
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> Result<usize, ModelResolverError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| ModelResolverError::IoError(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();

        let mut count = 0;
        for file in files {
            match self.load_file(&file) {
                Ok(added) => count += added,
                Err(err) => log::warn!("skipping {}: {}", file.display(), err),
            }
        }
        log::debug!("loaded {} StructureDefinitions from {}", count, dir.display());
        Ok(count)
    }

    /// Load a file or a directory
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<usize, ModelResolverError> {
        let path = path.as_ref();
        if path.is_dir() {
            self.load_directory(path)
        } else {
            self.load_file(path)
        }
    }

    /// Look up a definition without going through the async resolver interface
    pub fn get(&self, canonical: &str) -> Option<Arc<StructureDefinition>> {
        self.definitions.read().get(canonical).cloned()
    }

    /// Number of distinct definitions
    pub fn len(&self) -> usize {
        self.definitions
            .read()
            .iter()
            .filter(|(key, _)| !key.contains('|'))
            .count()
    }

    /// Whether the registry holds no definitions
    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }

    /// Unversioned canonical URLs, in registration order
    pub fn urls(&self) -> Vec<String> {
        self.definitions
            .read()
            .keys()
            .filter(|key| !key.contains('|'))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for StructureDefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructureDefinitionRegistry")
            .field("definitions", &self.len())
            .field("fhir_version", &self.fhir_version)
            .finish()
    }
}

#[async_trait]
impl ModelResolver for StructureDefinitionRegistry {
    async fn resolve(
        &self,
        canonical: &str,
    ) -> Result<Option<Arc<StructureDefinition>>, ModelResolverError> {
        let found = self.get(canonical);
        match &found {
            Some(_) => log::debug!("resolved {canonical}"),
            None => log::debug!("unresolved {canonical}"),
        }
        Ok(found)
    }

    fn fhir_version(&self) -> Option<&str> {
        self.fhir_version.as_deref()
    }
}
