//! FHIR Mapping Language (FML) implementation for Rust
//!
//! This crate bundles:
//! - Parsing FML documents into an AST
//! - Walking FHIR StructureDefinitions
//! - Type inference for embedded FHIRPath expressions
//! - Semantic validation of structure maps against source and target models
//!
//! # Example
//!
//! ```ignore
//! use octofhir_fml::{StructureDefinitionRegistry, validate};
//! use std::sync::Arc;
//!
//! let fml = r#"
//! map "http://example.org/fml/tutorial" = tutorial
//!
//! group tutorial(source src : Patient, target tgt : Patient) {
//!     src.active -> tgt.active;
//! }
//! "#;
//!
//! let registry = Arc::new(StructureDefinitionRegistry::new());
//! registry.load_path("definitions/")?;
//! let report = validate(fml, registry.clone(), registry).await?;
//! assert!(!report.has_errors());
//! ```

// Re-export all public APIs from internal crates
pub use octofhir_fml_ast as ast;
pub use octofhir_fml_diagnostics as diagnostics;
pub use octofhir_fml_model as model;
pub use octofhir_fml_parser as parser;
pub use octofhir_fml_types as types;

// Convenience re-exports
pub use octofhir_fml_ast::FhirStructureMap;
pub use octofhir_fml_diagnostics::{Diagnostic, FmlError, Result};
pub use octofhir_fml_model::{ModelResolver, StructureDefinitionRegistry};
pub use octofhir_fml_parser::{parse, parse_expression};
pub use octofhir_fml_types::{StructureMapValidator, ValidationReport, ValidatorConfig};

use std::sync::Arc;

/// Parse `source` and validate it with the default validator
///
/// Syntax errors are returned as `Err`; semantic problems are reported in the
/// [`ValidationReport`].
pub async fn validate(
    source: &str,
    source_model: Arc<dyn ModelResolver>,
    target_model: Arc<dyn ModelResolver>,
) -> Result<ValidationReport> {
    let map = parse(source)?;
    let report = StructureMapValidator::new(source_model, target_model)
        .validate(&map)
        .await;
    log::debug!(
        "validated {} group(s): {} diagnostic(s)",
        map.groups.len(),
        report.diagnostics.len()
    );
    Ok(report)
}

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;
