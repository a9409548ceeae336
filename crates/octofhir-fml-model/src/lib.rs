//! FHIR structure model for the FHIR Mapping Language
//!
//! This crate provides:
//! - A serde model of StructureDefinition and ElementDefinition
//! - The async [`ModelResolver`] trait and an in-memory [`StructureDefinitionRegistry`]
//! - [`StructureDefinitionWalker`], a cursor over a StructureDefinition's element tree
//!   that follows content references, expands types and resolves slices

pub mod registry;
pub mod resolver;
pub mod structure_definition;
pub mod walker;

pub use registry::*;
pub use resolver::*;
pub use structure_definition::*;
pub use walker::*;
