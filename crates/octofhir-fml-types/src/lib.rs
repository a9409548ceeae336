//! Type inference and semantic validation for the FHIR Mapping Language
//!
//! This crate validates a parsed [`FhirStructureMap`](octofhir_fml_ast::FhirStructureMap)
//! against source and target models:
//!
//! - [`StructureMapValidator`] walks groups and rules and reports [`Diagnostic`]s
//! - [`PathExpressionCompiler`] infers the types of embedded FHIRPath expressions
//! - [`Scope`] and [`PropertyOrTypeDetails`] carry resolved variable types
//! - [`TypedGroupIndex`] and [`GroupRegistry`] hold groups defined elsewhere
//!
//! [`Diagnostic`]: octofhir_fml_diagnostics::Diagnostic

pub mod compatibility;
pub mod compiler;
pub mod context;
pub mod details;
pub mod functions;
pub mod groups;
pub mod inference;
pub mod invocation;
pub mod scope;
pub mod system_types;
pub mod validator;

pub use compatibility::{UnmatchedPair, check_type_compatibility, describe_unmatched};
pub use compiler::{
    CompiledExpression, CompilerContext, ExpressionDiagnostic, FhirPathTypeCompiler,
    PathExpressionCompiler, VARIABLE_HINT,
};
pub use context::{ValidationContext, ValidationReport};
pub use details::{ModelSide, PropertyOrTypeDetails, TypeTarget};
pub use functions::{FunctionSignature, ReturnType, function_signature};
pub use groups::{GroupRegistry, TypedGroupIndex, TypedGroupKey, type_url};
pub use inference::{InferenceOutcome, infer_expression_type};
pub use invocation::{TransformReturn, builtin_transform};
pub use scope::{Scope, ScopeError};
pub use system_types::{SystemType, canonical_eq, system_substitute, unversioned};
pub use validator::{StructureMapValidator, ValidatorConfig};
