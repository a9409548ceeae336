//! FHIR Mapping Language diagnostics and error handling
//!
//! This crate provides the error handling infrastructure shared by the FML parser,
//! AST builder, model walker and semantic validator: error codes, token spans,
//! diagnostic categories and the hard-failure error type.

mod error;
mod error_code;
mod span;

pub use error::*;
pub use error_code::*;
pub use span::*;

/// Result type for FML operations
pub type Result<T> = std::result::Result<T, FmlError>;
