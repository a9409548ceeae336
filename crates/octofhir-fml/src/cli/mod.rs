//! CLI functionality for the FML tool
//!
//! This module contains all CLI-related functionality including:
//! - Parsing and AST output
//! - Validation against StructureDefinition sets
//! - Output formatting

pub mod output;
pub mod parse;
pub mod validate;
