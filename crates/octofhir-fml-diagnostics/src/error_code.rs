//! FML error codes following a structured numbering system
//!
//! Error code ranges:
//! - FML0001-FML0049: Parse errors (lexing, syntax)
//! - FML0050-FML0099: AST construction errors (parse tree does not match the grammar)
//! - FML0100-FML0199: Validation diagnostics (scoping, typing, shape)
//! - FML0300-FML0399: Model errors (StructureDefinitions, walker)
//! - FML0400-FML0499: System errors (I/O, configuration)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    /// Check if this is a parse error (0001-0049)
    pub const fn is_parse_error(&self) -> bool {
        self.0 >= 1 && self.0 < 50
    }

    /// Check if this is an AST construction error (0050-0099)
    pub const fn is_build_error(&self) -> bool {
        self.0 >= 50 && self.0 < 100
    }

    /// Check if this is a validation diagnostic (0100-0199)
    pub const fn is_validation_error(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// Check if this is a model error (0300-0399)
    pub const fn is_model_error(&self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Check if this is a system error (0400-0499)
    pub const fn is_system_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FML{:04}", self.0)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Parse errors (0001-0049)
    map.insert(1, ErrorInfo::new("Unexpected token"));
    map.insert(2, ErrorInfo::new("Unexpected end of input"));
    map.insert(3, ErrorInfo::new("Expected identifier"));
    map.insert(4, ErrorInfo::new("Invalid literal"));
    map.insert(5, ErrorInfo::new("Unterminated string literal"));
    map.insert(6, ErrorInfo::new("Unterminated block comment"));
    map.insert(7, ErrorInfo::new("Invalid number format"));
    map.insert(8, ErrorInfo::new("Invalid date/time format"));
    map.insert(9, ErrorInfo::new("Unexpected character"));
    map.insert(10, ErrorInfo::new("Expected expression"));
    map.insert(11, ErrorInfo::new("Expected url"));

    // AST construction (0050-0099)
    map.insert(50, ErrorInfo::new("Malformed parse tree")
        .with_help("The parse tree does not match the grammar the AST builder expects"));

    // Validation (0100-0199)
    map.insert(101, ErrorInfo::new("Type not found")
        .with_help("Declare the type with a `uses` alias or load its StructureDefinition"));
    map.insert(102, ErrorInfo::new("Identifier not in scope")
        .with_help("Aliases are only visible inside the rule that declares them and its nested rules"));
    map.insert(103, ErrorInfo::new("Element not found"));
    map.insert(104, ErrorInfo::new("Dependent group not found"));
    map.insert(105, ErrorInfo::new("No target type for mapping")
        .with_help("Declare a typed group (<<types>>) that maps the source type to the target type"));
    map.insert(106, ErrorInfo::new("Extended group not found"));
    map.insert(107, ErrorInfo::new("Undeclared concept map prefix"));
    map.insert(110, ErrorInfo::new("Duplicate alias"));
    map.insert(111, ErrorInfo::new("Duplicate declaration"));
    map.insert(120, ErrorInfo::new("Mismatched type"));
    map.insert(121, ErrorInfo::new("Invalid type cast"));
    map.insert(122, ErrorInfo::new("Ambiguous slice"));
    map.insert(130, ErrorInfo::new("Composite source in simple copy")
        .with_help("Use a full rule with a dependent group to copy complex elements"));
    map.insert(131, ErrorInfo::new("Context-only target"));
    map.insert(132, ErrorInfo::new("Dotted identifier transform")
        .with_help("Use a `then` rule or a FHIRPath transform instead"));
    map.insert(133, ErrorInfo::new("Invalid rule name"));
    map.insert(134, ErrorInfo::new("Unhandled invocation"));
    map.insert(135, ErrorInfo::new("Argument count mismatch"));
    map.insert(136, ErrorInfo::new("Invalid metadata"));
    map.insert(140, ErrorInfo::new("Expression diagnostic"));
    map.insert(150, ErrorInfo::new("Validation exception"));

    // Model errors (0300-0399)
    map.insert(300, ErrorInfo::new("StructureDefinition not found"));
    map.insert(301, ErrorInfo::new("Invalid StructureDefinition"));
    map.insert(302, ErrorInfo::new("Child element not found"));
    map.insert(303, ErrorInfo::new("Ambiguous slice"));
    map.insert(304, ErrorInfo::new("Malformed structure"));
    map.insert(305, ErrorInfo::new("Unresolvable content reference"));

    // System errors (0400-0499)
    map.insert(400, ErrorInfo::new("Internal error"));
    map.insert(401, ErrorInfo::new("I/O error"));
    map.insert(402, ErrorInfo::new("Invalid format"));

    map
});

// Parse errors
pub const FML0001: ErrorCode = ErrorCode::new(1);
pub const FML0002: ErrorCode = ErrorCode::new(2);
pub const FML0003: ErrorCode = ErrorCode::new(3);
pub const FML0004: ErrorCode = ErrorCode::new(4);
pub const FML0005: ErrorCode = ErrorCode::new(5);
pub const FML0006: ErrorCode = ErrorCode::new(6);
pub const FML0007: ErrorCode = ErrorCode::new(7);
pub const FML0008: ErrorCode = ErrorCode::new(8);
pub const FML0009: ErrorCode = ErrorCode::new(9);
pub const FML0010: ErrorCode = ErrorCode::new(10);
pub const FML0011: ErrorCode = ErrorCode::new(11);

// AST construction
pub const FML0050: ErrorCode = ErrorCode::new(50);

// Validation
pub const FML0101: ErrorCode = ErrorCode::new(101);
pub const FML0102: ErrorCode = ErrorCode::new(102);
pub const FML0103: ErrorCode = ErrorCode::new(103);
pub const FML0104: ErrorCode = ErrorCode::new(104);
pub const FML0105: ErrorCode = ErrorCode::new(105);
pub const FML0106: ErrorCode = ErrorCode::new(106);
pub const FML0107: ErrorCode = ErrorCode::new(107);
pub const FML0110: ErrorCode = ErrorCode::new(110);
pub const FML0111: ErrorCode = ErrorCode::new(111);
pub const FML0120: ErrorCode = ErrorCode::new(120);
pub const FML0121: ErrorCode = ErrorCode::new(121);
pub const FML0122: ErrorCode = ErrorCode::new(122);
pub const FML0130: ErrorCode = ErrorCode::new(130);
pub const FML0131: ErrorCode = ErrorCode::new(131);
pub const FML0132: ErrorCode = ErrorCode::new(132);
pub const FML0133: ErrorCode = ErrorCode::new(133);
pub const FML0134: ErrorCode = ErrorCode::new(134);
pub const FML0135: ErrorCode = ErrorCode::new(135);
pub const FML0136: ErrorCode = ErrorCode::new(136);
pub const FML0140: ErrorCode = ErrorCode::new(140);
pub const FML0150: ErrorCode = ErrorCode::new(150);

// Model errors
pub const FML0300: ErrorCode = ErrorCode::new(300);
pub const FML0301: ErrorCode = ErrorCode::new(301);
pub const FML0302: ErrorCode = ErrorCode::new(302);
pub const FML0303: ErrorCode = ErrorCode::new(303);
pub const FML0304: ErrorCode = ErrorCode::new(304);
pub const FML0305: ErrorCode = ErrorCode::new(305);

// System errors
pub const FML0400: ErrorCode = ErrorCode::new(400);
pub const FML0401: ErrorCode = ErrorCode::new(401);
pub const FML0402: ErrorCode = ErrorCode::new(402);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(FML0001.to_string(), "FML0001");
        assert_eq!(FML0105.to_string(), "FML0105");
    }

    #[test]
    fn test_error_ranges() {
        assert!(FML0001.is_parse_error());
        assert!(!FML0001.is_validation_error());

        assert!(FML0050.is_build_error());
        assert!(FML0110.is_validation_error());
        assert!(FML0302.is_model_error());
        assert!(FML0401.is_system_error());
    }

    #[test]
    fn test_error_info() {
        assert_eq!(FML0105.info().description, "No target type for mapping");
        assert!(FML0105.info().help.is_some());
        assert_eq!(ErrorCode::new(999).info().description, "Unknown error");
    }
}
