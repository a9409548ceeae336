//! FML error and diagnostic types

use crate::{ErrorCode, SourceLocation, TokenSpan};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The mapping is not valid as written
    Error,
    /// Potential issue; the mapping may still be usable
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Coarse classification of a validation diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCategory {
    /// Something referenced could not be found (type, element, identifier, group)
    NotFound,
    /// A name was declared more than once
    Duplicate,
    /// Two resolved facts disagree
    Conflict,
    /// A value or shape is not acceptable
    Value,
    /// Validation of a construct failed for an internal or model reason
    Exception,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not-found",
            Self::Duplicate => "duplicate",
            Self::Conflict => "conflict",
            Self::Value => "value",
            Self::Exception => "exception",
        };
        f.write_str(name)
    }
}

/// A diagnostic message with location and context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// Category
    pub category: DiagnosticCategory,
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message, including the `line:column` of the offending node
    pub message: String,
    /// Source location
    pub location: Option<SourceLocation>,
    /// Additional context or help
    pub help: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(category: DiagnosticCategory, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            code,
            message: message.into(),
            location: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic
    pub fn warning(
        category: DiagnosticCategory,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(category, code, message)
        }
    }

    /// Attach a node position and embed `@ line:column` in the message
    pub fn at(mut self, span: TokenSpan) -> Self {
        self.message = format!("{} @ {}", self.message, span);
        self.location = Some(span.location());
        self
    }

    /// Set the location without touching the message
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Set help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render with terminal colors
    #[cfg(feature = "colored")]
    pub fn to_colored_string(&self) -> String {
        use colored::Colorize;

        let severity = match self.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
        };
        let mut out = format!(
            "{}[{}] {}: {}",
            severity,
            self.category.to_string().cyan(),
            self.code.to_string().dimmed(),
            self.message
        );
        if let Some(help) = &self.help {
            out.push_str(&format!("\n  {} {}", "help:".green(), help));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity, self.category, self.code, self.message
        )
    }
}

/// Main FML error type
///
/// These are hard failures. Expected validation problems are reported as
/// [`Diagnostic`]s instead.
#[derive(Debug, Clone, Error)]
pub enum FmlError {
    /// Lexing or syntax error
    #[error("{code}: {message}")]
    Parse {
        code: ErrorCode,
        message: String,
        location: Option<SourceLocation>,
        expected: Option<String>,
    },

    /// The parse tree handed to the AST builder does not match the grammar
    #[error("{code}: malformed {rule}: {message}")]
    Build {
        code: ErrorCode,
        rule: String,
        message: String,
        location: Option<SourceLocation>,
    },

    /// Model error (StructureDefinition loading or navigation)
    #[error("{code}: {message}")]
    Model {
        code: ErrorCode,
        message: String,
        url: Option<String>,
    },

    /// System error
    #[error("{code}: {message}")]
    System {
        code: ErrorCode,
        message: String,
        context: Option<String>,
    },
}

impl FmlError {
    /// Create a parse error
    pub fn parse(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Parse {
            code,
            message: message.into(),
            location: None,
            expected: None,
        }
    }

    /// Create a parse error with location
    pub fn parse_at(code: ErrorCode, message: impl Into<String>, location: SourceLocation) -> Self {
        Self::Parse {
            code,
            message: message.into(),
            location: Some(location),
            expected: None,
        }
    }

    /// Create an AST construction error
    pub fn build(
        code: ErrorCode,
        rule: impl Into<String>,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::Build {
            code,
            rule: rule.into(),
            message: message.into(),
            location,
        }
    }

    /// Create a model error
    pub fn model(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Model {
            code,
            message: message.into(),
            url: None,
        }
    }

    /// Create a system error
    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Attach the expected-token description to a parse error
    pub fn with_expected(mut self, what: impl Into<String>) -> Self {
        if let Self::Parse { expected, .. } = &mut self {
            *expected = Some(what.into());
        }
        self
    }

    /// Attach a canonical URL to a model error
    pub fn with_url(mut self, value: impl Into<String>) -> Self {
        if let Self::Model { url, .. } = &mut self {
            *url = Some(value.into());
        }
        self
    }

    /// Attach context to a system error
    pub fn with_context(mut self, value: impl Into<String>) -> Self {
        if let Self::System { context, .. } = &mut self {
            *context = Some(value.into());
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { code, .. }
            | Self::Build { code, .. }
            | Self::Model { code, .. }
            | Self::System { code, .. } => *code,
        }
    }

    /// Get the location if available
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Parse { location, .. } | Self::Build { location, .. } => location.as_ref(),
            _ => None,
        }
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let message = match self {
            Self::Parse {
                message, expected, ..
            } => match expected {
                Some(expected) => format!("{message} (expected {expected})"),
                None => message.clone(),
            },
            Self::Build { rule, message, .. } => format!("malformed {rule}: {message}"),
            Self::Model { message, .. } | Self::System { message, .. } => message.clone(),
        };
        let mut diag = Diagnostic::error(DiagnosticCategory::Exception, self.code(), message);
        if let Some(location) = self.location() {
            diag.message = format!("{} @ {}", diag.message, location);
            diag = diag.with_location(location.clone());
        }
        if let Self::System {
            context: Some(context),
            ..
        } = self
        {
            diag = diag.with_help(context.clone());
        }
        diag
    }
}

impl From<std::io::Error> for FmlError {
    fn from(err: std::io::Error) -> Self {
        Self::system(crate::FML0401, err.to_string())
    }
}
