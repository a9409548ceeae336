//! `/// path = value` metadata and the StructureMap header they describe

use crate::{FhirStructureMap, Literal};
use octofhir_fml_diagnostics::TokenSpan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `/// path = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDeclaration {
    /// Dotted property path
    pub path: String,
    /// Value, absent for `/// path =`
    pub value: Option<MetadataValue>,
}

/// Value of a metadata declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// A literal
    Literal(Literal),
    /// A `"""triple-quoted"""` markdown block
    Markdown(String),
}

impl MetadataValue {
    fn text(&self) -> Option<&str> {
        match self {
            Self::Markdown(text) => Some(text),
            Self::Literal(Literal::String(text)) => Some(text),
            Self::Literal(Literal::Date(text) | Literal::DateTime(text)) => Some(text),
            Self::Literal(_) => None,
        }
    }
}

/// StructureMap resource properties settable through metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureMapHeader {
    pub url: Option<String>,
    pub version: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub experimental: Option<bool>,
    pub date: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub purpose: Option<String>,
    pub copyright: Option<String>,
}

/// A header property that metadata can set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    Url,
    Version,
    Name,
    Title,
    Status,
    Experimental,
    Date,
    Publisher,
    Description,
    Purpose,
    Copyright,
}

const STATUS_CODES: &[&str] = &["draft", "active", "retired", "unknown"];

impl HeaderField {
    /// Look up the field addressed by a metadata path
    pub fn from_path(path: &str) -> Option<Self> {
        let field = match path {
            "url" => Self::Url,
            "version" => Self::Version,
            "name" => Self::Name,
            "title" => Self::Title,
            "status" => Self::Status,
            "experimental" => Self::Experimental,
            "date" => Self::Date,
            "publisher" => Self::Publisher,
            "description" => Self::Description,
            "purpose" => Self::Purpose,
            "copyright" => Self::Copyright,
            _ => return None,
        };
        Some(field)
    }

    /// Store `value` into the matching header property
    pub fn apply(
        self,
        header: &mut StructureMapHeader,
        value: &MetadataValue,
    ) -> Result<(), MetadataIssueKind> {
        let slot = match self {
            Self::Experimental => {
                return match value {
                    MetadataValue::Literal(Literal::Boolean(b)) => {
                        header.experimental = Some(*b);
                        Ok(())
                    }
                    _ => Err(MetadataIssueKind::WrongValueKind { expected: "boolean" }),
                };
            }
            Self::Url => &mut header.url,
            Self::Version => &mut header.version,
            Self::Name => &mut header.name,
            Self::Title => &mut header.title,
            Self::Status => &mut header.status,
            Self::Date => &mut header.date,
            Self::Publisher => &mut header.publisher,
            Self::Description => &mut header.description,
            Self::Purpose => &mut header.purpose,
            Self::Copyright => &mut header.copyright,
        };

        let text = value
            .text()
            .ok_or(MetadataIssueKind::WrongValueKind { expected: "string" })?
            .to_string();
        if self == Self::Status && !STATUS_CODES.contains(&text.as_str()) {
            return Err(MetadataIssueKind::InvalidCode { code: text });
        }
        *slot = Some(text);
        Ok(())
    }
}

/// A metadata declaration the header could not absorb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataIssue {
    /// Metadata path
    pub path: String,
    /// What went wrong
    pub kind: MetadataIssueKind,
    /// Position of the declaration
    pub span: TokenSpan,
}

/// Kind of metadata issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataIssueKind {
    /// The path names no known header property
    UnknownPath,
    /// The value has the wrong literal kind
    WrongValueKind { expected: &'static str },
    /// The value is not an allowed code
    InvalidCode { code: String },
    /// `/// path =` with no value
    MissingValue,
}

impl fmt::Display for MetadataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MetadataIssueKind::UnknownPath => {
                write!(f, "Unknown metadata property `{}`", self.path)
            }
            MetadataIssueKind::WrongValueKind { expected } => {
                write!(f, "Metadata property `{}` expects a {} value", self.path, expected)
            }
            MetadataIssueKind::InvalidCode { code } => {
                write!(f, "Metadata property `{}` does not allow `{}`", self.path, code)
            }
            MetadataIssueKind::MissingValue => {
                write!(f, "Metadata property `{}` has no value", self.path)
            }
        }
    }
}

impl StructureMapHeader {
    /// Build the header from a map's metadata declarations
    pub fn from_structure_map(map: &FhirStructureMap) -> (Self, Vec<MetadataIssue>) {
        let mut header = Self::default();
        let mut issues = Vec::new();

        for (path, decl) in &map.metadata {
            let issue = |kind| MetadataIssue {
                path: path.clone(),
                kind,
                span: decl.span(),
            };
            let Some(field) = HeaderField::from_path(path) else {
                issues.push(issue(MetadataIssueKind::UnknownPath));
                continue;
            };
            let Some(value) = &decl.value else {
                issues.push(issue(MetadataIssueKind::MissingValue));
                continue;
            };
            if let Err(kind) = field.apply(&mut header, value) {
                issues.push(issue(kind));
            }
        }

        (header, issues)
    }
}
