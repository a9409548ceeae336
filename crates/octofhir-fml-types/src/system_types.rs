//! FHIRPath system types and the FHIR primitive equivalence table

use octofhir_fml_ast::Literal;
use octofhir_fml_model::{FHIR_CORE_PREFIX, FHIRPATH_SYSTEM_PREFIX};
use serde::{Deserialize, Serialize};
use std::fmt;

/// FHIRPath system types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemType {
    /// Boolean type
    Boolean,
    /// String type
    String,
    /// Integer type (32-bit signed)
    Integer,
    /// Long type (64-bit signed)
    Long,
    /// Decimal type
    Decimal,
    /// Date type
    Date,
    /// DateTime type
    DateTime,
    /// Time type
    Time,
    /// Quantity type
    Quantity,
}

impl SystemType {
    /// Get the simple name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Long => "Long",
            Self::Decimal => "Decimal",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Time => "Time",
            Self::Quantity => "Quantity",
        }
    }

    /// Get the type URI (`http://hl7.org/fhirpath/System.Boolean`)
    pub fn uri(&self) -> String {
        format!("{FHIRPATH_SYSTEM_PREFIX}{}", self.name())
    }

    /// Parse a simple name (`Boolean`) or qualified name (`System.Boolean`)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("System.").unwrap_or(name);
        let ty = match name {
            "Boolean" => Self::Boolean,
            "String" => Self::String,
            "Integer" => Self::Integer,
            "Long" => Self::Long,
            "Decimal" => Self::Decimal,
            "Date" => Self::Date,
            "DateTime" => Self::DateTime,
            "Time" => Self::Time,
            "Quantity" => Self::Quantity,
            _ => return None,
        };
        Some(ty)
    }

    /// Parse a type URI
    pub fn from_uri(uri: &str) -> Option<Self> {
        uri.strip_prefix(FHIRPATH_SYSTEM_PREFIX).and_then(Self::from_name)
    }

    /// The system type a FHIR primitive (or Quantity) code reduces to
    pub fn from_fhir_code(code: &str) -> Option<Self> {
        let ty = match code {
            "boolean" => Self::Boolean,
            "string" | "code" | "id" | "markdown" | "uri" | "url" | "canonical" | "oid"
            | "uuid" | "base64Binary" | "xhtml" => Self::String,
            "integer" | "unsignedInt" | "positiveInt" => Self::Integer,
            "integer64" => Self::Long,
            "decimal" => Self::Decimal,
            "date" => Self::Date,
            "dateTime" | "instant" => Self::DateTime,
            "time" => Self::Time,
            "Quantity" => Self::Quantity,
            _ => return None,
        };
        Some(ty)
    }

    /// The system type of a literal; `None` for the empty collection
    pub fn of_literal(literal: &Literal) -> Option<Self> {
        let ty = match literal {
            Literal::Null => return None,
            Literal::Boolean(_) => Self::Boolean,
            Literal::Integer(_) => Self::Integer,
            Literal::Decimal(_) => Self::Decimal,
            Literal::String(_) => Self::String,
            Literal::Date(_) => Self::Date,
            Literal::DateTime(_) => Self::DateTime,
            Literal::Time(_) => Self::Time,
            Literal::Quantity(_) => Self::Quantity,
        };
        Some(ty)
    }

    /// Check if this type is numeric
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Decimal)
    }

    /// Check if this type is temporal
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System.{}", self.name())
    }
}

/// Strip a `|version` suffix from a canonical URL
pub fn unversioned(url: &str) -> &str {
    url.split_once('|').map_or(url, |(base, _)| base)
}

/// Compare canonical URLs, ignoring the version when either side is unversioned
pub fn canonical_eq(left: &str, right: &str) -> bool {
    match (left.split_once('|'), right.split_once('|')) {
        (Some(_), Some(_)) => left == right,
        _ => unversioned(left) == unversioned(right),
    }
}

/// Substitute a FHIR primitive type URL with its FHIRPath system type URI
///
/// System type URIs map to themselves; anything else has no substitute.
pub fn system_substitute(url: &str) -> Option<String> {
    let url = unversioned(url);
    if let Some(ty) = SystemType::from_uri(url) {
        return Some(ty.uri());
    }
    url.strip_prefix(FHIR_CORE_PREFIX)
        .and_then(SystemType::from_fhir_code)
        .map(|ty| ty.uri())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("boolean", Some(SystemType::Boolean))]
    #[case("markdown", Some(SystemType::String))]
    #[case("positiveInt", Some(SystemType::Integer))]
    #[case("integer64", Some(SystemType::Long))]
    #[case("instant", Some(SystemType::DateTime))]
    #[case("Quantity", Some(SystemType::Quantity))]
    #[case("HumanName", None)]
    fn test_from_fhir_code(#[case] code: &str, #[case] expected: Option<SystemType>) {
        assert_eq!(SystemType::from_fhir_code(code), expected);
    }

    #[rstest]
    #[case("http://hl7.org/fhir/StructureDefinition/boolean", Some("http://hl7.org/fhirpath/System.Boolean"))]
    #[case("http://hl7.org/fhir/StructureDefinition/boolean|4.0.1", Some("http://hl7.org/fhirpath/System.Boolean"))]
    #[case("http://hl7.org/fhirpath/System.String", Some("http://hl7.org/fhirpath/System.String"))]
    #[case("http://hl7.org/fhir/StructureDefinition/Patient", None)]
    fn test_system_substitute(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(system_substitute(url).as_deref(), expected);
    }

    #[rstest]
    #[case("http://a/X", "http://a/X|1.0", true)]
    #[case("http://a/X|1.0", "http://a/X|1.0", true)]
    #[case("http://a/X|1.0", "http://a/X|2.0", false)]
    #[case("http://a/X", "http://a/Y", false)]
    fn test_canonical_eq(#[case] left: &str, #[case] right: &str, #[case] expected: bool) {
        assert_eq!(canonical_eq(left, right), expected);
    }

    #[test]
    fn test_names() {
        assert_eq!(SystemType::from_name("System.DateTime"), Some(SystemType::DateTime));
        assert_eq!(SystemType::Decimal.to_string(), "System.Decimal");
        assert!(SystemType::Long.is_numeric());
        assert!(SystemType::Time.is_temporal());
    }
}
