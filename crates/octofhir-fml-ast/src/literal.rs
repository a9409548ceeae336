//! Literal AST nodes shared by FML rules and embedded FHIRPath

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Empty collection (`{}`)
    Null,
    /// Boolean literal (true/false)
    Boolean(bool),
    /// Integer literal
    Integer(i64),
    /// Decimal literal
    Decimal(Decimal),
    /// String literal, with escapes resolved
    String(String),
    /// Date literal, text after `@`
    Date(String),
    /// DateTime literal, text after `@`
    DateTime(String),
    /// Time literal, text after `@T`
    Time(String),
    /// Quantity literal (number with unit)
    Quantity(QuantityLiteral),
}

/// Quantity literal components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityLiteral {
    /// Numeric value
    pub value: Decimal,
    /// UCUM unit string or calendar duration keyword
    pub unit: String,
}

impl Literal {
    /// Name of the FHIR type a literal of this kind naturally produces
    ///
    /// Returns `None` for the empty collection.
    pub fn fhir_type_name(&self) -> Option<&'static str> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some("boolean"),
            Self::Integer(_) => Some("integer"),
            Self::Decimal(_) => Some("decimal"),
            Self::String(_) => Some("string"),
            Self::Date(_) => Some("date"),
            Self::DateTime(_) => Some("dateTime"),
            Self::Time(_) => Some("time"),
            Self::Quantity(_) => Some("Quantity"),
        }
    }

    /// Get the string payload of a string literal
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "{{}}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Self::Date(d) | Self::DateTime(d) => write!(f, "@{d}"),
            Self::Time(t) => write!(f, "@T{t}"),
            Self::Quantity(q) => write!(f, "{} '{}'", q.value, q.unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Literal::Boolean(true), Some("boolean"))]
    #[case(Literal::Integer(3), Some("integer"))]
    #[case(Literal::String("a".into()), Some("string"))]
    #[case(Literal::DateTime("2020-01-01T10:00:00Z".into()), Some("dateTime"))]
    #[case(Literal::Null, None)]
    fn test_fhir_type_name(#[case] literal: Literal, #[case] expected: Option<&str>) {
        assert_eq!(literal.fhir_type_name(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(Literal::String("it's".into()).to_string(), "'it\\'s'");
        assert_eq!(Literal::Time("10:00".into()).to_string(), "@T10:00");
    }
}
