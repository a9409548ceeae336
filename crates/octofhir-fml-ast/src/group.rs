//! Group and rule AST nodes

use crate::{BoxExpr, FpExpression, Literal, Node, QualifiedIdentifier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `group name(parameters) extends base <<types>> { rules }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDeclaration {
    /// Group name (unique within a map)
    pub name: String,
    /// Parameters in declaration order
    pub parameters: Vec<Node<GroupParameter>>,
    /// Name of the group this one extends
    pub extends: Option<Node<String>>,
    /// Type mode, when the group proves a type pairing
    pub type_mode: Option<GroupTypeMode>,
    /// Rules in declaration order
    pub rules: Vec<Node<GroupExpression>>,
}

impl GroupDeclaration {
    /// Create an empty group
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            extends: None,
            type_mode: None,
            rules: Vec::new(),
        }
    }

    /// Parameters with the given mode
    pub fn parameters_with_mode(&self, mode: ParameterMode) -> impl Iterator<Item = &Node<GroupParameter>> {
        self.parameters.iter().filter(move |p| p.mode == mode)
    }
}

/// Parameter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterMode {
    /// `source`
    Source,
    /// `target`
    Target,
}

impl fmt::Display for ParameterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// `source src : Type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupParameter {
    /// Parameter mode
    pub mode: ParameterMode,
    /// Parameter name
    pub identifier: String,
    /// Declared type (alias or type name)
    pub type_identifier: Option<Node<String>>,
}

/// `<<types>>` / `<<type+>>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupTypeMode {
    /// `types`: the group is the default mapping for its parameter types
    Types,
    /// `type+`: as `types`, and also usable when the types are inferred
    TypeAndTypes,
}

impl GroupTypeMode {
    /// Parse from grammar text
    pub fn from_keyword(text: &str) -> Option<Self> {
        match text {
            "types" => Some(Self::Types),
            "type+" => Some(Self::TypeAndTypes),
            _ => None,
        }
    }
}

/// One statement inside a group body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupExpression {
    /// `src.a -> tgt.b;`
    SimpleCopy(SimpleCopyExpression),
    /// A bare FHIRPath statement
    FhirPath(FhirPathStatement),
    /// A full mapping rule
    Mapping(MappingExpression),
}

impl GroupExpression {
    /// Explicit rule name, if any
    pub fn name(&self) -> Option<&Node<String>> {
        match self {
            Self::SimpleCopy(copy) => copy.name.as_ref(),
            Self::Mapping(rule) => rule.name.as_ref(),
            Self::FhirPath(_) => None,
        }
    }
}

/// Source path to target path shorthand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCopyExpression {
    /// Source path
    pub source: Node<QualifiedIdentifier>,
    /// Target path
    pub target: Node<QualifiedIdentifier>,
    /// Optional rule name
    pub name: Option<Node<String>>,
}

/// A FHIRPath expression used as a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FhirPathStatement {
    /// The expression
    pub expression: Node<FpExpression>,
}

/// `sources -> targets then dependent "name";`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingExpression {
    /// Sources, left to right
    pub sources: Vec<Node<FmlExpressionSource>>,
    /// Targets, left to right
    pub targets: Vec<Node<FmlExpressionTarget>>,
    /// `then` clause
    pub dependent: Option<Node<DependentExpression>>,
    /// Optional rule name
    pub name: Option<Node<String>>,
}

/// A rule source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmlExpressionSource {
    /// Source path
    pub identifier: Node<QualifiedIdentifier>,
    /// `: type` cast
    pub type_identifier: Option<Node<String>>,
    /// `min..max`
    pub cardinality: Option<Node<Cardinality>>,
    /// `default(expr)`
    pub default_value: Option<Node<FpExpression>>,
    /// List mode
    pub list_mode: Option<SourceListMode>,
    /// `as alias`
    pub alias: Option<Node<String>>,
    /// `where expr`
    pub where_clause: Option<Node<FpExpression>>,
    /// `check expr`
    pub check_clause: Option<Node<FpExpression>>,
    /// `log expr`
    pub log_expression: Option<Node<FpExpression>>,
}

impl FmlExpressionSource {
    /// A source with only an identifier
    pub fn new(identifier: Node<QualifiedIdentifier>) -> Self {
        Self {
            identifier,
            type_identifier: None,
            cardinality: None,
            default_value: None,
            list_mode: None,
            alias: None,
            where_clause: None,
            check_clause: None,
            log_expression: None,
        }
    }
}

/// Source cardinality (`0..1`, `1..*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinality {
    /// Lower bound
    pub min: u32,
    /// Upper bound, `None` for `*`
    pub max: Option<u32>,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}..*", self.min),
        }
    }
}

/// Source list mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceListMode {
    First,
    NotFirst,
    Last,
    NotLast,
    OnlyOne,
}

impl SourceListMode {
    /// Parse from grammar text
    pub fn from_keyword(text: &str) -> Option<Self> {
        match text {
            "first" => Some(Self::First),
            "not_first" => Some(Self::NotFirst),
            "last" => Some(Self::Last),
            "not_last" => Some(Self::NotLast),
            "only_one" => Some(Self::OnlyOne),
            _ => None,
        }
    }

    /// Grammar text
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::NotFirst => "not_first",
            Self::Last => "last",
            Self::NotLast => "not_last",
            Self::OnlyOne => "only_one",
        }
    }
}

/// Target list mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetListMode {
    First,
    Share,
    Last,
    Collate,
    Single,
}

impl TargetListMode {
    /// Parse from grammar text
    pub fn from_keyword(text: &str) -> Option<Self> {
        match text {
            "first" => Some(Self::First),
            "share" => Some(Self::Share),
            "last" => Some(Self::Last),
            "collate" => Some(Self::Collate),
            "single" => Some(Self::Single),
            _ => None,
        }
    }

    /// Grammar text
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Share => "share",
            Self::Last => "last",
            Self::Collate => "collate",
            Self::Single => "single",
        }
    }
}

/// A rule target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmlExpressionTarget {
    /// Target path; absent for invocation-only targets such as `create('Patient') as p`
    pub identifier: Option<Node<QualifiedIdentifier>>,
    /// `= transform`
    pub transform: Option<Node<Transform>>,
    /// `as alias`
    pub alias: Option<Node<String>>,
    /// List mode
    pub list_mode: Option<TargetListMode>,
}

/// The value assigned to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    /// A literal value
    Literal(Literal),
    /// A variable, possibly dotted
    Identifier(QualifiedIdentifier),
    /// A transform function call such as `create('Coding')`
    Invocation(Invocation),
    /// `( fhirpath )`
    Expression(BoxExpr),
}

/// `name(arg, ...)` in a transform or dependent clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Function or group name
    pub name: String,
    /// Arguments in source order
    pub arguments: Vec<Node<InvocationArgument>>,
}

impl Invocation {
    /// The first string-literal argument
    pub fn first_string_argument(&self) -> Option<&str> {
        self.arguments.iter().find_map(|arg| match &arg.inner {
            InvocationArgument::Literal(lit) => lit.as_str(),
            InvocationArgument::Identifier(_) => None,
        })
    }
}

/// One invocation argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InvocationArgument {
    /// Literal value
    Literal(Literal),
    /// Variable reference
    Identifier(String),
}

/// `then group(a, b) { nested rules }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentExpression {
    /// Group invocations
    pub invocations: Vec<Node<Invocation>>,
    /// Nested rules
    pub rules: Vec<Node<GroupExpression>>,
}
