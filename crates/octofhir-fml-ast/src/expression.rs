//! FHIRPath expression AST nodes
//!
//! The tree mirrors the FHIRPath operator-precedence grammar: one variant per
//! grammar alternative, operands kept in source order and operator text kept verbatim.

use crate::{BoxExpr, Literal, Node, QualifiedIdentifier};
use serde::{Deserialize, Serialize};

/// A FHIRPath expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FpExpression {
    /// A term (literal, invocation, external constant or parenthesized expression)
    Term(FpTerm),
    /// Member or function invocation on an expression (`a.b`, `a.where(...)`)
    Invocation(InvocationExpression),
    /// Indexer (`a[0]`)
    Indexer(IndexerExpression),
    /// Unary sign (`-a`, `+a`)
    Polarity(PolarityExpression),
    /// `*`, `/`, `div`, `mod`
    Multiplicative(BinaryExpression),
    /// `+`, `-`, `&`
    Additive(BinaryExpression),
    /// `is`, `as`
    Type(TypeExpression),
    /// `|`
    Union(BinaryExpression),
    /// `<=`, `<`, `>`, `>=`
    Inequality(BinaryExpression),
    /// `=`, `~`, `!=`, `!~`
    Equality(BinaryExpression),
    /// `in`, `contains`
    Membership(BinaryExpression),
    /// `and`
    And(BinaryExpression),
    /// `or`, `xor`
    Or(BinaryExpression),
    /// `implies`
    Implies(BinaryExpression),
}

impl FpExpression {
    /// Grammar alternative name, used in diagnostics and transcripts
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Term(_) => "term",
            Self::Invocation(_) => "invocation",
            Self::Indexer(_) => "indexer",
            Self::Polarity(_) => "polarity",
            Self::Multiplicative(_) => "multiplicative",
            Self::Additive(_) => "additive",
            Self::Type(_) => "type",
            Self::Union(_) => "union",
            Self::Inequality(_) => "inequality",
            Self::Equality(_) => "equality",
            Self::Membership(_) => "membership",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Implies(_) => "implies",
        }
    }

    /// Operator text for operator alternatives
    pub fn operator(&self) -> Option<&str> {
        match self {
            Self::Polarity(p) => Some(&p.operator),
            Self::Type(t) => Some(&t.operator),
            Self::Multiplicative(b)
            | Self::Additive(b)
            | Self::Union(b)
            | Self::Inequality(b)
            | Self::Equality(b)
            | Self::Membership(b)
            | Self::And(b)
            | Self::Or(b)
            | Self::Implies(b) => Some(&b.operator),
            Self::Term(_) | Self::Invocation(_) | Self::Indexer(_) => None,
        }
    }

    /// Direct sub-expressions in source order
    pub fn children(&self) -> Vec<&Node<FpExpression>> {
        match self {
            Self::Term(FpTerm::Parenthesized(inner)) => vec![inner.as_ref()],
            Self::Term(FpTerm::Invocation(FpInvocation::Function(func))) => {
                func.arguments.iter().collect()
            }
            Self::Term(_) => Vec::new(),
            Self::Invocation(inv) => {
                let mut out = vec![inv.target.as_ref()];
                if let FpInvocation::Function(func) = &inv.invocation.inner {
                    out.extend(func.arguments.iter());
                }
                out
            }
            Self::Indexer(idx) => vec![idx.target.as_ref(), idx.index.as_ref()],
            Self::Polarity(p) => vec![p.operand.as_ref()],
            Self::Type(t) => vec![t.operand.as_ref()],
            Self::Multiplicative(b)
            | Self::Additive(b)
            | Self::Union(b)
            | Self::Inequality(b)
            | Self::Equality(b)
            | Self::Membership(b)
            | Self::And(b)
            | Self::Or(b)
            | Self::Implies(b) => vec![b.left.as_ref(), b.right.as_ref()],
        }
    }
}

/// A FHIRPath term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FpTerm {
    /// Identifier, function call or `$this`/`$index`/`$total`
    Invocation(FpInvocation),
    /// Literal value
    Literal(Literal),
    /// `%name` or `%'name'`
    ExternalConstant(String),
    /// `( expression )`
    Parenthesized(BoxExpr),
}

/// An invocation: the part after a `.` or a leading term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FpInvocation {
    /// Member access by name
    Member(String),
    /// Function call
    Function(FpFunction),
    /// `$this`
    This,
    /// `$index`
    Index,
    /// `$total`
    Total,
}

/// A function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpFunction {
    /// Function name
    pub name: String,
    /// Arguments in source order
    pub arguments: Vec<Node<FpExpression>>,
}

/// `target.invocation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationExpression {
    /// Expression the invocation applies to
    pub target: BoxExpr,
    /// The invocation
    pub invocation: Node<FpInvocation>,
}

/// `target[index]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerExpression {
    /// Indexed expression
    pub target: BoxExpr,
    /// Index expression
    pub index: BoxExpr,
}

/// `+operand` / `-operand`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarityExpression {
    /// Operator text
    pub operator: String,
    /// Operand
    pub operand: BoxExpr,
}

/// A binary operator application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    /// Left operand
    pub left: BoxExpr,
    /// Operator text exactly as written
    pub operator: String,
    /// Right operand
    pub right: BoxExpr,
}

impl BinaryExpression {
    /// Create a binary expression
    pub fn new(left: Node<FpExpression>, operator: impl Into<String>, right: Node<FpExpression>) -> Self {
        Self {
            left: Box::new(left),
            operator: operator.into(),
            right: Box::new(right),
        }
    }
}

/// `operand is Type` / `operand as Type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeExpression {
    /// Operand
    pub operand: BoxExpr,
    /// `is` or `as`
    pub operator: String,
    /// The type specifier
    pub type_specifier: Node<QualifiedIdentifier>,
}
