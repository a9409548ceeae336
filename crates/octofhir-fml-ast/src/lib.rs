//! FHIR Mapping Language Abstract Syntax Tree definitions
//!
//! This crate defines the AST for FML documents (R5 mapping language) including the
//! embedded FHIRPath expression tree. Every node is wrapped in [`Node`], which carries
//! the exact source span, raw text and adjacent comments copied from the parse tree.

mod expression;
mod group;
mod literal;
mod metadata;
mod structure_map;
mod walk;

pub use expression::*;
pub use group::*;
pub use literal::*;
pub use metadata::*;
pub use structure_map::*;
pub use walk::*;

use octofhir_fml_diagnostics::TokenSpan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type alias for boxed FHIRPath expressions
pub type BoxExpr = Box<Node<FpExpression>>;

/// Source information carried by every AST node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FmlNode {
    /// Exact source text covered by the node
    pub raw_text: String,
    /// Comments immediately preceding the node
    pub prefix_comments: Vec<String>,
    /// Comments trailing the node
    pub postfix_comments: Vec<String>,
    /// Position of the node in the source
    pub span: TokenSpan,
}

impl FmlNode {
    /// Create node information without comments
    pub fn new(raw_text: impl Into<String>, span: TokenSpan) -> Self {
        Self {
            raw_text: raw_text.into(),
            prefix_comments: Vec::new(),
            postfix_comments: Vec::new(),
            span,
        }
    }
}

/// An AST value together with its source information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node<T> {
    /// The AST value
    pub inner: T,
    /// Span, raw text and comments
    pub base: FmlNode,
}

impl<T> Node<T> {
    /// Create a new node
    pub const fn new(inner: T, base: FmlNode) -> Self {
        Self { inner, base }
    }

    /// Source position of the node
    #[inline]
    pub const fn span(&self) -> TokenSpan {
        self.base.span
    }

    /// Raw source text of the node
    #[inline]
    pub fn raw_text(&self) -> &str {
        &self.base.raw_text
    }

    /// Map the inner value, keeping the source information
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Node<U> {
        Node {
            inner: f(self.inner),
            base: self.base,
        }
    }
}

impl<T> std::ops::Deref for Node<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> std::ops::DerefMut for Node<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// A dotted identifier such as `src.name.given`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedIdentifier {
    /// The identifier segments, in order
    pub segments: Vec<String>,
}

impl QualifiedIdentifier {
    /// Create a qualified identifier from segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a dotted path
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('.'))
    }

    /// The first segment (the scope variable)
    pub fn root(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or_default()
    }

    /// The segments after the root
    pub fn tail(&self) -> &[String] {
        self.segments.get(1..).unwrap_or_default()
    }

    /// Whether the identifier has more than one segment
    pub fn is_dotted(&self) -> bool {
        self.segments.len() > 1
    }
}

impl fmt::Display for QualifiedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<&str> for QualifiedIdentifier {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_identifier() {
        let id = QualifiedIdentifier::parse("src.name.given");
        assert_eq!(id.root(), "src");
        assert_eq!(id.tail(), ["name".to_string(), "given".to_string()]);
        assert!(id.is_dotted());
        assert_eq!(id.to_string(), "src.name.given");

        let single = QualifiedIdentifier::from("tgt");
        assert!(!single.is_dotted());
        assert!(single.tail().is_empty());
    }

    #[test]
    fn test_node_deref() {
        let node = Node::new(
            QualifiedIdentifier::parse("a.b"),
            FmlNode::new("a.b", TokenSpan::new(1, 1, 0, 2)),
        );
        assert_eq!(node.root(), "a");
        assert_eq!(node.raw_text(), "a.b");
        assert_eq!(node.span().stop_index, 2);
    }
}
