//! FHIR Mapping Language parser
//!
//! This crate turns FML source text into the AST of `octofhir-fml-ast` in two
//! steps: a hand-written lexer and recursive-descent parser produce a lossless
//! `rowan` [`SyntaxTree`] (tokens, comment side table and green tree), and the
//! AST builder converts that tree into a [`FhirStructureMap`].
//!
//! ```rust,ignore
//! use octofhir_fml_parser::parse;
//!
//! let map = parse(r#"
//! map "http://example.org/fml/tutorial" = tutorial
//! group tutorial(source src : TLeft, target tgt : TRight) {
//!   src.a -> tgt.a;
//! }
//! "#)?;
//! assert!(map.group("tutorial").is_some());
//! ```

mod builder;
mod grammar;
pub mod lexer;
mod tree;

pub use builder::build;
pub use lexer::{Comment, CommentTable, Lexed, Token, TokenKind, lex};
pub use tree::{
    FmlLanguage, Rule, SyntaxKind, SyntaxNode, SyntaxNodeExt, SyntaxToken, SyntaxTree,
};

use octofhir_fml_ast::{FhirStructureMap, FpExpression, Node};
use octofhir_fml_diagnostics::Result;

/// Lex and parse a document into a [`SyntaxTree`]
///
/// The first syntax error is returned with its location and a description of
/// what the parser expected.
pub fn parse_tree(source: &str) -> Result<SyntaxTree> {
    let Lexed { tokens, comments } = lex(source)?;
    let green = grammar::parse_structure_map(source, &tokens)?;
    log::trace!("parsed {} tokens, {} comments", tokens.len(), comments.len());
    Ok(SyntaxTree::new(source, tokens, comments, green))
}

/// Parse a document straight to its AST
pub fn parse(source: &str) -> Result<FhirStructureMap> {
    build(&parse_tree(source)?)
}

/// Parse a standalone FHIRPath expression
pub fn parse_expression(source: &str) -> Result<Node<FpExpression>> {
    let Lexed { tokens, comments } = lex(source)?;
    let green = grammar::parse_fhirpath(source, &tokens)?;
    builder::build_expression(&SyntaxTree::new(source, tokens, comments, green))
}
