//! Lossless syntax tree
//!
//! The parser drives a `rowan` [`GreenNodeBuilder`]: every significant token and
//! every run of whitespace and comments between tokens becomes a leaf, so the tree
//! text is exactly the source text. Interior nodes are tagged with the grammar
//! [`Rule`] that produced them. Labeled alternatives (group expression kinds,
//! FHIRPath operator levels) get their own rule so the AST builder can
//! discriminate them by node kind alone.

use crate::lexer::{CommentTable, Token, TokenKind};
use octofhir_fml_diagnostics::TokenSpan;
use rowan::{GreenNode, GreenNodeBuilder, Language, NodeOrToken};

/// Grammar productions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
    StructureMap,
    MetadataDeclaration,
    MarkdownLiteral,
    ConceptMapDeclaration,
    ConceptMapPrefix,
    ConceptMapCodeMap,
    ConceptMapCode,
    MapDeclaration,
    StructureDeclaration,
    ImportDeclaration,
    ConstantDeclaration,
    GroupDeclaration,
    Parameters,
    Parameter,
    Extends,
    TypeMode,
    TypeIdentifier,
    GroupExpressions,
    // group expression alternatives
    MapSimpleCopy,
    MapFhirPath,
    MapExpression,
    MapExpressionSource,
    MapExpressionTarget,
    MapExpressionName,
    SourceCardinality,
    SourceDefault,
    SourceListMode,
    TargetListMode,
    Alias,
    WhereClause,
    CheckClause,
    LogClause,
    DependentExpression,
    Transform,
    Invocation,
    ParamList,
    Param,
    QualifiedIdentifier,
    Identifier,
    Url,
    Literal,
    // FHIRPath expression alternatives
    TermExpression,
    InvocationExpression,
    IndexerExpression,
    PolarityExpression,
    MultiplicativeExpression,
    AdditiveExpression,
    TypeExpression,
    UnionExpression,
    InequalityExpression,
    EqualityExpression,
    MembershipExpression,
    AndExpression,
    OrExpression,
    ImpliesExpression,
    // FHIRPath terms
    InvocationTerm,
    LiteralTerm,
    ExternalConstantTerm,
    ParenthesizedTerm,
    MemberInvocation,
    FunctionInvocation,
    ThisInvocation,
    IndexInvocation,
    TotalInvocation,
    FunctionParamList,
    TypeSpecifier,
    Quantity,
    /// Root of a standalone FHIRPath expression
    Expression,
}

impl Rule {
    /// Every rule, indexed by discriminant
    pub const ALL: &'static [Rule] = &[
        Self::StructureMap,
        Self::MetadataDeclaration,
        Self::MarkdownLiteral,
        Self::ConceptMapDeclaration,
        Self::ConceptMapPrefix,
        Self::ConceptMapCodeMap,
        Self::ConceptMapCode,
        Self::MapDeclaration,
        Self::StructureDeclaration,
        Self::ImportDeclaration,
        Self::ConstantDeclaration,
        Self::GroupDeclaration,
        Self::Parameters,
        Self::Parameter,
        Self::Extends,
        Self::TypeMode,
        Self::TypeIdentifier,
        Self::GroupExpressions,
        Self::MapSimpleCopy,
        Self::MapFhirPath,
        Self::MapExpression,
        Self::MapExpressionSource,
        Self::MapExpressionTarget,
        Self::MapExpressionName,
        Self::SourceCardinality,
        Self::SourceDefault,
        Self::SourceListMode,
        Self::TargetListMode,
        Self::Alias,
        Self::WhereClause,
        Self::CheckClause,
        Self::LogClause,
        Self::DependentExpression,
        Self::Transform,
        Self::Invocation,
        Self::ParamList,
        Self::Param,
        Self::QualifiedIdentifier,
        Self::Identifier,
        Self::Url,
        Self::Literal,
        Self::TermExpression,
        Self::InvocationExpression,
        Self::IndexerExpression,
        Self::PolarityExpression,
        Self::MultiplicativeExpression,
        Self::AdditiveExpression,
        Self::TypeExpression,
        Self::UnionExpression,
        Self::InequalityExpression,
        Self::EqualityExpression,
        Self::MembershipExpression,
        Self::AndExpression,
        Self::OrExpression,
        Self::ImpliesExpression,
        Self::InvocationTerm,
        Self::LiteralTerm,
        Self::ExternalConstantTerm,
        Self::ParenthesizedTerm,
        Self::MemberInvocation,
        Self::FunctionInvocation,
        Self::ThisInvocation,
        Self::IndexInvocation,
        Self::TotalInvocation,
        Self::FunctionParamList,
        Self::TypeSpecifier,
        Self::Quantity,
        Self::Expression,
    ];

    /// Whether this rule is one of the FHIRPath expression alternatives
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            Self::TermExpression
                | Self::InvocationExpression
                | Self::IndexerExpression
                | Self::PolarityExpression
                | Self::MultiplicativeExpression
                | Self::AdditiveExpression
                | Self::TypeExpression
                | Self::UnionExpression
                | Self::InequalityExpression
                | Self::EqualityExpression
                | Self::MembershipExpression
                | Self::AndExpression
                | Self::OrExpression
                | Self::ImpliesExpression
        )
    }
}

/// Kind of a tree element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyntaxKind {
    /// Whitespace and comments between two significant tokens
    Trivia,
    /// A significant token
    Token(TokenKind),
    /// An interior node
    Node(Rule),
}

const TOKEN_BASE: u16 = 1;
const RULE_BASE: u16 = 0x100;

impl SyntaxKind {
    pub fn is_trivia(self) -> bool {
        self == Self::Trivia
    }

    pub fn token_kind(self) -> Option<TokenKind> {
        match self {
            Self::Token(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn rule(self) -> Option<Rule> {
        match self {
            Self::Node(rule) => Some(rule),
            _ => None,
        }
    }
}

impl From<TokenKind> for SyntaxKind {
    fn from(kind: TokenKind) -> Self {
        Self::Token(kind)
    }
}

impl From<Rule> for SyntaxKind {
    fn from(rule: Rule) -> Self {
        Self::Node(rule)
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        FmlLanguage::kind_to_raw(kind)
    }
}

/// `rowan` language tag for FML trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FmlLanguage;

impl Language for FmlLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        let raw = raw.0;
        if raw >= RULE_BASE {
            if let Some(rule) = Rule::ALL.get(usize::from(raw - RULE_BASE)) {
                return SyntaxKind::Node(*rule);
            }
        } else if raw >= TOKEN_BASE {
            if let Some(kind) = TokenKind::ALL.get(usize::from(raw - TOKEN_BASE)) {
                return SyntaxKind::Token(*kind);
            }
        }
        SyntaxKind::Trivia
    }

    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        rowan::SyntaxKind(match kind {
            SyntaxKind::Trivia => 0,
            SyntaxKind::Token(kind) => TOKEN_BASE + kind as u16,
            SyntaxKind::Node(rule) => RULE_BASE + rule as u16,
        })
    }
}

pub type SyntaxNode = rowan::SyntaxNode<FmlLanguage>;
pub type SyntaxToken = rowan::SyntaxToken<FmlLanguage>;

/// Rule-aware navigation over [`SyntaxNode`]
pub trait SyntaxNodeExt {
    /// Production that produced the node
    fn rule(&self) -> Option<Rule>;

    /// Child nodes produced by `rule`
    fn nodes_of(&self, rule: Rule) -> impl Iterator<Item = SyntaxNode>;

    /// First child node produced by `rule`
    fn node(&self, rule: Rule) -> Option<SyntaxNode>;

    /// Child expression nodes
    fn expressions(&self) -> impl Iterator<Item = SyntaxNode>;

    /// Significant tokens that are direct children
    fn child_tokens(&self) -> impl Iterator<Item = SyntaxToken>;

    /// First significant token in the subtree
    fn first_significant(&self) -> Option<SyntaxToken>;

    /// Last significant token in the subtree
    fn last_significant(&self) -> Option<SyntaxToken>;
}

impl SyntaxNodeExt for SyntaxNode {
    fn rule(&self) -> Option<Rule> {
        self.kind().rule()
    }

    fn nodes_of(&self, rule: Rule) -> impl Iterator<Item = SyntaxNode> {
        self.children().filter(move |n| n.rule() == Some(rule))
    }

    fn node(&self, rule: Rule) -> Option<SyntaxNode> {
        self.nodes_of(rule).next()
    }

    fn expressions(&self) -> impl Iterator<Item = SyntaxNode> {
        self.children()
            .filter(|n| n.rule().is_some_and(|rule| rule.is_expression()))
    }

    fn child_tokens(&self) -> impl Iterator<Item = SyntaxToken> {
        self.children_with_tokens()
            .filter_map(NodeOrToken::into_token)
            .filter(|t| !t.kind().is_trivia())
    }

    fn first_significant(&self) -> Option<SyntaxToken> {
        self.descendants_with_tokens()
            .filter_map(NodeOrToken::into_token)
            .find(|t| !t.kind().is_trivia())
    }

    fn last_significant(&self) -> Option<SyntaxToken> {
        let range = self.text_range();
        let mut token = self.last_token()?;
        while token.kind().is_trivia() {
            token = token.prev_token()?;
            if !range.contains_range(token.text_range()) {
                return None;
            }
        }
        Some(token)
    }
}

/// Tokens, comments and syntax tree of one document
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    /// The source text
    pub source: String,
    /// Significant tokens
    pub tokens: Vec<Token>,
    /// Comment side table
    pub comments: CommentTable,
    green: GreenNode,
}

impl SyntaxTree {
    pub(crate) fn new(
        source: impl Into<String>,
        tokens: Vec<Token>,
        comments: CommentTable,
        green: GreenNode,
    ) -> Self {
        Self {
            source: source.into(),
            tokens,
            comments,
            green,
        }
    }

    /// Root node; cheap to call, the green tree is shared
    pub fn root(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// Lexer token a tree token was built from
    pub fn token(&self, token: &SyntaxToken) -> Option<&Token> {
        let offset = usize::from(token.text_range().start());
        self.tokens
            .binary_search_by_key(&offset, |t| t.span.start_index)
            .ok()
            .and_then(|index| self.tokens.get(index))
            .filter(|t| !t.text.is_empty())
    }

    /// Source span from the first to the last significant token of `node`
    pub fn span_of(&self, node: &SyntaxNode) -> Option<TokenSpan> {
        let start = self.token(&node.first_significant()?)?.span;
        let stop = self.token(&node.last_significant()?)?.span;
        Some(start.to(stop))
    }

    /// Raw source text covered by `node`, without surrounding trivia
    pub fn text_of(&self, node: &SyntaxNode) -> Option<&str> {
        self.span_of(node).and_then(|span| span.text(&self.source))
    }
}

/// Feeds lexer tokens into a [`GreenNodeBuilder`], filling the gaps with trivia
pub(crate) struct TreeSink<'s> {
    source: &'s str,
    builder: GreenNodeBuilder<'static>,
    cursor: usize,
}

impl<'s> TreeSink<'s> {
    pub(crate) fn new(source: &'s str) -> Self {
        Self {
            source,
            builder: GreenNodeBuilder::new(),
            cursor: 0,
        }
    }

    pub(crate) fn start_node(&mut self, rule: Rule) {
        self.builder.start_node(SyntaxKind::Node(rule).into());
    }

    pub(crate) fn checkpoint(&self) -> rowan::Checkpoint {
        self.builder.checkpoint()
    }

    /// Start a node whose first children are those added since `checkpoint`
    pub(crate) fn start_node_at(&mut self, checkpoint: rowan::Checkpoint, rule: Rule) {
        self.builder
            .start_node_at(checkpoint, SyntaxKind::Node(rule).into());
    }

    pub(crate) fn finish_node(&mut self) {
        self.builder.finish_node();
    }

    /// Add `token`, preceded by the trivia between the previous token and it
    pub(crate) fn token(&mut self, token: &Token) {
        let start = token.span.start_index;
        self.trivia_until(start);
        self.builder
            .token(SyntaxKind::Token(token.kind).into(), &token.text);
        self.cursor = start + token.text.len();
    }

    /// Add the trivia left before end of input; call before closing the root
    pub(crate) fn flush(&mut self) {
        self.trivia_until(self.source.len());
    }

    fn trivia_until(&mut self, end: usize) {
        if end <= self.cursor {
            return;
        }
        if let Some(gap) = self.source.get(self.cursor..end) {
            self.builder.token(SyntaxKind::Trivia.into(), gap);
        }
        self.cursor = end;
    }

    pub(crate) fn finish(self) -> GreenNode {
        self.builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_raw_kinds_round_trip() {
        for (index, rule) in Rule::ALL.iter().enumerate() {
            assert_eq!(*rule as usize, index);
            let raw = FmlLanguage::kind_to_raw(SyntaxKind::Node(*rule));
            assert_eq!(FmlLanguage::kind_from_raw(raw), SyntaxKind::Node(*rule));
        }
        for (index, kind) in TokenKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, index);
            let raw = FmlLanguage::kind_to_raw(SyntaxKind::Token(*kind));
            assert_eq!(FmlLanguage::kind_from_raw(raw), SyntaxKind::Token(*kind));
        }
    }

    #[test]
    fn test_sink_wraps_left_operand() {
        let source = "a + /* b */ b";
        let tokens = lex(source).map(|l| l.tokens).unwrap_or_default();
        let mut sink = TreeSink::new(source);
        sink.start_node(Rule::Expression);
        let checkpoint = sink.checkpoint();
        sink.start_node(Rule::TermExpression);
        sink.token(&tokens[0]);
        sink.finish_node();
        sink.start_node_at(checkpoint, Rule::AdditiveExpression);
        sink.token(&tokens[1]);
        sink.start_node(Rule::TermExpression);
        sink.token(&tokens[2]);
        sink.finish_node();
        sink.finish_node();
        sink.flush();
        sink.finish_node();

        let tree = SyntaxTree::new(source, tokens, CommentTable::default(), sink.finish());
        let root = tree.root();
        assert_eq!(root.text().to_string(), source);

        let additive = root.node(Rule::AdditiveExpression);
        assert_eq!(
            additive.as_ref().map(|a| a.expressions().count()),
            Some(2)
        );
        let operator: Vec<_> = additive
            .iter()
            .flat_map(|a| a.child_tokens())
            .map(|t| t.text().to_string())
            .collect();
        assert_eq!(operator, vec!["+"]);

        let right = additive.and_then(|a| a.expressions().nth(1));
        assert_eq!(
            right.and_then(|r| tree.span_of(&r)),
            Some(TokenSpan::new(1, 13, 12, 12))
        );
    }
}
