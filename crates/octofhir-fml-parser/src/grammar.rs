//! Recursive-descent parser feeding the lossless [`SyntaxTree`](crate::SyntaxTree)
//!
//! Declarations may appear in any order at the top level. FHIRPath expressions
//! are parsed with one function per precedence level; left-associative levels
//! wrap the already parsed left operand through a builder checkpoint.

use crate::lexer::{Token, TokenKind};
use crate::tree::{Rule, TreeSink};
use octofhir_fml_diagnostics::{ErrorCode, FML0001, FML0002, FML0003, FML0010, FML0011, FmlError, Result};
use rowan::GreenNode;

const SOURCE_LIST_MODES: &[&str] = &["first", "not_first", "last", "not_last", "only_one"];
const TARGET_LIST_MODES: &[&str] = &["first", "share", "last", "collate", "single"];
const MODEL_MODES: &[&str] = &["source", "queried", "target", "produced"];
const CALENDAR_UNITS: &[&str] = &[
    "year",
    "years",
    "month",
    "months",
    "week",
    "weeks",
    "day",
    "days",
    "hour",
    "hours",
    "minute",
    "minutes",
    "second",
    "seconds",
    "millisecond",
    "milliseconds",
];

/// Keywords that, after a source identifier, mark a mapping rule
const SOURCE_CONTINUATIONS: &[&str] = &[
    "default",
    "first",
    "not_first",
    "last",
    "not_last",
    "only_one",
    "as",
    "where",
    "check",
    "log",
    "then",
];

/// Parse a whole structure map; the root is a [`Rule::StructureMap`]
pub(crate) fn parse_structure_map(source: &str, tokens: &[Token]) -> Result<GreenNode> {
    let mut parser = Parser::new(source, tokens);
    parser.structure_map()?;
    Ok(parser.builder.finish())
}

/// Parse a standalone FHIRPath expression; the root is a [`Rule::Expression`]
pub(crate) fn parse_fhirpath(source: &str, tokens: &[Token]) -> Result<GreenNode> {
    let mut parser = Parser::new(source, tokens);
    parser.builder.start_node(Rule::Expression);
    parser.expression()?;
    if !parser.at(TokenKind::Eof) {
        return Err(parser.unexpected("end of expression"));
    }
    parser.builder.flush();
    parser.builder.finish_node();
    Ok(parser.builder.finish())
}

/// Token stream parser
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    builder: TreeSink<'a>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            builder: TreeSink::new(source),
        }
    }

    // ---- token access ----

    fn nth(&self, n: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + n)
    }

    fn kind_at(&self, n: usize) -> TokenKind {
        self.nth(n).map_or(TokenKind::Eof, |t| t.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind_at(0) == kind
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.nth(0).is_some_and(|t| t.is_keyword(keyword))
    }

    fn at_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.at_keyword(k))
    }

    fn is_identifier_kind(kind: TokenKind) -> bool {
        matches!(kind, TokenKind::Identifier | TokenKind::DelimitedIdentifier)
    }

    fn at_identifier(&self) -> bool {
        Self::is_identifier_kind(self.kind_at(0))
    }

    /// Add the current token to the open node and advance; never moves past EOF
    fn bump(&mut self) {
        let Some(token) = self.nth(0) else {
            return;
        };
        if token.kind == TokenKind::Eof {
            return;
        }
        self.builder.token(token);
        self.pos += 1;
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.at(kind) {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.at_keyword(keyword) {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{keyword}`")))
        }
    }

    fn unexpected(&self, expected: &str) -> FmlError {
        self.unexpected_with(FML0001, expected)
    }

    /// Error at the current token; end of input always reports FML0002
    fn unexpected_with(&self, code: ErrorCode, expected: &str) -> FmlError {
        match self.nth(0) {
            Some(token) if token.kind != TokenKind::Eof => {
                let message = if token.kind.describe().starts_with('`') {
                    format!("Unexpected {}", token.kind)
                } else {
                    format!("Unexpected {} `{}`", token.kind, token.text)
                };
                FmlError::parse_at(code, message, token.span.location()).with_expected(expected)
            }
            Some(token) => {
                FmlError::parse_at(FML0002, "Unexpected end of input", token.span.location())
                    .with_expected(expected)
            }
            None => FmlError::parse(FML0002, "Unexpected end of input").with_expected(expected),
        }
    }

    /// Index just past the qualified identifier starting `offset` tokens ahead
    fn scan_qualified_identifier(&self, offset: usize) -> Option<usize> {
        if !Self::is_identifier_kind(self.kind_at(offset)) {
            return None;
        }
        let mut n = offset + 1;
        while self.kind_at(n) == TokenKind::Dot && Self::is_identifier_kind(self.kind_at(n + 1)) {
            n += 2;
        }
        Some(n)
    }

    // ---- declarations ----

    fn structure_map(&mut self) -> Result<()> {
        self.builder.start_node(Rule::StructureMap);
        let mut seen_map = false;
        loop {
            if self.at(TokenKind::MetadataPrefix) {
                self.metadata()?;
            } else if self.at_keyword("conceptmap") {
                self.concept_map()?;
            } else if self.at_keyword("map") {
                if seen_map {
                    return Err(self.unexpected("a single `map` declaration"));
                }
                seen_map = true;
                self.map_declaration()?;
            } else if self.at_keyword("uses") {
                self.structure()?;
            } else if self.at_keyword("imports") {
                self.import()?;
            } else if self.at_keyword("let") {
                self.constant()?;
            } else if self.at_keyword("group") {
                self.group()?;
            } else if self.at(TokenKind::Eof) {
                break;
            } else {
                return Err(self.unexpected("declaration"));
            }
        }
        self.builder.flush();
        self.builder.finish_node();
        Ok(())
    }

    fn metadata(&mut self) -> Result<()> {
        self.builder.start_node(Rule::MetadataDeclaration);
        self.bump();
        self.qualified_identifier()?;
        self.expect(TokenKind::Equal)?;
        if self.at(TokenKind::TripleQuotedString) {
            self.builder.start_node(Rule::MarkdownLiteral);
            self.bump();
            self.builder.finish_node();
        } else if self.at_literal() {
            self.literal()?;
        }
        self.builder.finish_node();
        Ok(())
    }

    fn url(&mut self) -> Result<()> {
        if !matches!(
            self.kind_at(0),
            TokenKind::DoubleQuotedString | TokenKind::String
        ) {
            return Err(self.unexpected_with(FML0011, "quoted url"));
        }
        self.builder.start_node(Rule::Url);
        self.bump();
        self.builder.finish_node();
        Ok(())
    }

    fn identifier(&mut self) -> Result<()> {
        if !self.at_identifier() {
            return Err(self.unexpected_with(FML0003, "identifier"));
        }
        self.builder.start_node(Rule::Identifier);
        self.bump();
        self.builder.finish_node();
        Ok(())
    }

    fn qualified_identifier(&mut self) -> Result<()> {
        self.builder.start_node(Rule::QualifiedIdentifier);
        self.identifier()?;
        while self.at(TokenKind::Dot) && Self::is_identifier_kind(self.kind_at(1)) {
            self.bump();
            self.identifier()?;
        }
        self.builder.finish_node();
        Ok(())
    }

    fn concept_map(&mut self) -> Result<()> {
        self.builder.start_node(Rule::ConceptMapDeclaration);
        self.bump();
        self.url()?;
        self.expect(TokenKind::LBrace)?;
        while self.at_keyword("prefix") {
            self.builder.start_node(Rule::ConceptMapPrefix);
            self.bump();
            self.identifier()?;
            self.expect(TokenKind::Equal)?;
            self.url()?;
            self.builder.finish_node();
        }
        while !self.at(TokenKind::RBrace) {
            self.concept_map_code_map()?;
        }
        self.expect(TokenKind::RBrace)?;
        self.builder.finish_node();
        Ok(())
    }

    fn concept_map_code_map(&mut self) -> Result<()> {
        self.builder.start_node(Rule::ConceptMapCodeMap);
        self.concept_map_code()?;
        match self.kind_at(0) {
            TokenKind::Minus
            | TokenKind::Equal
            | TokenKind::DoubleEqual
            | TokenKind::NotEqual
            | TokenKind::GreaterEqual
            | TokenKind::LessEqual
            | TokenKind::Tilde => self.bump(),
            // `>-` and `<-` arrive as two adjacent tokens
            TokenKind::Greater | TokenKind::Less if self.kind_at(1) == TokenKind::Minus => {
                self.bump();
                self.bump();
            }
            _ => return Err(self.unexpected("concept map relationship")),
        }
        self.concept_map_code()?;
        self.builder.finish_node();
        Ok(())
    }

    fn concept_map_code(&mut self) -> Result<()> {
        self.builder.start_node(Rule::ConceptMapCode);
        self.identifier()?;
        self.expect(TokenKind::Colon)?;
        match self.kind_at(0) {
            TokenKind::Identifier
            | TokenKind::DelimitedIdentifier
            | TokenKind::String
            | TokenKind::DoubleQuotedString
            | TokenKind::Integer => self.bump(),
            _ => return Err(self.unexpected("code")),
        }
        self.builder.finish_node();
        Ok(())
    }

    fn map_declaration(&mut self) -> Result<()> {
        self.builder.start_node(Rule::MapDeclaration);
        self.bump();
        self.url()?;
        self.expect(TokenKind::Equal)?;
        match self.kind_at(0) {
            TokenKind::String | TokenKind::DoubleQuotedString => self.bump(),
            _ => self.identifier()?,
        }
        self.builder.finish_node();
        Ok(())
    }

    fn structure(&mut self) -> Result<()> {
        self.builder.start_node(Rule::StructureDeclaration);
        self.bump();
        self.url()?;
        if self.at_keyword("alias") {
            self.builder.start_node(Rule::Alias);
            self.bump();
            self.identifier()?;
            self.builder.finish_node();
        }
        self.expect_keyword("as")?;
        if self.at_any_keyword(MODEL_MODES) {
            self.bump();
        } else {
            return Err(self.unexpected("`source`, `queried`, `target` or `produced`"));
        }
        self.builder.finish_node();
        Ok(())
    }

    fn import(&mut self) -> Result<()> {
        self.builder.start_node(Rule::ImportDeclaration);
        self.bump();
        self.url()?;
        self.builder.finish_node();
        Ok(())
    }

    fn constant(&mut self) -> Result<()> {
        self.builder.start_node(Rule::ConstantDeclaration);
        self.bump();
        self.identifier()?;
        self.expect(TokenKind::Equal)?;
        self.expression()?;
        self.expect(TokenKind::Semicolon)?;
        self.builder.finish_node();
        Ok(())
    }

    // ---- groups ----

    fn group(&mut self) -> Result<()> {
        self.builder.start_node(Rule::GroupDeclaration);
        self.bump();
        self.identifier()?;
        self.parameters()?;
        if self.at_keyword("extends") {
            self.builder.start_node(Rule::Extends);
            self.bump();
            self.identifier()?;
            self.builder.finish_node();
        }
        if self.at(TokenKind::DoubleLess) {
            self.type_mode()?;
        }
        self.group_expressions()?;
        self.builder.finish_node();
        Ok(())
    }

    fn parameters(&mut self) -> Result<()> {
        self.builder.start_node(Rule::Parameters);
        self.expect(TokenKind::LParen)?;
        if !self.at(TokenKind::RParen) {
            self.parameter()?;
            while self.at(TokenKind::Comma) {
                self.bump();
                self.parameter()?;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.builder.finish_node();
        Ok(())
    }

    fn parameter(&mut self) -> Result<()> {
        self.builder.start_node(Rule::Parameter);
        if self.at_keyword("source") || self.at_keyword("target") {
            self.bump();
        } else {
            return Err(self.unexpected("`source` or `target`"));
        }
        self.identifier()?;
        if self.at(TokenKind::Colon) {
            self.type_identifier()?;
        }
        self.builder.finish_node();
        Ok(())
    }

    fn type_identifier(&mut self) -> Result<()> {
        self.builder.start_node(Rule::TypeIdentifier);
        self.expect(TokenKind::Colon)?;
        self.identifier()?;
        self.builder.finish_node();
        Ok(())
    }

    fn type_mode(&mut self) -> Result<()> {
        self.builder.start_node(Rule::TypeMode);
        self.bump();
        if self.at_keyword("types") {
            self.bump();
        } else if self.at_keyword("type") {
            self.bump();
            self.expect(TokenKind::Plus)?;
        } else {
            return Err(self.unexpected("`types` or `type+`"));
        }
        self.expect(TokenKind::DoubleGreater)?;
        self.builder.finish_node();
        Ok(())
    }

    fn group_expressions(&mut self) -> Result<()> {
        self.builder.start_node(Rule::GroupExpressions);
        self.expect(TokenKind::LBrace)?;
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.unexpected("`}`"));
            }
            self.rule()?;
        }
        self.expect(TokenKind::RBrace)?;
        self.builder.finish_node();
        Ok(())
    }

    /// Classify and parse one group expression
    fn rule(&mut self) -> Result<()> {
        let Some(after) = self.scan_qualified_identifier(0) else {
            return self.fhirpath_rule();
        };
        if self.is_simple_copy(after) {
            return self.simple_copy();
        }
        let next = self.kind_at(after);
        let mapping = matches!(
            next,
            TokenKind::Colon
                | TokenKind::Integer
                | TokenKind::Comma
                | TokenKind::Arrow
                | TokenKind::DoubleQuotedString
                | TokenKind::Semicolon
        ) || self
            .nth(after)
            .is_some_and(|t| SOURCE_CONTINUATIONS.iter().any(|k| t.is_keyword(k)));
        if mapping {
            self.mapping_rule()
        } else {
            self.fhirpath_rule()
        }
    }

    /// `qid -> qid "name"? ;`
    fn is_simple_copy(&self, after_source: usize) -> bool {
        if self.kind_at(after_source) != TokenKind::Arrow {
            return false;
        }
        let Some(mut n) = self.scan_qualified_identifier(after_source + 1) else {
            return false;
        };
        if self.kind_at(n) == TokenKind::DoubleQuotedString {
            n += 1;
        }
        self.kind_at(n) == TokenKind::Semicolon
    }

    fn simple_copy(&mut self) -> Result<()> {
        self.builder.start_node(Rule::MapSimpleCopy);
        self.qualified_identifier()?;
        self.expect(TokenKind::Arrow)?;
        self.qualified_identifier()?;
        if self.at(TokenKind::DoubleQuotedString) {
            self.rule_name();
        }
        self.expect(TokenKind::Semicolon)?;
        self.builder.finish_node();
        Ok(())
    }

    fn fhirpath_rule(&mut self) -> Result<()> {
        self.builder.start_node(Rule::MapFhirPath);
        self.expression()?;
        self.expect(TokenKind::Semicolon)?;
        self.builder.finish_node();
        Ok(())
    }

    fn rule_name(&mut self) {
        self.builder.start_node(Rule::MapExpressionName);
        self.bump();
        self.builder.finish_node();
    }

    fn mapping_rule(&mut self) -> Result<()> {
        self.builder.start_node(Rule::MapExpression);
        self.source()?;
        while self.at(TokenKind::Comma) {
            self.bump();
            self.source()?;
        }
        if self.at(TokenKind::Arrow) {
            self.bump();
            self.target()?;
            while self.at(TokenKind::Comma) {
                self.bump();
                self.target()?;
            }
        }
        let mut ends_with_block = false;
        if self.at_keyword("then") {
            ends_with_block = self.dependent()?;
        }
        if self.at(TokenKind::DoubleQuotedString) {
            self.rule_name();
            ends_with_block = false;
        }
        if self.at(TokenKind::Semicolon) {
            self.bump();
        } else if !ends_with_block {
            return Err(self.unexpected("`;`"));
        }
        self.builder.finish_node();
        Ok(())
    }

    fn source(&mut self) -> Result<()> {
        self.builder.start_node(Rule::MapExpressionSource);
        self.qualified_identifier()?;
        if self.at(TokenKind::Colon) {
            self.type_identifier()?;
        }
        if self.at(TokenKind::Integer) {
            self.builder.start_node(Rule::SourceCardinality);
            self.bump();
            self.expect(TokenKind::DotDot)?;
            if matches!(self.kind_at(0), TokenKind::Integer | TokenKind::Star) {
                self.bump();
            } else {
                return Err(self.unexpected("integer or `*`"));
            }
            self.builder.finish_node();
        }
        if self.at_keyword("default") {
            self.builder.start_node(Rule::SourceDefault);
            self.bump();
            if self.at(TokenKind::LParen) {
                self.bump();
                self.expression()?;
                self.expect(TokenKind::RParen)?;
            } else {
                // unparenthesized defaults stop before `as` and the clause keywords
                self.polarity_expression()?;
            }
            self.builder.finish_node();
        }
        if self.at_any_keyword(SOURCE_LIST_MODES) {
            self.builder.start_node(Rule::SourceListMode);
            self.bump();
            self.builder.finish_node();
        }
        if self.at_keyword("as") {
            self.alias()?;
        }
        for (keyword, rule) in [
            ("where", Rule::WhereClause),
            ("check", Rule::CheckClause),
            ("log", Rule::LogClause),
        ] {
            if self.at_keyword(keyword) {
                self.builder.start_node(rule);
                self.bump();
                self.expression()?;
                self.builder.finish_node();
            }
        }
        self.builder.finish_node();
        Ok(())
    }

    fn alias(&mut self) -> Result<()> {
        self.builder.start_node(Rule::Alias);
        self.expect_keyword("as")?;
        self.identifier()?;
        self.builder.finish_node();
        Ok(())
    }

    fn target(&mut self) -> Result<()> {
        self.builder.start_node(Rule::MapExpressionTarget);
        if self.at_identifier() && self.kind_at(1) == TokenKind::LParen {
            self.invocation()?;
        } else {
            self.qualified_identifier()?;
            if self.at(TokenKind::Equal) {
                self.bump();
                self.transform()?;
            }
        }
        if self.at_keyword("as") {
            self.alias()?;
        }
        if self.at_any_keyword(TARGET_LIST_MODES) {
            self.builder.start_node(Rule::TargetListMode);
            self.bump();
            self.builder.finish_node();
        }
        self.builder.finish_node();
        Ok(())
    }

    fn transform(&mut self) -> Result<()> {
        self.builder.start_node(Rule::Transform);
        if self.at(TokenKind::LParen) {
            self.bump();
            self.expression()?;
            self.expect(TokenKind::RParen)?;
        } else if self.at_literal() {
            self.literal()?;
        } else if self.at_identifier() && self.kind_at(1) == TokenKind::LParen {
            self.invocation()?;
        } else if self.at_identifier() {
            self.qualified_identifier()?;
        } else {
            return Err(self.unexpected("transform"));
        }
        self.builder.finish_node();
        Ok(())
    }

    fn invocation(&mut self) -> Result<()> {
        self.builder.start_node(Rule::Invocation);
        self.identifier()?;
        self.expect(TokenKind::LParen)?;
        if !self.at(TokenKind::RParen) {
            self.builder.start_node(Rule::ParamList);
            self.param()?;
            while self.at(TokenKind::Comma) {
                self.bump();
                self.param()?;
            }
            self.builder.finish_node();
        }
        self.expect(TokenKind::RParen)?;
        self.builder.finish_node();
        Ok(())
    }

    fn param(&mut self) -> Result<()> {
        self.builder.start_node(Rule::Param);
        if self.at_literal() {
            self.literal()?;
        } else {
            self.identifier()?;
        }
        self.builder.finish_node();
        Ok(())
    }

    /// Returns whether the dependent clause ended with a `{ ... }` block
    fn dependent(&mut self) -> Result<bool> {
        self.builder.start_node(Rule::DependentExpression);
        self.bump();
        let mut block = false;
        if self.at(TokenKind::LBrace) {
            self.group_expressions()?;
            block = true;
        } else {
            self.invocation()?;
            while self.at(TokenKind::Comma) {
                self.bump();
                self.invocation()?;
            }
            if self.at(TokenKind::LBrace) {
                self.group_expressions()?;
                block = true;
            }
        }
        self.builder.finish_node();
        Ok(block)
    }

    // ---- literals ----

    fn at_literal(&self) -> bool {
        match self.kind_at(0) {
            TokenKind::Integer
            | TokenKind::Decimal
            | TokenKind::String
            | TokenKind::Date
            | TokenKind::DateTime
            | TokenKind::Time => true,
            TokenKind::LBrace => self.kind_at(1) == TokenKind::RBrace,
            _ => self.at_keyword("true") || self.at_keyword("false"),
        }
    }

    fn literal(&mut self) -> Result<()> {
        self.builder.start_node(Rule::Literal);
        if self.at(TokenKind::LBrace) {
            self.bump();
            self.expect(TokenKind::RBrace)?;
        } else if self.at_literal() {
            self.bump();
        } else {
            return Err(self.unexpected("literal"));
        }
        self.builder.finish_node();
        Ok(())
    }

    /// FHIRPath literal: FML literals plus quantities
    fn fhirpath_literal(&mut self) -> Result<()> {
        let quantity = matches!(self.kind_at(0), TokenKind::Integer | TokenKind::Decimal)
            && (self.kind_at(1) == TokenKind::String
                || self
                    .nth(1)
                    .is_some_and(|t| CALENDAR_UNITS.iter().any(|u| t.is_keyword(u))));
        if !quantity {
            return self.literal();
        }
        self.builder.start_node(Rule::Literal);
        self.builder.start_node(Rule::Quantity);
        self.bump();
        self.bump();
        self.builder.finish_node();
        self.builder.finish_node();
        Ok(())
    }

    // ---- FHIRPath ----

    fn expression(&mut self) -> Result<()> {
        self.implies_expression()
    }

    fn binary_level(
        &mut self,
        rule: Rule,
        is_operator: fn(&Token) -> bool,
        operand: fn(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let checkpoint = self.builder.checkpoint();
        operand(self)?;
        while self.nth(0).is_some_and(is_operator) {
            self.builder.start_node_at(checkpoint, rule);
            self.bump();
            operand(self)?;
            self.builder.finish_node();
        }
        Ok(())
    }

    fn implies_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::ImpliesExpression,
            |t| t.is_keyword("implies"),
            Self::or_expression,
        )
    }

    fn or_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::OrExpression,
            |t| t.is_keyword("or") || t.is_keyword("xor"),
            Self::and_expression,
        )
    }

    fn and_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::AndExpression,
            |t| t.is_keyword("and"),
            Self::membership_expression,
        )
    }

    fn membership_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::MembershipExpression,
            |t| t.is_keyword("in") || t.is_keyword("contains"),
            Self::equality_expression,
        )
    }

    fn equality_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::EqualityExpression,
            |t| {
                matches!(
                    t.kind,
                    TokenKind::Equal | TokenKind::Tilde | TokenKind::NotEqual | TokenKind::NotTilde
                )
            },
            Self::inequality_expression,
        )
    }

    fn inequality_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::InequalityExpression,
            |t| {
                matches!(
                    t.kind,
                    TokenKind::Less
                        | TokenKind::LessEqual
                        | TokenKind::Greater
                        | TokenKind::GreaterEqual
                )
            },
            Self::union_expression,
        )
    }

    fn union_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::UnionExpression,
            |t| t.kind == TokenKind::Pipe,
            Self::type_expression,
        )
    }

    fn type_expression(&mut self) -> Result<()> {
        let checkpoint = self.builder.checkpoint();
        self.additive_expression()?;
        while self.at_keyword("is") || self.at_keyword("as") {
            self.builder.start_node_at(checkpoint, Rule::TypeExpression);
            self.bump();
            self.builder.start_node(Rule::TypeSpecifier);
            self.qualified_identifier()?;
            self.builder.finish_node();
            self.builder.finish_node();
        }
        Ok(())
    }

    fn additive_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::AdditiveExpression,
            |t| matches!(t.kind, TokenKind::Plus | TokenKind::Minus | TokenKind::Ampersand),
            Self::multiplicative_expression,
        )
    }

    fn multiplicative_expression(&mut self) -> Result<()> {
        self.binary_level(
            Rule::MultiplicativeExpression,
            |t| {
                matches!(t.kind, TokenKind::Star | TokenKind::Slash)
                    || t.is_keyword("div")
                    || t.is_keyword("mod")
            },
            Self::polarity_expression,
        )
    }

    fn polarity_expression(&mut self) -> Result<()> {
        if matches!(self.kind_at(0), TokenKind::Plus | TokenKind::Minus) {
            self.builder.start_node(Rule::PolarityExpression);
            self.bump();
            self.polarity_expression()?;
            self.builder.finish_node();
            return Ok(());
        }
        self.postfix_expression()
    }

    fn postfix_expression(&mut self) -> Result<()> {
        let checkpoint = self.builder.checkpoint();
        self.term()?;
        loop {
            if self.at(TokenKind::Dot) {
                self.builder
                    .start_node_at(checkpoint, Rule::InvocationExpression);
                self.bump();
                self.fhirpath_invocation()?;
                self.builder.finish_node();
            } else if self.at(TokenKind::LBracket) {
                self.builder.start_node_at(checkpoint, Rule::IndexerExpression);
                self.bump();
                self.expression()?;
                self.expect(TokenKind::RBracket)?;
                self.builder.finish_node();
            } else {
                return Ok(());
            }
        }
    }

    fn term(&mut self) -> Result<()> {
        self.builder.start_node(Rule::TermExpression);
        if self.at(TokenKind::LParen) {
            self.builder.start_node(Rule::ParenthesizedTerm);
            self.bump();
            self.expression()?;
            self.expect(TokenKind::RParen)?;
            self.builder.finish_node();
        } else if self.at(TokenKind::Percent) {
            self.builder.start_node(Rule::ExternalConstantTerm);
            self.bump();
            match self.kind_at(0) {
                TokenKind::Identifier | TokenKind::DelimitedIdentifier | TokenKind::String => {
                    self.bump()
                }
                _ => return Err(self.unexpected("constant name")),
            }
            self.builder.finish_node();
        } else if self.at_literal() {
            self.builder.start_node(Rule::LiteralTerm);
            self.fhirpath_literal()?;
            self.builder.finish_node();
        } else if self.at_identifier() {
            self.builder.start_node(Rule::InvocationTerm);
            self.fhirpath_invocation()?;
            self.builder.finish_node();
        } else {
            return Err(self.unexpected_with(FML0010, "expression"));
        }
        self.builder.finish_node();
        Ok(())
    }

    fn fhirpath_invocation(&mut self) -> Result<()> {
        for (keyword, rule) in [
            ("$this", Rule::ThisInvocation),
            ("$index", Rule::IndexInvocation),
            ("$total", Rule::TotalInvocation),
        ] {
            if self.at_keyword(keyword) {
                self.builder.start_node(rule);
                self.bump();
                self.builder.finish_node();
                return Ok(());
            }
        }
        if !self.at_identifier() {
            return Err(self.unexpected("member or function name"));
        }
        if self.kind_at(1) != TokenKind::LParen {
            self.builder.start_node(Rule::MemberInvocation);
            self.identifier()?;
            self.builder.finish_node();
            return Ok(());
        }
        self.builder.start_node(Rule::FunctionInvocation);
        self.identifier()?;
        self.bump();
        if !self.at(TokenKind::RParen) {
            self.builder.start_node(Rule::FunctionParamList);
            self.expression()?;
            while self.at(TokenKind::Comma) {
                self.bump();
                self.expression()?;
            }
            self.builder.finish_node();
        }
        self.expect(TokenKind::RParen)?;
        self.builder.finish_node();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::tree::{SyntaxNode, SyntaxNodeExt};
    use pretty_assertions::assert_eq;

    fn tree(source: &str) -> SyntaxNode {
        let lexed = lex(source).unwrap();
        SyntaxNode::new_root(parse_structure_map(source, &lexed.tokens).unwrap())
    }

    fn expression_tree(source: &str) -> SyntaxNode {
        let lexed = lex(source).unwrap();
        SyntaxNode::new_root(parse_fhirpath(source, &lexed.tokens).unwrap())
    }

    fn rules(source: &str) -> Vec<Rule> {
        let root = tree(source);
        let group = root.node(Rule::GroupDeclaration).unwrap();
        let body = group.node(Rule::GroupExpressions).unwrap();
        body.children().filter_map(|n| n.rule()).collect()
    }

    #[test]
    fn test_rule_classification() {
        let source = r#"group g(source src, target tgt) {
            src.a -> tgt.a;
            src.b as b -> tgt.b = b;
            src.c.exists();
            src -> tgt.d = 'x' "named";
            src.e : string;
        }"#;
        assert_eq!(
            rules(source),
            vec![
                Rule::MapSimpleCopy,
                Rule::MapExpression,
                Rule::MapFhirPath,
                Rule::MapExpression,
                Rule::MapExpression,
            ]
        );
    }

    #[test]
    fn test_then_block_semicolon_is_optional() {
        let source = r#"group g(source src, target tgt) {
            src.a as a -> tgt.a as t then { a.b -> t.b; }
            src.c as c then g2(c, tgt);
        }"#;
        assert_eq!(rules(source), vec![Rule::MapExpression, Rule::MapExpression]);
    }

    #[test]
    fn test_tree_is_lossless() {
        let source = "/// url = 'http://x'\n\n// lead\ngroup g(source s) {\n  s.a -> s.b; /* tail */\n}\n";
        assert_eq!(tree(source).text().to_string(), source);
        assert_eq!(tree("").text().to_string(), "");
    }

    #[test]
    fn test_precedence() {
        let root = expression_tree("1 + 2 * 3 = 7 and true");
        let top = root.expressions().next().unwrap();
        assert_eq!(top.rule(), Some(Rule::AndExpression));
        let equality = top.expressions().next().unwrap();
        assert_eq!(equality.rule(), Some(Rule::EqualityExpression));
        let additive = equality.expressions().next().unwrap();
        assert_eq!(additive.rule(), Some(Rule::AdditiveExpression));
        assert_eq!(
            additive.expressions().filter_map(|e| e.rule()).collect::<Vec<_>>(),
            vec![Rule::TermExpression, Rule::MultiplicativeExpression]
        );
    }

    #[test]
    fn test_left_associative_invocations() {
        let root = expression_tree("a.b.c");
        let top = root.expressions().next().unwrap();
        assert_eq!(top.rule(), Some(Rule::InvocationExpression));
        assert_eq!(top.text().to_string(), "a.b.c");
        let inner = top.expressions().next().unwrap();
        assert_eq!(inner.rule(), Some(Rule::InvocationExpression));
        assert_eq!(inner.text().to_string(), "a.b");
    }

    #[test]
    fn test_missing_semicolon_reports_expected() {
        let source = "group g(source s) { s.a -> s.b }";
        let lexed = lex(source).unwrap();
        let error = parse_structure_map(source, &lexed.tokens).unwrap_err();
        assert_eq!(error.code(), FML0001);
        assert_eq!(error.to_string(), "FML0001: Unexpected `}`");
    }

    #[test]
    fn test_unexpected_end_of_input() {
        let source = "group g(source s) {";
        let lexed = lex(source).unwrap();
        let error = parse_structure_map(source, &lexed.tokens).unwrap_err();
        assert_eq!(error.code(), FML0002);
    }
}
