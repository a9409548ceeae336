//! AST builder
//!
//! Converts a [`SyntaxTree`] into a [`FhirStructureMap`]. Every production maps
//! to exactly one AST node type; spans and raw text are copied from the node's
//! first and last significant tokens and comments are looked up in the side table
//! by offset.
//!
//! A parse tree that is missing a structurally required part is a hard failure
//! (`FML0050`): it means the tree and the builder disagree about the grammar.

use crate::lexer::TokenKind;
use crate::tree::{Rule, SyntaxKind, SyntaxNode, SyntaxNodeExt, SyntaxToken, SyntaxTree};
use indexmap::IndexMap;
use octofhir_fml_ast::{
    BinaryExpression, BoxExpr, Cardinality, ConceptMapCode, ConceptMapCodeMap, ConceptMapDeclaration,
    ConceptMapPrefix, ConstantDeclaration, DependentExpression, FhirPathStatement, FhirStructureMap,
    FmlExpressionSource, FmlExpressionTarget, FmlNode, FpExpression, FpFunction, FpInvocation,
    FpTerm, GroupDeclaration, GroupExpression, GroupParameter, GroupTypeMode, ImportDeclaration,
    IndexerExpression, Invocation, InvocationArgument, InvocationExpression, Literal,
    MapDeclaration, MappingExpression, MetadataDeclaration, MetadataValue, ModelMode, Node,
    ParameterMode, PolarityExpression, QualifiedIdentifier, QuantityLiteral, SimpleCopyExpression,
    SourceListMode, StructureDeclaration, TargetListMode, Transform, TypeExpression,
};
use octofhir_fml_diagnostics::{FML0050, FmlError, Result};
use rust_decimal::Decimal;

/// Build the AST for a whole structure map
pub fn build(tree: &SyntaxTree) -> Result<FhirStructureMap> {
    AstBuilder { tree }.structure_map(&tree.root())
}

/// Build the AST for a standalone expression tree (root [`Rule::Expression`])
pub(crate) fn build_expression(tree: &SyntaxTree) -> Result<Node<FpExpression>> {
    let builder = AstBuilder { tree };
    let expression = builder.required_expression(&tree.root())?;
    builder.expression(&expression)
}

struct AstBuilder<'t> {
    tree: &'t SyntaxTree,
}

impl<'t> AstBuilder<'t> {
    // ---- node plumbing ----

    fn malformed(&self, node: &SyntaxNode, message: impl Into<String>) -> FmlError {
        let location = self.tree.span_of(node).map(|span| span.location());
        let rule = match node.kind() {
            SyntaxKind::Node(rule) => format!("{rule:?}"),
            other => format!("{other:?}"),
        };
        FmlError::build(FML0050, rule, message, location)
    }

    fn base(&self, node: &SyntaxNode) -> Result<FmlNode> {
        let (Some(span), Some(text)) = (self.tree.span_of(node), self.tree.text_of(node)) else {
            return Err(self.malformed(node, "node does not cover any token"));
        };
        let mut base = FmlNode::new(text, span);
        base.prefix_comments = self
            .tree
            .comments
            .leading_at(span.start_index)
            .iter()
            .map(|c| c.text.clone())
            .collect();
        base.postfix_comments = self
            .tree
            .comments
            .trailing_at(span.stop_index)
            .iter()
            .map(|c| c.text.clone())
            .collect();
        Ok(base)
    }

    fn node<T>(&self, syntax: &SyntaxNode, inner: T) -> Result<Node<T>> {
        Ok(Node::new(inner, self.base(syntax)?))
    }

    fn required(&self, node: &SyntaxNode, rule: Rule) -> Result<SyntaxNode> {
        node.node(rule)
            .ok_or_else(|| self.malformed(node, format!("missing {rule:?}")))
    }

    fn required_expression(&self, node: &SyntaxNode) -> Result<SyntaxNode> {
        node.expressions()
            .next()
            .ok_or_else(|| self.malformed(node, "missing expression"))
    }

    /// Text of the first direct child token
    fn first_token_text(&self, node: &SyntaxNode) -> Result<String> {
        node.child_tokens()
            .next()
            .map(|t| t.text().to_string())
            .ok_or_else(|| self.malformed(node, "missing token"))
    }

    /// Text of the last direct child token
    fn last_token_text(&self, node: &SyntaxNode) -> Result<String> {
        node.child_tokens()
            .last()
            .map(|t| t.text().to_string())
            .ok_or_else(|| self.malformed(node, "missing token"))
    }

    /// Concatenated text of the direct child tokens accepted by `keep`
    fn joined_tokens(&self, node: &SyntaxNode, keep: impl Fn(&SyntaxToken) -> bool) -> String {
        node.child_tokens()
            .filter(|t| keep(t))
            .map(|t| t.text().to_string())
            .collect()
    }

    // ---- terminals ----

    fn identifier(&self, node: &SyntaxNode) -> Result<String> {
        let token = node
            .child_tokens()
            .next()
            .ok_or_else(|| self.malformed(node, "missing identifier token"))?;
        Ok(match token.kind().token_kind() {
            Some(TokenKind::DelimitedIdentifier) => unquote(token.text()),
            _ => token.text().to_string(),
        })
    }

    /// An `Identifier` child as a spanned string
    fn identifier_node(&self, parent: &SyntaxNode) -> Result<Node<String>> {
        let ident = self.required(parent, Rule::Identifier)?;
        self.node(&ident, self.identifier(&ident)?)
    }

    fn qualified_identifier(&self, node: &SyntaxNode) -> Result<Node<QualifiedIdentifier>> {
        let segments = node
            .nodes_of(Rule::Identifier)
            .map(|ident| self.identifier(&ident))
            .collect::<Result<Vec<_>>>()?;
        if segments.is_empty() {
            return Err(self.malformed(node, "qualified identifier without segments"));
        }
        self.node(node, QualifiedIdentifier::new(segments))
    }

    fn url(&self, parent: &SyntaxNode) -> Result<String> {
        let url = self.required(parent, Rule::Url)?;
        Ok(unquote(&self.first_token_text(&url)?))
    }

    fn literal(&self, node: &SyntaxNode) -> Result<Literal> {
        if let Some(quantity) = node.node(Rule::Quantity) {
            return self.quantity(&quantity);
        }
        let token = node
            .child_tokens()
            .next()
            .ok_or_else(|| self.malformed(node, "empty literal"))?;
        let text = token.text();
        let Some(kind) = token.kind().token_kind() else {
            return Err(self.malformed(node, "empty literal"));
        };
        let literal = match kind {
            TokenKind::LBrace => Literal::Null,
            TokenKind::Integer => match text.parse::<i64>() {
                Ok(value) => Literal::Integer(value),
                Err(_) => Literal::Decimal(self.decimal(node, text)?),
            },
            TokenKind::Decimal => Literal::Decimal(self.decimal(node, text)?),
            TokenKind::String => Literal::String(unquote(text)),
            TokenKind::Date => Literal::Date(text.trim_start_matches('@').to_string()),
            TokenKind::DateTime => Literal::DateTime(text.trim_start_matches('@').to_string()),
            TokenKind::Time => Literal::Time(text.trim_start_matches("@T").to_string()),
            TokenKind::Identifier if text == "true" => Literal::Boolean(true),
            TokenKind::Identifier if text == "false" => Literal::Boolean(false),
            _ => return Err(self.malformed(node, format!("`{text}` is not a literal"))),
        };
        Ok(literal)
    }

    fn decimal(&self, node: &SyntaxNode, text: &str) -> Result<Decimal> {
        text.parse::<Decimal>()
            .map_err(|e| self.malformed(node, format!("invalid number `{text}`: {e}")))
    }

    fn quantity(&self, node: &SyntaxNode) -> Result<Literal> {
        let mut tokens = node.child_tokens();
        let (Some(value), Some(unit)) = (tokens.next(), tokens.next()) else {
            return Err(self.malformed(node, "quantity needs a value and a unit"));
        };
        let unit = match unit.kind().token_kind() {
            Some(TokenKind::String) => unquote(unit.text()),
            _ => unit.text().to_string(),
        };
        Ok(Literal::Quantity(QuantityLiteral {
            value: self.decimal(node, value.text())?,
            unit,
        }))
    }

    // ---- declarations ----

    fn structure_map(&self, root: &SyntaxNode) -> Result<FhirStructureMap> {
        if root.rule() != Some(Rule::StructureMap) {
            return Err(self.malformed(root, "expected a structure map root"));
        }
        let mut map = FhirStructureMap::new();
        for child in root.children() {
            match child.rule() {
                Some(Rule::MetadataDeclaration) => map.add_metadata(self.metadata(&child)?),
                Some(Rule::ConceptMapDeclaration) => map.add_concept_map(self.concept_map(&child)?),
                Some(Rule::MapDeclaration) => {
                    let declaration = self.map_declaration(&child)?;
                    if map.map.is_none() {
                        map.map = Some(declaration);
                    }
                }
                Some(Rule::StructureDeclaration) => map.add_structure(self.structure(&child)?),
                Some(Rule::ImportDeclaration) => {
                    let import = ImportDeclaration {
                        url: self.url(&child)?,
                    };
                    map.add_import(self.node(&child, import)?);
                }
                Some(Rule::ConstantDeclaration) => {
                    let constant = ConstantDeclaration {
                        name: self.identifier(&self.required(&child, Rule::Identifier)?)?,
                        expression: self.expression(&self.required_expression(&child)?)?,
                    };
                    map.add_constant(self.node(&child, constant)?);
                }
                Some(Rule::GroupDeclaration) => map.add_group(self.group(&child)?),
                _ => {
                    return Err(self.malformed(&child, "unexpected node at top level"));
                }
            }
        }
        Ok(map)
    }

    fn metadata(&self, node: &SyntaxNode) -> Result<Node<MetadataDeclaration>> {
        let path = self
            .qualified_identifier(&self.required(node, Rule::QualifiedIdentifier)?)?
            .to_string();
        let value = if let Some(markdown) = node.node(Rule::MarkdownLiteral) {
            Some(MetadataValue::Markdown(unquote(&self.first_token_text(&markdown)?)))
        } else if let Some(literal) = node.node(Rule::Literal) {
            Some(MetadataValue::Literal(self.literal(&literal)?))
        } else {
            None
        };
        self.node(node, MetadataDeclaration { path, value })
    }

    fn concept_map(&self, node: &SyntaxNode) -> Result<Node<ConceptMapDeclaration>> {
        let mut prefixes = IndexMap::new();
        for prefix in node.nodes_of(Rule::ConceptMapPrefix) {
            let id = self.identifier(&self.required(&prefix, Rule::Identifier)?)?;
            let url = self.url(&prefix)?;
            let prefix_node = self.node(&prefix, ConceptMapPrefix { id: id.clone(), url })?;
            prefixes.entry(id).or_insert(prefix_node);
        }
        let mappings = node
            .nodes_of(Rule::ConceptMapCodeMap)
            .map(|mapping| self.concept_map_code_map(&mapping))
            .collect::<Result<Vec<_>>>()?;
        let declaration = ConceptMapDeclaration {
            url: self.url(node)?,
            prefixes,
            mappings,
        };
        self.node(node, declaration)
    }

    fn concept_map_code_map(&self, node: &SyntaxNode) -> Result<Node<ConceptMapCodeMap>> {
        let codes = node
            .nodes_of(Rule::ConceptMapCode)
            .map(|code| self.concept_map_code(&code))
            .collect::<Result<Vec<_>>>()?;
        let [source, target]: [ConceptMapCode; 2] = codes
            .try_into()
            .map_err(|_| self.malformed(node, "expected a source and a target code"))?;
        let relationship = self.joined_tokens(node, |_| true);
        if relationship.is_empty() {
            return Err(self.malformed(node, "missing relationship"));
        }
        self.node(
            node,
            ConceptMapCodeMap {
                source,
                relationship,
                target,
            },
        )
    }

    fn concept_map_code(&self, node: &SyntaxNode) -> Result<ConceptMapCode> {
        let prefix = self.identifier(&self.required(node, Rule::Identifier)?)?;
        let code = self.last_token_text(node)?;
        let code = match code.chars().next() {
            Some('\'' | '"' | '`') => unquote(&code),
            _ => code,
        };
        Ok(ConceptMapCode { prefix, code })
    }

    fn map_declaration(&self, node: &SyntaxNode) -> Result<Node<MapDeclaration>> {
        let identifier = match node.node(Rule::Identifier) {
            Some(ident) => self.identifier(&ident)?,
            None => {
                let name = node
                    .child_tokens()
                    .find(|t| {
                        matches!(
                            t.kind().token_kind(),
                            Some(TokenKind::String | TokenKind::DoubleQuotedString)
                        )
                    })
                    .ok_or_else(|| self.malformed(node, "missing map name"))?;
                unquote(name.text())
            }
        };
        let declaration = MapDeclaration {
            url: self.url(node)?,
            identifier,
        };
        self.node(node, declaration)
    }

    fn structure(&self, node: &SyntaxNode) -> Result<Node<StructureDeclaration>> {
        let alias = match node.node(Rule::Alias) {
            Some(alias) => Some(self.identifier(&self.required(&alias, Rule::Identifier)?)?),
            None => None,
        };
        let mode_text = self.last_token_text(node)?;
        let mode = ModelMode::from_keyword(&mode_text)
            .ok_or_else(|| self.malformed(node, format!("unknown model mode `{mode_text}`")))?;
        let declaration = StructureDeclaration {
            url: self.url(node)?,
            alias,
            mode,
        };
        self.node(node, declaration)
    }

    // ---- groups ----

    fn group(&self, node: &SyntaxNode) -> Result<Node<GroupDeclaration>> {
        let name = self.identifier(&self.required(node, Rule::Identifier)?)?;
        let mut group = GroupDeclaration::new(name);

        let parameters = self.required(node, Rule::Parameters)?;
        group.parameters = parameters
            .nodes_of(Rule::Parameter)
            .map(|p| self.parameter(&p))
            .collect::<Result<_>>()?;

        if let Some(extends) = node.node(Rule::Extends) {
            group.extends = Some(self.identifier_node(&extends)?);
        }
        if let Some(type_mode) = node.node(Rule::TypeMode) {
            let keyword = self.joined_tokens(&type_mode, |t| {
                !matches!(
                    t.kind().token_kind(),
                    Some(TokenKind::DoubleLess | TokenKind::DoubleGreater)
                )
            });
            group.type_mode = Some(
                GroupTypeMode::from_keyword(&keyword)
                    .ok_or_else(|| self.malformed(&type_mode, format!("unknown type mode `{keyword}`")))?,
            );
        }

        group.rules = self.rules(&self.required(node, Rule::GroupExpressions)?)?;
        self.node(node, group)
    }

    fn parameter(&self, node: &SyntaxNode) -> Result<Node<GroupParameter>> {
        let mode = match self.first_token_text(node)?.as_str() {
            "source" => ParameterMode::Source,
            "target" => ParameterMode::Target,
            other => return Err(self.malformed(node, format!("unknown parameter mode `{other}`"))),
        };
        let identifier = self.identifier(&self.required(node, Rule::Identifier)?)?;
        let type_identifier = match node.node(Rule::TypeIdentifier) {
            Some(type_identifier) => Some(self.identifier_node(&type_identifier)?),
            None => None,
        };
        self.node(
            node,
            GroupParameter {
                mode,
                identifier,
                type_identifier,
            },
        )
    }

    fn rules(&self, node: &SyntaxNode) -> Result<Vec<Node<GroupExpression>>> {
        node.children().map(|rule| self.rule(&rule)).collect()
    }

    fn rule(&self, node: &SyntaxNode) -> Result<Node<GroupExpression>> {
        let expression = match node.rule() {
            Some(Rule::MapSimpleCopy) => GroupExpression::SimpleCopy(self.simple_copy(node)?),
            Some(Rule::MapFhirPath) => GroupExpression::FhirPath(FhirPathStatement {
                expression: self.expression(&self.required_expression(node)?)?,
            }),
            Some(Rule::MapExpression) => GroupExpression::Mapping(self.mapping(node)?),
            _ => return Err(self.malformed(node, "unexpected node in group body")),
        };
        self.node(node, expression)
    }

    fn rule_name(&self, node: &SyntaxNode) -> Result<Option<Node<String>>> {
        match node.node(Rule::MapExpressionName) {
            Some(name) => Ok(Some(self.node(&name, unquote(&self.first_token_text(&name)?))?)),
            None => Ok(None),
        }
    }

    fn simple_copy(&self, node: &SyntaxNode) -> Result<SimpleCopyExpression> {
        let paths: Vec<SyntaxNode> = node.nodes_of(Rule::QualifiedIdentifier).collect();
        let [source, target] = &paths[..] else {
            return Err(self.malformed(
                node,
                format!("expected two path identifiers, found {}", paths.len()),
            ));
        };
        Ok(SimpleCopyExpression {
            source: self.qualified_identifier(source)?,
            target: self.qualified_identifier(target)?,
            name: self.rule_name(node)?,
        })
    }

    fn mapping(&self, node: &SyntaxNode) -> Result<MappingExpression> {
        let sources = node
            .nodes_of(Rule::MapExpressionSource)
            .map(|s| self.source(&s))
            .collect::<Result<Vec<_>>>()?;
        if sources.is_empty() {
            return Err(self.malformed(node, "mapping rule without a source"));
        }
        let targets = node
            .nodes_of(Rule::MapExpressionTarget)
            .map(|t| self.target(&t))
            .collect::<Result<Vec<_>>>()?;
        let dependent = match node.node(Rule::DependentExpression) {
            Some(dependent) => Some(self.dependent(&dependent)?),
            None => None,
        };
        Ok(MappingExpression {
            sources,
            targets,
            dependent,
            name: self.rule_name(node)?,
        })
    }

    fn clause(&self, node: &SyntaxNode, rule: Rule) -> Result<Option<Node<FpExpression>>> {
        match node.node(rule) {
            Some(clause) => Ok(Some(self.expression(&self.required_expression(&clause)?)?)),
            None => Ok(None),
        }
    }

    fn source(&self, node: &SyntaxNode) -> Result<Node<FmlExpressionSource>> {
        let mut source = FmlExpressionSource::new(
            self.qualified_identifier(&self.required(node, Rule::QualifiedIdentifier)?)?,
        );
        if let Some(type_identifier) = node.node(Rule::TypeIdentifier) {
            source.type_identifier = Some(self.identifier_node(&type_identifier)?);
        }
        if let Some(cardinality) = node.node(Rule::SourceCardinality) {
            source.cardinality = Some(self.cardinality(&cardinality)?);
        }
        source.default_value = self.clause(node, Rule::SourceDefault)?;
        if let Some(list_mode) = node.node(Rule::SourceListMode) {
            let keyword = self.first_token_text(&list_mode)?;
            source.list_mode = Some(
                SourceListMode::from_keyword(&keyword)
                    .ok_or_else(|| self.malformed(&list_mode, format!("unknown list mode `{keyword}`")))?,
            );
        }
        if let Some(alias) = node.node(Rule::Alias) {
            source.alias = Some(self.identifier_node(&alias)?);
        }
        source.where_clause = self.clause(node, Rule::WhereClause)?;
        source.check_clause = self.clause(node, Rule::CheckClause)?;
        source.log_expression = self.clause(node, Rule::LogClause)?;
        self.node(node, source)
    }

    fn cardinality(&self, node: &SyntaxNode) -> Result<Node<Cardinality>> {
        let bounds: Vec<String> = node
            .child_tokens()
            .filter(|t| t.kind().token_kind() != Some(TokenKind::DotDot))
            .map(|t| t.text().to_string())
            .collect();
        let [min, max] = &bounds[..] else {
            return Err(self.malformed(node, "cardinality needs a lower and an upper bound"));
        };
        let parse = |text: &str| {
            text.parse::<u32>()
                .map_err(|e| self.malformed(node, format!("invalid bound `{text}`: {e}")))
        };
        let cardinality = Cardinality {
            min: parse(min.as_str())?,
            max: if max == "*" { None } else { Some(parse(max.as_str())?) },
        };
        self.node(node, cardinality)
    }

    fn target(&self, node: &SyntaxNode) -> Result<Node<FmlExpressionTarget>> {
        let (identifier, transform) = if let Some(invocation) = node.node(Rule::Invocation) {
            let Node { inner, base } = self.invocation(&invocation)?;
            (None, Some(Node::new(Transform::Invocation(inner), base)))
        } else {
            let identifier =
                self.qualified_identifier(&self.required(node, Rule::QualifiedIdentifier)?)?;
            let transform = match node.node(Rule::Transform) {
                Some(transform) => Some(self.transform(&transform)?),
                None => None,
            };
            (Some(identifier), transform)
        };
        let alias = match node.node(Rule::Alias) {
            Some(alias) => Some(self.identifier_node(&alias)?),
            None => None,
        };
        let list_mode = match node.node(Rule::TargetListMode) {
            Some(list_mode) => {
                let keyword = self.first_token_text(&list_mode)?;
                Some(
                    TargetListMode::from_keyword(&keyword)
                        .ok_or_else(|| self.malformed(&list_mode, format!("unknown list mode `{keyword}`")))?,
                )
            }
            None => None,
        };
        self.node(
            node,
            FmlExpressionTarget {
                identifier,
                transform,
                alias,
                list_mode,
            },
        )
    }

    fn transform(&self, node: &SyntaxNode) -> Result<Node<Transform>> {
        let transform = if let Some(literal) = node.node(Rule::Literal) {
            Transform::Literal(self.literal(&literal)?)
        } else if let Some(invocation) = node.node(Rule::Invocation) {
            Transform::Invocation(self.invocation(&invocation)?.inner)
        } else if let Some(path) = node.node(Rule::QualifiedIdentifier) {
            Transform::Identifier(self.qualified_identifier(&path)?.inner)
        } else if let Some(expression) = node.expressions().next() {
            Transform::Expression(Box::new(self.expression(&expression)?))
        } else {
            return Err(self.malformed(node, "empty transform"));
        };
        self.node(node, transform)
    }

    fn invocation(&self, node: &SyntaxNode) -> Result<Node<Invocation>> {
        let name = self.identifier(&self.required(node, Rule::Identifier)?)?;
        let arguments = match node.node(Rule::ParamList) {
            Some(params) => params
                .nodes_of(Rule::Param)
                .map(|param| self.invocation_argument(&param))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        self.node(node, Invocation { name, arguments })
    }

    fn invocation_argument(&self, node: &SyntaxNode) -> Result<Node<InvocationArgument>> {
        let argument = if let Some(literal) = node.node(Rule::Literal) {
            InvocationArgument::Literal(self.literal(&literal)?)
        } else {
            InvocationArgument::Identifier(self.identifier(&self.required(node, Rule::Identifier)?)?)
        };
        self.node(node, argument)
    }

    fn dependent(&self, node: &SyntaxNode) -> Result<Node<DependentExpression>> {
        let invocations = node
            .nodes_of(Rule::Invocation)
            .map(|i| self.invocation(&i))
            .collect::<Result<Vec<_>>>()?;
        let block = node.node(Rule::GroupExpressions);
        if invocations.is_empty() && block.is_none() {
            return Err(self.malformed(node, "`then` without invocation or rules"));
        }
        let rules = match block {
            Some(block) => self.rules(&block)?,
            None => Vec::new(),
        };
        self.node(node, DependentExpression { invocations, rules })
    }

    // ---- FHIRPath ----

    fn boxed(&self, node: &SyntaxNode) -> Result<BoxExpr> {
        Ok(Box::new(self.expression(node)?))
    }

    fn operands(&self, node: &SyntaxNode) -> Result<(Node<FpExpression>, Node<FpExpression>)> {
        let operands: Vec<SyntaxNode> = node.expressions().collect();
        let [left, right] = &operands[..] else {
            return Err(self.malformed(
                node,
                format!("expected two operands, found {}", operands.len()),
            ));
        };
        Ok((self.expression(left)?, self.expression(right)?))
    }

    fn binary(&self, node: &SyntaxNode) -> Result<BinaryExpression> {
        let (left, right) = self.operands(node)?;
        let operator = self.joined_tokens(node, |_| true);
        if operator.is_empty() {
            return Err(self.malformed(node, "missing operator"));
        }
        Ok(BinaryExpression::new(left, operator, right))
    }

    fn expression(&self, node: &SyntaxNode) -> Result<Node<FpExpression>> {
        let Some(rule) = node.rule() else {
            return Err(self.malformed(node, "not an expression"));
        };
        let expression = match rule {
            Rule::TermExpression => {
                let term = node
                    .children()
                    .next()
                    .ok_or_else(|| self.malformed(node, "empty term"))?;
                FpExpression::Term(self.term(&term)?)
            }
            Rule::InvocationExpression => {
                let target = self.boxed(&self.required_expression(node)?)?;
                let invocation = node
                    .children()
                    .find(|n| !n.rule().is_some_and(|r| r.is_expression()))
                    .ok_or_else(|| self.malformed(node, "missing invocation"))?;
                FpExpression::Invocation(InvocationExpression {
                    target,
                    invocation: self.fhirpath_invocation(&invocation)?,
                })
            }
            Rule::IndexerExpression => {
                let (target, index) = self.operands(node)?;
                FpExpression::Indexer(IndexerExpression {
                    target: Box::new(target),
                    index: Box::new(index),
                })
            }
            Rule::PolarityExpression => FpExpression::Polarity(PolarityExpression {
                operator: self.first_token_text(node)?,
                operand: self.boxed(&self.required_expression(node)?)?,
            }),
            Rule::TypeExpression => {
                let specifier = self.required(node, Rule::TypeSpecifier)?;
                let path = self
                    .qualified_identifier(&self.required(&specifier, Rule::QualifiedIdentifier)?)?;
                FpExpression::Type(TypeExpression {
                    operand: self.boxed(&self.required_expression(node)?)?,
                    operator: self.first_token_text(node)?,
                    type_specifier: self.node(&specifier, path.inner)?,
                })
            }
            Rule::MultiplicativeExpression => FpExpression::Multiplicative(self.binary(node)?),
            Rule::AdditiveExpression => FpExpression::Additive(self.binary(node)?),
            Rule::UnionExpression => FpExpression::Union(self.binary(node)?),
            Rule::InequalityExpression => FpExpression::Inequality(self.binary(node)?),
            Rule::EqualityExpression => FpExpression::Equality(self.binary(node)?),
            Rule::MembershipExpression => FpExpression::Membership(self.binary(node)?),
            Rule::AndExpression => FpExpression::And(self.binary(node)?),
            Rule::OrExpression => FpExpression::Or(self.binary(node)?),
            Rule::ImpliesExpression => FpExpression::Implies(self.binary(node)?),
            other => return Err(self.malformed(node, format!("{other:?} is not an expression"))),
        };
        self.node(node, expression)
    }

    fn term(&self, node: &SyntaxNode) -> Result<FpTerm> {
        Ok(match node.rule() {
            Some(Rule::InvocationTerm) => {
                let invocation = node
                    .children()
                    .next()
                    .ok_or_else(|| self.malformed(node, "missing invocation"))?;
                FpTerm::Invocation(self.fhirpath_invocation(&invocation)?.inner)
            }
            Some(Rule::LiteralTerm) => {
                FpTerm::Literal(self.literal(&self.required(node, Rule::Literal)?)?)
            }
            Some(Rule::ExternalConstantTerm) => {
                let name = node
                    .child_tokens()
                    .find(|t| t.kind().token_kind() != Some(TokenKind::Percent))
                    .ok_or_else(|| self.malformed(node, "missing constant name"))?;
                FpTerm::ExternalConstant(match name.kind().token_kind() {
                    Some(TokenKind::Identifier) => name.text().to_string(),
                    _ => unquote(name.text()),
                })
            }
            Some(Rule::ParenthesizedTerm) => {
                FpTerm::Parenthesized(self.boxed(&self.required_expression(node)?)?)
            }
            _ => return Err(self.malformed(node, "not a term")),
        })
    }

    fn fhirpath_invocation(&self, node: &SyntaxNode) -> Result<Node<FpInvocation>> {
        let invocation = match node.rule() {
            Some(Rule::MemberInvocation) => {
                FpInvocation::Member(self.identifier(&self.required(node, Rule::Identifier)?)?)
            }
            Some(Rule::FunctionInvocation) => {
                let name = self.identifier(&self.required(node, Rule::Identifier)?)?;
                let arguments = match node.node(Rule::FunctionParamList) {
                    Some(params) => params
                        .expressions()
                        .map(|arg| self.expression(&arg))
                        .collect::<Result<Vec<_>>>()?,
                    None => Vec::new(),
                };
                FpInvocation::Function(FpFunction { name, arguments })
            }
            Some(Rule::ThisInvocation) => FpInvocation::This,
            Some(Rule::IndexInvocation) => FpInvocation::Index,
            Some(Rule::TotalInvocation) => FpInvocation::Total,
            _ => return Err(self.malformed(node, "not an invocation")),
        };
        self.node(node, invocation)
    }
}

/// Strip the surrounding quotes (`'`, `"`, `` ` `` or `"""`) and resolve escapes
pub(crate) fn unquote(text: &str) -> String {
    // markdown blocks are verbatim
    if text.len() >= 6 && text.starts_with("\"\"\"") && text.ends_with("\"\"\"") {
        return text[3..text.len() - 3].to_string();
    }
    let quoted = text.len() >= 2
        && matches!(text.as_bytes()[0], b'\'' | b'"' | b'`')
        && text.as_bytes()[0] == text.as_bytes()[text.len() - 1];
    if quoted {
        unescape(&text[1..text.len() - 1])
    } else {
        unescape(text)
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::tree::TreeSink;
    use rstest::rstest;

    #[rstest]
    #[case("'abc'", "abc")]
    #[case("\"http://x\"", "http://x")]
    #[case("`div`", "div")]
    #[case(r"'it\'s'", "it's")]
    #[case(r"'a\nb'", "a\nb")]
    #[case(r"'\u0041'", "A")]
    #[case("\"\"\"# Title\n\\n\"\"\"", "# Title\n\\n")]
    fn test_unquote(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(unquote(input), expected);
    }

    #[test]
    fn test_simple_copy_with_one_path_is_malformed() {
        let source = "a -> ;";
        let lexed = lex(source).unwrap();
        let tokens = lexed.tokens;

        let mut sink = TreeSink::new(source);
        sink.start_node(Rule::MapSimpleCopy);
        sink.start_node(Rule::QualifiedIdentifier);
        sink.start_node(Rule::Identifier);
        sink.token(&tokens[0]);
        sink.finish_node();
        sink.finish_node();
        sink.token(&tokens[1]);
        sink.token(&tokens[2]);
        sink.finish_node();

        let tree = SyntaxTree::new(source, tokens, lexed.comments, sink.finish());
        let error = AstBuilder { tree: &tree }.rule(&tree.root()).unwrap_err();
        assert_eq!(error.code(), FML0050);
        assert_eq!(
            error.to_string(),
            "FML0050: malformed MapSimpleCopy: expected two path identifiers, found 1"
        );
    }
}
