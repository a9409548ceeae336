//! Semantic validation of structure maps
//!
//! The validator walks a map group by group and rule by rule, resolving every
//! source, target and transform against the source and target models. It never
//! stops at the first problem: each issue becomes a [`Diagnostic`] and
//! validation continues with the type left unknown.
//!
//! Map-level checks run first, in this order: duplicate declarations, metadata,
//! concept map prefixes, constants, and extended groups. Groups are then
//! validated in declaration order.

use crate::compatibility::{check_type_compatibility, describe_unmatched};
use crate::compiler::{CompilerContext, FhirPathTypeCompiler, PathExpressionCompiler};
use crate::context::{ValidationContext, ValidationReport};
use crate::details::{ModelSide, PropertyOrTypeDetails};
use crate::groups::{GroupRegistry, TypedGroupIndex, type_url};
use crate::inference::infer_expression_type;
use crate::invocation::{TransformReturn, builtin_transform};
use crate::scope::{Scope, ScopeError};
use crate::system_types::SystemType;
use futures::future::{BoxFuture, FutureExt};
use octofhir_fml_ast::{
    DependentExpression, FhirStructureMap, FmlExpressionSource, FmlExpressionTarget, FpExpression,
    GroupDeclaration, GroupExpression, GroupParameter, Invocation, InvocationArgument, Literal,
    MappingExpression, Node, ParameterMode, QualifiedIdentifier, SimpleCopyExpression,
    StructureMapHeader, Transform,
};
use octofhir_fml_diagnostics::{
    DiagnosticCategory, FML0101, FML0102, FML0103, FML0104, FML0105, FML0106, FML0107, FML0110,
    FML0111, FML0120, FML0121, FML0122, FML0130, FML0131, FML0132, FML0133, FML0134, FML0135,
    FML0136, FML0150, TokenSpan,
};
use octofhir_fml_model::{ModelResolver, StructureDefinitionWalker, WalkerError, type_canonical};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

static RULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-.]{1,64}$").unwrap());

/// Validator options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Drop compiler hints about bare identifiers that name variables
    pub suppress_variable_hint: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            suppress_variable_hint: true,
        }
    }
}

/// Structure map semantic validator
pub struct StructureMapValidator {
    source: Arc<dyn ModelResolver>,
    target: Arc<dyn ModelResolver>,
    named_groups: GroupRegistry,
    typed_groups: TypedGroupIndex,
    compiler: Arc<dyn PathExpressionCompiler>,
    config: ValidatorConfig,
}

impl StructureMapValidator {
    /// Create a validator with source and target model resolvers
    pub fn new(source: Arc<dyn ModelResolver>, target: Arc<dyn ModelResolver>) -> Self {
        Self {
            source,
            target,
            named_groups: GroupRegistry::new(),
            typed_groups: TypedGroupIndex::new(),
            compiler: Arc::new(FhirPathTypeCompiler::new()),
            config: ValidatorConfig::default(),
        }
    }

    /// Groups available to dependent invocations in addition to the map's own
    pub fn with_named_groups(mut self, groups: GroupRegistry) -> Self {
        self.named_groups = groups;
        self
    }

    /// Typed groups consulted by the compatibility check
    pub fn with_typed_groups(mut self, groups: TypedGroupIndex) -> Self {
        self.typed_groups = groups;
        self
    }

    /// Use a different FHIRPath compiler
    pub fn with_compiler(mut self, compiler: Arc<dyn PathExpressionCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source_resolver(&self) -> &Arc<dyn ModelResolver> {
        &self.source
    }

    pub fn target_resolver(&self) -> &Arc<dyn ModelResolver> {
        &self.target
    }

    pub fn named_groups(&self) -> &GroupRegistry {
        &self.named_groups
    }

    pub fn typed_groups(&self) -> &TypedGroupIndex {
        &self.typed_groups
    }

    /// Validate a structure map
    pub async fn validate(&self, map: &FhirStructureMap) -> ValidationReport {
        let mut ctx = ValidationContext::new();
        let run = MapValidation {
            validator: self,
            map,
        };

        if let Some(decl) = &map.map {
            ctx.note(format!("map {} = {}", decl.url, decl.identifier));
        }
        run.check_duplicates(&mut ctx);
        run.check_metadata(&mut ctx);
        run.check_concept_maps(&mut ctx);
        let constants = run.constants(&mut ctx).await;
        run.check_extends(&mut ctx);

        for group in map.groups.values() {
            run.group(group, &constants, &mut ctx).await;
        }

        let report = ctx.into_report();
        log::info!(
            "Validated {} group(s): {} error(s), {} warning(s)",
            map.groups.len(),
            report.errors().count(),
            report.warnings().count()
        );
        report
    }
}

/// Failure to resolve a rule operand
#[derive(Debug, Error)]
enum OperandError {
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Walker(#[from] WalkerError),
}

/// One validation run over one map
struct MapValidation<'v> {
    validator: &'v StructureMapValidator,
    map: &'v FhirStructureMap,
}

impl MapValidation<'_> {
    // === Map-level checks ===

    fn check_duplicates(&self, ctx: &mut ValidationContext) {
        for duplicate in &self.map.duplicates {
            ctx.error(
                DiagnosticCategory::Duplicate,
                FML0111,
                format!("Duplicate {} `{}`", duplicate.kind, duplicate.key),
                duplicate.span,
            );
        }
    }

    fn check_metadata(&self, ctx: &mut ValidationContext) {
        let (_, issues) = StructureMapHeader::from_structure_map(self.map);
        for issue in issues {
            ctx.warning(DiagnosticCategory::Value, FML0136, issue.to_string(), issue.span);
        }
    }

    fn check_concept_maps(&self, ctx: &mut ValidationContext) {
        for concept_map in self.map.concept_maps.values() {
            for mapping in &concept_map.mappings {
                for code in [&mapping.source, &mapping.target] {
                    if !concept_map.prefixes.contains_key(&code.prefix) {
                        ctx.error(
                            DiagnosticCategory::NotFound,
                            FML0107,
                            format!(
                                "Concept map `{}` uses undeclared prefix `{}`",
                                concept_map.url, code.prefix
                            ),
                            mapping.span(),
                        );
                    }
                }
            }
        }
    }

    async fn constants(&self, ctx: &mut ValidationContext) -> Scope {
        let mut scope = Scope::new();
        for constant in self.map.constants.values() {
            let details = self.infer(&constant.expression, &scope, None, ctx).await;
            ctx.note(format!("let {} : {}", constant.name, label(details.as_ref())));
            if let Err(err) = scope.bind(&constant.name, details) {
                self.scope_error(err, constant.span(), ctx);
            }
        }
        scope
    }

    fn check_extends(&self, ctx: &mut ValidationContext) {
        for group in self.map.groups.values() {
            let Some(extends) = &group.extends else {
                continue;
            };
            if !self.map.groups.contains_key(&extends.inner)
                && !self.validator.named_groups.contains(&extends.inner)
            {
                ctx.error(
                    DiagnosticCategory::NotFound,
                    FML0106,
                    format!("Group `{}` extends unknown group `{}`", group.name, extends.inner),
                    extends.span(),
                );
            }
        }
    }

    // === Groups ===

    async fn group(
        &self,
        group: &Node<GroupDeclaration>,
        constants: &Scope,
        ctx: &mut ValidationContext,
    ) {
        ctx.note(format!("group {}", group.name));
        ctx.enter();

        let mut scope = constants.clone();
        for (index, param) in group.parameters.iter().enumerate() {
            let details = self.parameter(&group.name, index, param, ctx).await;
            ctx.note(format!(
                "{} {} : {}",
                param.mode,
                param.identifier,
                label(details.as_ref())
            ));
            if let Err(err) = scope.bind(&param.identifier, details) {
                self.scope_error(err, param.span(), ctx);
            }
        }

        for rule in &group.rules {
            self.rule(rule, &scope, ctx).await;
        }

        ctx.leave();
    }

    async fn parameter(
        &self,
        group: &str,
        index: usize,
        param: &Node<GroupParameter>,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        let Some(type_identifier) = &param.type_identifier else {
            // Untyped: use what an earlier invocation passed, if anything
            return ctx.recorded_argument(group, index).map(|details| PropertyOrTypeDetails {
                property_path: param.identifier.clone(),
                target: details.target.clone(),
            });
        };

        let url = type_url(self.map, &type_identifier.inner);
        let side = side_of(param.mode);
        match StructureDefinitionWalker::from_canonical(self.resolver(side).clone(), &url).await {
            Ok(walker) => Some(PropertyOrTypeDetails::element(
                &param.identifier,
                walker,
                side,
            )),
            Err(WalkerError::UnresolvableCanonical { .. }) => {
                ctx.error(
                    DiagnosticCategory::NotFound,
                    FML0101,
                    format!("Type `{}` not found ({url})", type_identifier.inner),
                    type_identifier.span(),
                );
                None
            }
            Err(err) => {
                ctx.error(
                    DiagnosticCategory::Exception,
                    FML0150,
                    format!("Unable to resolve type `{}`: {err}", type_identifier.inner),
                    type_identifier.span(),
                );
                None
            }
        }
    }

    // === Rules ===

    fn rule<'a>(
        &'a self,
        rule: &'a Node<GroupExpression>,
        scope: &'a Scope,
        ctx: &'a mut ValidationContext,
    ) -> BoxFuture<'a, ()> {
        async move {
            let summary = rule.raw_text().lines().next().unwrap_or_default().trim();
            ctx.note(format!("rule {} @ {}", summary, rule.span()));

            match &rule.inner {
                GroupExpression::SimpleCopy(copy) => {
                    self.simple_copy(copy, rule.span(), scope, ctx).await;
                    self.check_rule_name(rule.name(), ctx);
                }
                GroupExpression::FhirPath(statement) => {
                    self.infer(&statement.expression, scope, None, ctx).await;
                }
                GroupExpression::Mapping(mapping) => {
                    self.mapping(mapping, rule.name(), rule.span(), scope, ctx).await;
                }
            }
        }
        .boxed()
    }

    fn check_rule_name(&self, name: Option<&Node<String>>, ctx: &mut ValidationContext) {
        let Some(name) = name else {
            return;
        };
        if !RULE_NAME.is_match(&name.inner) {
            ctx.error(
                DiagnosticCategory::Value,
                FML0133,
                format!("Invalid rule name `{}`", name.inner),
                name.span(),
            );
        }
    }

    async fn simple_copy(
        &self,
        copy: &SimpleCopyExpression,
        span: TokenSpan,
        scope: &Scope,
        ctx: &mut ValidationContext,
    ) {
        let source = self.operand(&copy.source, scope, ctx).await;
        let target = self.operand(&copy.target, scope, ctx).await;

        if let Some(walker) = source.as_ref().and_then(PropertyOrTypeDetails::walker) {
            match walker.is_composite().await {
                Ok(true) => ctx.warning(
                    DiagnosticCategory::Value,
                    FML0130,
                    format!(
                        "`{}` is a composite element and cannot be copied directly",
                        copy.source.inner
                    ),
                    copy.source.span(),
                ),
                Ok(false) => {}
                Err(err) => log::debug!("Cannot classify `{}`: {err}", copy.source.inner),
            }
        }
        if !copy.target.is_dotted() {
            ctx.warning(
                DiagnosticCategory::Value,
                FML0131,
                format!("Target `{}` names a context without a property", copy.target.inner),
                copy.target.span(),
            );
        }

        if let (Some(source), Some(target)) = (&source, &target) {
            self.check_compatibility(source, target, span, ctx);
        }
    }

    async fn mapping(
        &self,
        mapping: &MappingExpression,
        name: Option<&Node<String>>,
        span: TokenSpan,
        scope: &Scope,
        ctx: &mut ValidationContext,
    ) {
        let mut rule_scope = scope.clone();

        let mut sources = Vec::with_capacity(mapping.sources.len());
        for source in &mapping.sources {
            sources.push(self.source(source, &mut rule_scope, ctx).await);
        }
        let single_source = match sources.as_mut_slice() {
            [only] => only.take(),
            _ => None,
        };

        for target in &mapping.targets {
            self.target(target, &mut rule_scope, single_source.as_ref(), span, ctx)
                .await;
        }

        self.check_rule_name(name, ctx);

        if let Some(dependent) = &mapping.dependent {
            self.dependent(dependent, &rule_scope, ctx).await;
        }
    }

    async fn source(
        &self,
        source: &Node<FmlExpressionSource>,
        scope: &mut Scope,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        let mut resolved = self.operand(&source.identifier, scope, ctx).await;

        if let (Some(cast), Some(details)) = (&source.type_identifier, &resolved) {
            resolved = self.cast(details, cast, &source.identifier, ctx).await;
        }

        if let Some(cardinality) = &source.cardinality {
            ctx.note(format!("cardinality {}", cardinality.inner));
        }
        if let Some(default) = &source.default_value {
            ctx.note(format!("default {}", default.raw_text()));
        }
        if let Some(list_mode) = &source.list_mode {
            ctx.note(format!("list mode {}", list_mode.keyword()));
        }

        if let Some(alias) = &source.alias {
            if let Err(err) = scope.bind(&alias.inner, resolved.clone()) {
                self.scope_error(err, alias.span(), ctx);
            }
        }

        for clause in [&source.where_clause, &source.check_clause, &source.log_expression]
            .into_iter()
            .flatten()
        {
            self.infer(clause, scope, resolved.as_ref(), ctx).await;
        }

        resolved
    }

    /// Apply `: Type` to a source
    async fn cast(
        &self,
        details: &PropertyOrTypeDetails,
        cast: &Node<String>,
        identifier: &Node<QualifiedIdentifier>,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        let declared = details
            .walker()
            .map(|walker| walker.declared_types())
            .unwrap_or_default();
        let cast_url = type_url(self.map, &cast.inner);
        if !declared.is_empty()
            && !declared
                .iter()
                .any(|code| code == &cast.inner || type_canonical(code) == cast_url)
        {
            ctx.error(
                DiagnosticCategory::Conflict,
                FML0121,
                format!(
                    "Type `{}` is not a declared type of `{}` ({})",
                    cast.inner,
                    identifier.inner,
                    declared.join(", ")
                ),
                cast.span(),
            );
            return Some(details.clone());
        }

        let side = details.side().unwrap_or(ModelSide::Source);
        match StructureDefinitionWalker::from_canonical(self.resolver(side).clone(), &cast_url).await
        {
            Ok(walker) => Some(PropertyOrTypeDetails::element(
                details.property_path.clone(),
                walker,
                side,
            )),
            Err(_) => match SystemType::from_fhir_code(&cast.inner) {
                Some(ty) => Some(PropertyOrTypeDetails::system(details.property_path.clone(), ty)),
                None => Some(details.clone()),
            },
        }
    }

    async fn target(
        &self,
        target: &Node<FmlExpressionTarget>,
        scope: &mut Scope,
        single_source: Option<&PropertyOrTypeDetails>,
        rule_span: TokenSpan,
        ctx: &mut ValidationContext,
    ) {
        let target_details = match &target.identifier {
            Some(identifier) => self.operand(identifier, scope, ctx).await,
            None => None,
        };
        let transform_details = match &target.transform {
            Some(transform) => self.transform(transform, scope, single_source, ctx).await,
            None => None,
        };

        if let (Some(produced), Some(expected)) = (&transform_details, &target_details) {
            self.check_compatibility(produced, expected, rule_span, ctx);
        }

        if let Some(alias) = &target.alias {
            let bound = transform_details.or(target_details);
            if let Err(err) = scope.bind(&alias.inner, bound) {
                self.scope_error(err, alias.span(), ctx);
            }
        }
    }

    async fn transform(
        &self,
        transform: &Node<Transform>,
        scope: &Scope,
        single_source: Option<&PropertyOrTypeDetails>,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        match &transform.inner {
            Transform::Literal(literal) => self.literal_type(literal, ModelSide::Target).await,
            Transform::Identifier(identifier) if identifier.is_dotted() => {
                ctx.warning(
                    DiagnosticCategory::Value,
                    FML0132,
                    format!("Transform `{identifier}` is a dotted identifier"),
                    transform.span(),
                );
                None
            }
            Transform::Identifier(identifier) => match scope.lookup(identifier.root()) {
                Ok(details) => details.cloned(),
                Err(err) => {
                    self.scope_error(err, transform.span(), ctx);
                    None
                }
            },
            Transform::Invocation(invocation) => {
                self.invocation(invocation, transform.span(), scope, ctx).await
            }
            Transform::Expression(expression) => {
                self.infer(expression, scope, single_source, ctx).await
            }
        }
    }

    async fn invocation(
        &self,
        invocation: &Invocation,
        span: TokenSpan,
        scope: &Scope,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        let mut arguments = Vec::with_capacity(invocation.arguments.len());
        for argument in &invocation.arguments {
            arguments.push(self.argument(argument, ModelSide::Target, scope, ctx).await);
        }

        let Some(ret) = builtin_transform(&invocation.name) else {
            ctx.error(
                DiagnosticCategory::Value,
                FML0134,
                format!("Unhandled invocation `{}`", invocation.name),
                span,
            );
            return None;
        };

        match ret {
            TransformReturn::NamedByFirstArgument => match invocation.first_string_argument() {
                Some(name) => self.named_type(name, Some(span), ctx).await,
                None => None,
            },
            TransformReturn::FirstArgument => arguments.into_iter().next().flatten(),
            TransformReturn::Named(name) => self.named_type(name, None, ctx).await,
        }
    }

    /// Resolve a type name on the target side
    ///
    /// Reports `FML0101` at `report_at` when the name resolves neither to a
    /// StructureDefinition nor to a system type.
    async fn named_type(
        &self,
        name: &str,
        report_at: Option<TokenSpan>,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        let url = type_url(self.map, name);
        match StructureDefinitionWalker::from_canonical(self.validator.target.clone(), &url).await {
            Ok(walker) => Some(PropertyOrTypeDetails::element(name, walker, ModelSide::Target)),
            Err(err) => {
                if let Some(ty) = SystemType::from_fhir_code(name) {
                    return Some(PropertyOrTypeDetails::system(name, ty));
                }
                match report_at {
                    Some(span) => ctx.error(
                        DiagnosticCategory::NotFound,
                        FML0101,
                        format!("Type `{name}` not found"),
                        span,
                    ),
                    None => log::debug!("No type for `{name}`: {err}"),
                }
                None
            }
        }
    }

    async fn argument(
        &self,
        argument: &Node<InvocationArgument>,
        side: ModelSide,
        scope: &Scope,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        match &argument.inner {
            InvocationArgument::Literal(literal) => self.literal_type(literal, side).await,
            InvocationArgument::Identifier(name) => match scope.lookup(name) {
                Ok(details) => details.cloned(),
                Err(err) => {
                    self.scope_error(err, argument.span(), ctx);
                    None
                }
            },
        }
    }

    /// Type of a literal: the FHIR type on the given side, else its system type
    async fn literal_type(
        &self,
        literal: &Literal,
        side: ModelSide,
    ) -> Option<PropertyOrTypeDetails> {
        let code = literal.fhir_type_name()?;
        match StructureDefinitionWalker::from_canonical(
            self.resolver(side).clone(),
            &type_canonical(code),
        )
        .await
        {
            Ok(walker) => Some(PropertyOrTypeDetails::element(literal.to_string(), walker, side)),
            Err(_) => SystemType::of_literal(literal)
                .map(|ty| PropertyOrTypeDetails::system(literal.to_string(), ty)),
        }
    }

    // === Dependent rules ===

    async fn dependent(
        &self,
        dependent: &Node<DependentExpression>,
        scope: &Scope,
        ctx: &mut ValidationContext,
    ) {
        ctx.enter();
        for invocation in &dependent.invocations {
            self.dependent_call(invocation, scope, ctx).await;
        }
        if !dependent.rules.is_empty() {
            let nested_scope = scope.child();
            for nested in &dependent.rules {
                self.rule(nested, &nested_scope, ctx).await;
            }
        }
        ctx.leave();
    }

    async fn dependent_call(
        &self,
        invocation: &Node<Invocation>,
        scope: &Scope,
        ctx: &mut ValidationContext,
    ) {
        ctx.note(format!("then {}", invocation.raw_text()));

        let group = self
            .map
            .group(&invocation.name)
            .or_else(|| self.validator.named_groups.get(&invocation.name));
        let Some(group) = group else {
            ctx.error(
                DiagnosticCategory::NotFound,
                FML0104,
                format!("Group `{}` not found", invocation.name),
                invocation.span(),
            );
            for argument in &invocation.arguments {
                self.argument(argument, ModelSide::Source, scope, ctx).await;
            }
            return;
        };

        if invocation.arguments.len() != group.parameters.len() {
            ctx.error(
                DiagnosticCategory::Value,
                FML0135,
                format!(
                    "Group `{}` takes {} argument(s) but {} were given",
                    group.name,
                    group.parameters.len(),
                    invocation.arguments.len()
                ),
                invocation.span(),
            );
        }

        for (index, (param, argument)) in group
            .parameters
            .iter()
            .zip(&invocation.arguments)
            .enumerate()
        {
            let Some(details) = self.argument(argument, side_of(param.mode), scope, ctx).await
            else {
                continue;
            };
            if let Some(previous) = ctx.record_argument(&group.name, index, details.clone()) {
                ctx.error(
                    DiagnosticCategory::Conflict,
                    FML0120,
                    format!(
                        "Mismatched type for `{}` of group `{}`: `{}` and `{}` (conflicting argument type)",
                        param.identifier,
                        group.name,
                        previous.type_label(),
                        details.type_label()
                    ),
                    argument.span(),
                );
            }
        }
    }

    // === Shared ===

    fn resolver(&self, side: ModelSide) -> &Arc<dyn ModelResolver> {
        match side {
            ModelSide::Source => &self.validator.source,
            ModelSide::Target => &self.validator.target,
        }
    }

    async fn resolve_operand(
        &self,
        identifier: &QualifiedIdentifier,
        scope: &Scope,
    ) -> Result<Option<PropertyOrTypeDetails>, OperandError> {
        let Some(base) = scope.lookup(identifier.root())? else {
            return Ok(None);
        };
        Ok(Some(base.walk(identifier.tail()).await?))
    }

    /// Resolve `var.path`, reporting failures at the identifier
    async fn operand(
        &self,
        identifier: &Node<QualifiedIdentifier>,
        scope: &Scope,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        match self.resolve_operand(identifier, scope).await {
            Ok(details) => details,
            Err(OperandError::Scope(err)) => {
                self.scope_error(err, identifier.span(), ctx);
                None
            }
            Err(OperandError::Walker(err)) => {
                self.walker_error(err, identifier.span(), ctx);
                None
            }
        }
    }

    fn scope_error(&self, err: ScopeError, span: TokenSpan, ctx: &mut ValidationContext) {
        match err {
            ScopeError::NotInScope { .. } => {
                ctx.error(DiagnosticCategory::NotFound, FML0102, err.to_string(), span);
            }
            ScopeError::DuplicateAlias { .. } => {
                ctx.error(DiagnosticCategory::Duplicate, FML0110, err.to_string(), span);
            }
        }
    }

    fn walker_error(&self, err: WalkerError, span: TokenSpan, ctx: &mut ValidationContext) {
        match &err {
            WalkerError::ChildNotFound { path, name } => ctx.error(
                DiagnosticCategory::NotFound,
                FML0103,
                format!("Element `{name}` not found at {path}"),
                span,
            ),
            WalkerError::UnresolvableCanonical { .. }
            | WalkerError::UnresolvableContentReference { .. } => {
                ctx.error(DiagnosticCategory::NotFound, FML0103, err.to_string(), span);
            }
            WalkerError::AmbiguousSlice { .. } => {
                ctx.error(DiagnosticCategory::Conflict, FML0122, err.to_string(), span);
            }
            WalkerError::MalformedStructure { .. } | WalkerError::Resolver(_) => {
                ctx.error(DiagnosticCategory::Exception, FML0150, err.to_string(), span);
            }
        }
    }

    fn check_compatibility(
        &self,
        source: &PropertyOrTypeDetails,
        target: &PropertyOrTypeDetails,
        span: TokenSpan,
        ctx: &mut ValidationContext,
    ) {
        let unmatched = check_type_compatibility(source, target, &self.validator.typed_groups);
        if !unmatched.is_empty() {
            ctx.error(
                DiagnosticCategory::NotFound,
                FML0105,
                format!("No target type for mapping {}", describe_unmatched(&unmatched)),
                span,
            );
        }
    }

    async fn infer(
        &self,
        expression: &Node<FpExpression>,
        scope: &Scope,
        this: Option<&PropertyOrTypeDetails>,
        ctx: &mut ValidationContext,
    ) -> Option<PropertyOrTypeDetails> {
        let context = CompilerContext::new(scope.clone(), self.validator.source.clone())
            .with_this(this.cloned());
        let outcome = infer_expression_type(
            self.validator.compiler.as_ref(),
            expression,
            &context,
            self.validator.config.suppress_variable_hint,
        )
        .await;
        ctx.extend(outcome.diagnostics);
        outcome.resolved
    }
}

fn side_of(mode: ParameterMode) -> ModelSide {
    match mode {
        ParameterMode::Source => ModelSide::Source,
        ParameterMode::Target => ModelSide::Target,
    }
}

fn label(details: Option<&PropertyOrTypeDetails>) -> String {
    details.map_or_else(|| "?".to_string(), PropertyOrTypeDetails::type_label)
}
