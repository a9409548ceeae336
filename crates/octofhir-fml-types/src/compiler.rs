//! FHIRPath type compiler
//!
//! Embedded FHIRPath expressions (`where`, `check`, `log`, constants and
//! `( expression )` transforms) are compiled to a set of candidate types. The
//! compiler never fails: anything it cannot type becomes an empty result plus an
//! [`ExpressionDiagnostic`].
//!
//! The default [`FhirPathTypeCompiler`] resolves members through the source-side
//! model, types literals and operators with FHIRPath system types, and uses a
//! static signature table for functions. Other compilers can be plugged into the
//! validator through [`PathExpressionCompiler`].

use crate::details::{ModelSide, PropertyOrTypeDetails};
use crate::functions::{ReturnType, function_signature};
use crate::scope::Scope;
use crate::system_types::SystemType;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use octofhir_fml_ast::{
    BinaryExpression, FpExpression, FpFunction, FpInvocation, FpTerm, Node, QualifiedIdentifier,
};
use octofhir_fml_diagnostics::Severity;
use octofhir_fml_model::{ModelResolver, StructureDefinitionWalker, WalkerError, type_canonical};
use std::sync::Arc;

/// Marker text of the hint emitted when a bare identifier resolves to a variable
pub const VARIABLE_HINT: &str = "did you mean to use the variable";

/// Everything an expression may refer to
#[derive(Clone)]
pub struct CompilerContext {
    /// Variables visible to the expression
    pub variables: Scope,
    /// The focus (`$this`), when the expression has one
    pub this: Option<PropertyOrTypeDetails>,
    /// Resolver for type names used in the expression
    pub resolver: Arc<dyn ModelResolver>,
}

impl CompilerContext {
    /// Create a context without a focus
    pub fn new(variables: Scope, resolver: Arc<dyn ModelResolver>) -> Self {
        Self {
            variables,
            this: None,
            resolver,
        }
    }

    /// Set the focus
    pub fn with_this(mut self, this: Option<PropertyOrTypeDetails>) -> Self {
        self.this = this;
        self
    }
}

/// A message produced while compiling an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionDiagnostic {
    pub severity: Severity,
    pub message: String,
}

impl ExpressionDiagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Compilation result
#[derive(Debug, Clone, Default)]
pub struct CompiledExpression {
    /// Candidate result types; empty when unknown
    pub types: Vec<PropertyOrTypeDetails>,
    /// Messages in the order they were produced
    pub diagnostics: Vec<ExpressionDiagnostic>,
}

impl CompiledExpression {
    /// The result type when exactly one was inferred
    pub fn single_type(&self) -> Option<&PropertyOrTypeDetails> {
        match self.types.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Compiles FHIRPath expressions to types
#[async_trait]
pub trait PathExpressionCompiler: Send + Sync {
    /// Compile an expression in the given context
    async fn compile(
        &self,
        expression: &Node<FpExpression>,
        context: &CompilerContext,
    ) -> CompiledExpression;
}

/// Default FHIRPath type compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct FhirPathTypeCompiler;

impl FhirPathTypeCompiler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PathExpressionCompiler for FhirPathTypeCompiler {
    async fn compile(
        &self,
        expression: &Node<FpExpression>,
        context: &CompilerContext,
    ) -> CompiledExpression {
        let mut diagnostics = Vec::new();
        let inferrer = Inferrer { context };
        let types = inferrer
            .infer(expression, context.this.as_ref(), &mut diagnostics)
            .await;
        log::trace!(
            "Compiled `{}` to {} type(s)",
            expression.raw_text(),
            types.len()
        );
        CompiledExpression { types, diagnostics }
    }
}

type Types = Vec<PropertyOrTypeDetails>;

struct Inferrer<'c> {
    context: &'c CompilerContext,
}

impl Inferrer<'_> {
    fn infer<'a>(
        &'a self,
        expr: &'a Node<FpExpression>,
        this: Option<&'a PropertyOrTypeDetails>,
        out: &'a mut Vec<ExpressionDiagnostic>,
    ) -> BoxFuture<'a, Types> {
        async move {
            match &expr.inner {
                FpExpression::Term(term) => self.term(term, this, out).await,
                FpExpression::Invocation(inv) => {
                    let targets = self.infer(&inv.target, this, out).await;
                    self.invoke(&inv.invocation, targets, this, out).await
                }
                FpExpression::Indexer(idx) => {
                    let targets = self.infer(&idx.target, this, out).await;
                    self.infer(&idx.index, this, out).await;
                    targets
                }
                FpExpression::Polarity(p) => self.infer(&p.operand, this, out).await,
                FpExpression::Multiplicative(b) | FpExpression::Additive(b) => {
                    let (left, right) = self.operands(b, this, out).await;
                    arithmetic(expr.raw_text(), &b.operator, &left, &right)
                }
                FpExpression::Type(t) => {
                    self.infer(&t.operand, this, out).await;
                    if t.operator == "is" {
                        boolean(expr.raw_text())
                    } else {
                        self.type_specifier(&t.type_specifier, out).await
                    }
                }
                FpExpression::Union(b) => {
                    let (mut left, right) = self.operands(b, this, out).await;
                    for ty in right {
                        push_distinct(&mut left, ty);
                    }
                    left
                }
                FpExpression::Inequality(b)
                | FpExpression::Equality(b)
                | FpExpression::Membership(b)
                | FpExpression::And(b)
                | FpExpression::Or(b)
                | FpExpression::Implies(b) => {
                    self.operands(b, this, out).await;
                    boolean(expr.raw_text())
                }
            }
        }
        .boxed()
    }

    async fn operands(
        &self,
        binary: &BinaryExpression,
        this: Option<&PropertyOrTypeDetails>,
        out: &mut Vec<ExpressionDiagnostic>,
    ) -> (Types, Types) {
        let left = self.infer(&binary.left, this, out).await;
        let right = self.infer(&binary.right, this, out).await;
        (left, right)
    }

    async fn term(
        &self,
        term: &FpTerm,
        this: Option<&PropertyOrTypeDetails>,
        out: &mut Vec<ExpressionDiagnostic>,
    ) -> Types {
        match term {
            FpTerm::Literal(literal) => SystemType::of_literal(literal)
                .map(|ty| vec![PropertyOrTypeDetails::system(literal.to_string(), ty)])
                .unwrap_or_default(),
            FpTerm::ExternalConstant(name) => self.external_constant(name, this, out),
            FpTerm::Parenthesized(inner) => self.infer(inner, this, out).await,
            FpTerm::Invocation(FpInvocation::Member(name)) => self.identifier(name, this, out).await,
            FpTerm::Invocation(FpInvocation::Function(func)) => {
                let input = this.cloned().into_iter().collect();
                self.function(func, input, this, out).await
            }
            FpTerm::Invocation(FpInvocation::This) => this.cloned().into_iter().collect(),
            FpTerm::Invocation(FpInvocation::Index) => {
                vec![PropertyOrTypeDetails::system("$index", SystemType::Integer)]
            }
            FpTerm::Invocation(FpInvocation::Total) => Vec::new(),
        }
    }

    fn external_constant(
        &self,
        name: &str,
        this: Option<&PropertyOrTypeDetails>,
        out: &mut Vec<ExpressionDiagnostic>,
    ) -> Types {
        if let Ok(binding) = self.context.variables.lookup(name) {
            return binding.cloned().into_iter().collect();
        }
        match name {
            "resource" | "rootResource" | "context" => this.cloned().into_iter().collect(),
            "ucum" | "sct" | "loinc" => {
                vec![PropertyOrTypeDetails::system(format!("%{name}"), SystemType::String)]
            }
            _ if name.starts_with("vs-") || name.starts_with("ext-") => {
                vec![PropertyOrTypeDetails::system(format!("%{name}"), SystemType::String)]
            }
            _ => {
                out.push(ExpressionDiagnostic::error(format!(
                    "Unknown external constant `%{name}`"
                )));
                Vec::new()
            }
        }
    }

    /// A leading identifier: a property of the focus, a variable, or the focus type name
    async fn identifier(
        &self,
        name: &str,
        this: Option<&PropertyOrTypeDetails>,
        out: &mut Vec<ExpressionDiagnostic>,
    ) -> Types {
        if let Some(focus) = this {
            if let Ok(found) = focus.walk(&[name]).await {
                return vec![found];
            }
            if focus
                .walker()
                .is_some_and(|w| w.is_root() && w.definition().type_field == name)
            {
                return vec![focus.clone()];
            }
        }

        if let Ok(binding) = self.context.variables.lookup(name) {
            out.push(ExpressionDiagnostic::warning(format!(
                "`{name}` is not a property of the focus; {VARIABLE_HINT} `%{name}`?"
            )));
            return binding.cloned().into_iter().collect();
        }

        let message = match this {
            Some(focus) => format!("Property `{name}` not found on `{}`", focus.type_label()),
            None => format!("Unknown identifier `{name}`"),
        };
        out.push(ExpressionDiagnostic::error(message));
        Vec::new()
    }

    async fn invoke(
        &self,
        invocation: &Node<FpInvocation>,
        targets: Types,
        this: Option<&PropertyOrTypeDetails>,
        out: &mut Vec<ExpressionDiagnostic>,
    ) -> Types {
        match &invocation.inner {
            FpInvocation::Member(name) => self.member(name, targets, out).await,
            FpInvocation::Function(func) => self.function(func, targets, this, out).await,
            FpInvocation::This => targets,
            FpInvocation::Index => {
                vec![PropertyOrTypeDetails::system("$index", SystemType::Integer)]
            }
            FpInvocation::Total => Vec::new(),
        }
    }

    async fn member(
        &self,
        name: &str,
        targets: Types,
        out: &mut Vec<ExpressionDiagnostic>,
    ) -> Types {
        if targets.is_empty() {
            return Vec::new();
        }

        let mut found = Vec::new();
        let mut first_error = None;
        for target in &targets {
            match target.walk(&[name]).await {
                Ok(child) => push_distinct(&mut found, child),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        if found.is_empty() {
            let message = match first_error {
                Some(WalkerError::ChildNotFound { .. }) | None => {
                    let labels: Vec<String> = targets.iter().map(|t| t.type_label()).collect();
                    format!("Property `{name}` not found on `{}`", labels.join(" | "))
                }
                Some(err) => err.to_string(),
            };
            out.push(ExpressionDiagnostic::error(message));
        }
        found
    }

    async fn function(
        &self,
        func: &FpFunction,
        input: Types,
        this: Option<&PropertyOrTypeDetails>,
        out: &mut Vec<ExpressionDiagnostic>,
    ) -> Types {
        let Some(signature) = function_signature(&func.name) else {
            out.push(ExpressionDiagnostic::error(format!(
                "Unknown function `{}`",
                func.name
            )));
            return Vec::new();
        };

        if !signature.accepts(func.arguments.len()) {
            out.push(ExpressionDiagnostic::error(format!(
                "Function `{}` does not accept {} argument(s)",
                func.name,
                func.arguments.len()
            )));
        }

        // Type arguments name a type and are not evaluated
        if signature.return_type == ReturnType::TypeArgument {
            return match func.arguments.first() {
                Some(arg) => self.type_name(arg.raw_text(), out).await,
                None => Vec::new(),
            };
        }

        let focus = if signature.lambda {
            match input.as_slice() {
                [only] => Some(only.clone()),
                _ => None,
            }
        } else {
            this.cloned()
        };
        let mut argument_types = Vec::with_capacity(func.arguments.len());
        for arg in &func.arguments {
            argument_types.push(self.infer(arg, focus.as_ref(), out).await);
        }

        match signature.return_type {
            ReturnType::System(ty) => vec![PropertyOrTypeDetails::system(
                format!("{}()", func.name),
                ty,
            )],
            ReturnType::SameAsInput => input,
            ReturnType::Argument(index) => {
                argument_types.into_iter().nth(index).unwrap_or_default()
            }
            ReturnType::TypeArgument | ReturnType::Unknown => Vec::new(),
        }
    }

    async fn type_specifier(
        &self,
        specifier: &Node<QualifiedIdentifier>,
        out: &mut Vec<ExpressionDiagnostic>,
    ) -> Types {
        self.type_name(&specifier.to_string(), out).await
    }

    /// Resolve a type name: `System.X`, a FHIR type, or `FHIR.X`
    async fn type_name(&self, name: &str, out: &mut Vec<ExpressionDiagnostic>) -> Types {
        let name = name.trim();
        if name.starts_with("System.") {
            return match SystemType::from_name(name) {
                Some(ty) => vec![PropertyOrTypeDetails::system(name, ty)],
                None => {
                    out.push(ExpressionDiagnostic::error(format!("Unknown type `{name}`")));
                    Vec::new()
                }
            };
        }

        let code = name.strip_prefix("FHIR.").unwrap_or(name);
        let url = type_canonical(code);
        match StructureDefinitionWalker::from_canonical(self.context.resolver.clone(), &url).await
        {
            Ok(walker) => vec![PropertyOrTypeDetails::element(
                code,
                walker,
                ModelSide::Source,
            )],
            Err(err) => {
                if let Some(ty) =
                    SystemType::from_fhir_code(code).or_else(|| SystemType::from_name(code))
                {
                    return vec![PropertyOrTypeDetails::system(code, ty)];
                }
                match err {
                    WalkerError::UnresolvableCanonical { .. } => {
                        out.push(ExpressionDiagnostic::warning(format!("Unknown type `{code}`")));
                    }
                    other => out.push(ExpressionDiagnostic::error(other.to_string())),
                }
                Vec::new()
            }
        }
    }
}

fn boolean(path: &str) -> Types {
    vec![PropertyOrTypeDetails::system(path, SystemType::Boolean)]
}

fn push_distinct(types: &mut Types, ty: PropertyOrTypeDetails) {
    if !types.iter().any(|t| t.same_structure(&ty)) {
        types.push(ty);
    }
}

fn single_system_type(types: &[PropertyOrTypeDetails]) -> Option<SystemType> {
    match types {
        [only] => only.system_type(),
        _ => None,
    }
}

/// Result type of `+ - * / div mod &`
fn arithmetic(path: &str, operator: &str, left: &[PropertyOrTypeDetails], right: &[PropertyOrTypeDetails]) -> Types {
    use SystemType::{Decimal, Integer, Long, Quantity, String};

    let l = single_system_type(left);
    let r = single_system_type(right);
    let result = match operator {
        "&" => Some(String),
        "/" => match (l, r) {
            (Some(Quantity), _) | (_, Some(Quantity)) => Some(Quantity),
            _ => Some(Decimal),
        },
        "div" | "mod" => match (l, r) {
            (Some(Integer), Some(Integer)) => Some(Integer),
            (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
                if a == Decimal || b == Decimal {
                    Some(Decimal)
                } else {
                    Some(Long)
                }
            }
            _ => None,
        },
        _ => match (l, r) {
            (Some(String), Some(String)) if operator == "+" => Some(String),
            (Some(t), _) if t.is_temporal() => Some(t),
            (Some(Quantity), _) | (_, Some(Quantity)) => Some(Quantity),
            (Some(Decimal), Some(b)) | (Some(b), Some(Decimal)) if b.is_numeric() => Some(Decimal),
            (Some(Long), Some(b)) | (Some(b), Some(Long)) if b.is_numeric() => Some(Long),
            (Some(Integer), Some(Integer)) => Some(Integer),
            _ => None,
        },
    };
    result
        .map(|ty| vec![PropertyOrTypeDetails::system(path, ty)])
        .unwrap_or_default()
}
