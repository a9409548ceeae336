//! Expression type inference for the validator
//!
//! Wraps a [`PathExpressionCompiler`] and turns its messages into validation
//! diagnostics positioned at the embedding node.

use crate::compiler::{CompilerContext, PathExpressionCompiler, VARIABLE_HINT};
use crate::details::PropertyOrTypeDetails;
use octofhir_fml_ast::{FpExpression, Node};
use octofhir_fml_diagnostics::{Diagnostic, DiagnosticCategory, FML0140, Severity};

/// Result of inferring one embedded expression
#[derive(Debug, Clone, Default)]
pub struct InferenceOutcome {
    /// The type, when exactly one was inferred
    pub resolved: Option<PropertyOrTypeDetails>,
    /// Forwarded compiler messages
    pub diagnostics: Vec<Diagnostic>,
}

/// Infer the type of an embedded FHIRPath expression
///
/// Compiler messages become `FML0140` diagnostics carrying the expression's
/// position. Hints about bare identifiers that resolve to variables are dropped
/// when `suppress_variable_hint` is set.
pub async fn infer_expression_type(
    compiler: &dyn PathExpressionCompiler,
    expression: &Node<FpExpression>,
    context: &CompilerContext,
    suppress_variable_hint: bool,
) -> InferenceOutcome {
    let compiled = compiler.compile(expression, context).await;

    let diagnostics = compiled
        .diagnostics
        .iter()
        .filter(|d| !(suppress_variable_hint && d.message.contains(VARIABLE_HINT)))
        .map(|d| {
            let diagnostic = match d.severity {
                Severity::Error => {
                    Diagnostic::error(DiagnosticCategory::Value, FML0140, d.message.clone())
                }
                Severity::Warning => {
                    Diagnostic::warning(DiagnosticCategory::Value, FML0140, d.message.clone())
                }
            };
            diagnostic.at(expression.span())
        })
        .collect();

    InferenceOutcome {
        resolved: compiled.single_type().cloned(),
        diagnostics,
    }
}
