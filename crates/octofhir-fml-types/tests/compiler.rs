//! FHIRPath type compiler tests
//!
//! Covers:
//! - Literal, operator and function result types
//! - Member navigation from the focus and from variables
//! - Type specifiers and the system type fallback
//! - Diagnostic forwarding through `infer_expression_type`

mod common;

use common::{CORE, R4, registry};
use octofhir_fml_diagnostics::{FML0140, Severity};
use octofhir_fml_parser::parse_expression;
use octofhir_fml_types::{
    CompiledExpression, CompilerContext, FhirPathTypeCompiler, ModelSide,
    PathExpressionCompiler, PropertyOrTypeDetails, Scope, SystemType, infer_expression_type,
};
use octofhir_fml_model::StructureDefinitionWalker;
use pretty_assertions::assert_eq;
use rstest::rstest;

async fn patient() -> PropertyOrTypeDetails {
    let walker = StructureDefinitionWalker::from_canonical(registry(R4), &format!("{CORE}Patient"))
        .await
        .unwrap();
    PropertyOrTypeDetails::element("src", walker, ModelSide::Source)
}

async fn compile(source: &str, context: &CompilerContext) -> CompiledExpression {
    let expression = parse_expression(source).unwrap();
    FhirPathTypeCompiler::new().compile(&expression, context).await
}

fn context() -> CompilerContext {
    CompilerContext::new(Scope::new(), registry(R4))
}

#[rstest]
#[case("true", SystemType::Boolean)]
#[case("'text'", SystemType::String)]
#[case("42", SystemType::Integer)]
#[case("1.5", SystemType::Decimal)]
#[case("@2020-01-01", SystemType::Date)]
#[case("1 + 2", SystemType::Integer)]
#[case("1 + 2.0", SystemType::Decimal)]
#[case("'a' & 1", SystemType::String)]
#[case("4 / 2", SystemType::Decimal)]
#[case("1 < 2 and true", SystemType::Boolean)]
#[case("'abc'.length()", SystemType::Integer)]
#[case("'abc'.upper()", SystemType::String)]
#[case("iif(true, 'a', 'b')", SystemType::String)]
#[case("5 'mg'", SystemType::Quantity)]
#[tokio::test]
async fn test_system_result_types(#[case] source: &str, #[case] expected: SystemType) {
    let compiled = compile(source, &context()).await;
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.diagnostics);
    assert_eq!(compiled.single_type().and_then(|t| t.system_type()), Some(expected));
}

#[tokio::test]
async fn test_members_of_focus() {
    let ctx = context().with_this(Some(patient().await));

    let compiled = compile("name.given", &ctx).await;
    assert!(compiled.diagnostics.is_empty());
    let given = compiled.single_type().unwrap();
    assert_eq!(given.property_path, "src.name.given");
    assert_eq!(given.candidate_urls(), vec![format!("{CORE}string")]);

    let compiled = compile("active.not()", &ctx).await;
    assert_eq!(
        compiled.single_type().and_then(|t| t.system_type()),
        Some(SystemType::Boolean)
    );
}

#[tokio::test]
async fn test_where_keeps_input_type() {
    let ctx = context().with_this(Some(patient().await));
    let compiled = compile("name.where(family = 'Smith').given.first()", &ctx).await;

    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.diagnostics);
    assert_eq!(
        compiled.single_type().unwrap().candidate_urls(),
        vec![format!("{CORE}string")]
    );
}

#[tokio::test]
async fn test_focus_type_name() {
    let ctx = context().with_this(Some(patient().await));
    let compiled = compile("Patient.active", &ctx).await;
    assert!(compiled.diagnostics.is_empty());
    assert_eq!(
        compiled.single_type().unwrap().candidate_urls(),
        vec![format!("{CORE}boolean")]
    );
}

#[tokio::test]
async fn test_variables() {
    let mut scope = Scope::new();
    scope.bind("p", Some(patient().await)).unwrap();
    let ctx = CompilerContext::new(scope, registry(R4));

    let compiled = compile("%p.birthDate", &ctx).await;
    assert!(compiled.diagnostics.is_empty());
    assert_eq!(
        compiled.single_type().unwrap().candidate_urls(),
        vec![format!("{CORE}date")]
    );

    let compiled = compile("p.birthDate", &ctx).await;
    assert_eq!(compiled.diagnostics.len(), 1);
    assert_eq!(compiled.diagnostics[0].severity, Severity::Warning);
    assert!(compiled.diagnostics[0].message.contains("did you mean to use the variable `%p`"));
    assert!(compiled.single_type().is_some());
}

#[tokio::test]
async fn test_unknown_names() {
    let ctx = context();

    let compiled = compile("nothing", &ctx).await;
    assert!(compiled.types.is_empty());
    assert_eq!(compiled.diagnostics[0].message, "Unknown identifier `nothing`");

    let compiled = compile("'a'.frobnicate()", &ctx).await;
    assert_eq!(compiled.diagnostics[0].message, "Unknown function `frobnicate`");

    let compiled = compile("%nothing", &ctx).await;
    assert_eq!(compiled.diagnostics[0].message, "Unknown external constant `%nothing`");
}

#[tokio::test]
async fn test_type_specifiers() {
    let ctx = context().with_this(Some(patient().await));

    let compiled = compile("deceased as boolean", &ctx).await;
    let boolean = compiled.single_type().unwrap();
    assert!(boolean.walker().is_some_and(StructureDefinitionWalker::is_root));
    assert_eq!(boolean.system_type(), Some(SystemType::Boolean));

    let compiled = compile("deceased is System.Boolean", &ctx).await;
    assert_eq!(
        compiled.single_type().and_then(|t| t.system_type()),
        Some(SystemType::Boolean)
    );

    // Quantity is not in the fixture model
    let compiled = compile("(5 'mg').ofType(Quantity)", &ctx).await;
    assert!(compiled.diagnostics.is_empty());
    assert_eq!(
        compiled.single_type().and_then(|t| t.system_type()),
        Some(SystemType::Quantity)
    );
}

#[tokio::test]
async fn test_union_of_distinct_types() {
    let ctx = context().with_this(Some(patient().await));
    let compiled = compile("name | address", &ctx).await;
    assert_eq!(compiled.types.len(), 2);
    assert!(compiled.single_type().is_none());

    let compiled = compile("name | name", &ctx).await;
    assert_eq!(compiled.types.len(), 1);
}

#[tokio::test]
async fn test_infer_forwards_diagnostics_with_position() {
    let expression = parse_expression("name.nickname").unwrap();
    let ctx = context().with_this(Some(patient().await));

    let outcome = infer_expression_type(&FhirPathTypeCompiler::new(), &expression, &ctx, true).await;
    assert!(outcome.resolved.is_none());
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].code, FML0140);
    insta::assert_snapshot!(
        outcome.diagnostics[0].message,
        @"Property `nickname` not found on `HumanName` @ 1:1"
    );
}

#[tokio::test]
async fn test_infer_suppresses_variable_hint() {
    let expression = parse_expression("p").unwrap();
    let mut scope = Scope::new();
    scope
        .bind("p", Some(PropertyOrTypeDetails::system("p", SystemType::String)))
        .unwrap();
    let ctx = CompilerContext::new(scope, registry(R4));

    let suppressed = infer_expression_type(&FhirPathTypeCompiler::new(), &expression, &ctx, true).await;
    assert!(suppressed.diagnostics.is_empty());
    assert_eq!(
        suppressed.resolved.and_then(|t| t.system_type()),
        Some(SystemType::String)
    );

    let shown = infer_expression_type(&FhirPathTypeCompiler::new(), &expression, &ctx, false).await;
    assert_eq!(shown.diagnostics.len(), 1);
    assert_eq!(shown.diagnostics[0].severity, Severity::Warning);
}
