//! Tests for embedded FHIRPath expressions
//!
//! Covers:
//! - Operator precedence and associativity
//! - Operator text preserved verbatim
//! - Literals, quantities and external constants
//! - Invocations and indexers

use octofhir_fml_ast::*;
use octofhir_fml_parser::parse_expression;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

fn expr(input: &str) -> Node<FpExpression> {
    parse_expression(input).unwrap_or_else(|e| panic!("Failed to parse `{input}`: {e}"))
}

fn literal(input: &str) -> Literal {
    match expr(input).inner {
        FpExpression::Term(FpTerm::Literal(lit)) => lit,
        other => panic!("expected a literal, got {other:?}"),
    }
}

// === Precedence ===

#[rstest]
#[case("-a", "polarity")]
#[case("a[0]", "indexer")]
#[case("a * b", "multiplicative")]
#[case("a mod b", "multiplicative")]
#[case("a + b", "additive")]
#[case("a & b", "additive")]
#[case("a as Quantity", "type")]
#[case("a | b", "union")]
#[case("a <= b", "inequality")]
#[case("a !~ b", "equality")]
#[case("a contains b", "membership")]
#[case("a and b", "and")]
#[case("a xor b", "or")]
#[case("a implies b", "implies")]
#[case("(a or b)", "term")]
#[case("%resource", "term")]
#[case("a.b", "invocation")]
fn test_expression_kind(#[case] input: &str, #[case] kind: &str) {
    assert_eq!(expr(input).kind_name(), kind);
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let e = expr("1 + 2 * 3");
    let FpExpression::Additive(add) = &e.inner else {
        panic!("expected additive, got {:?}", e.inner);
    };
    assert_eq!(add.left.raw_text(), "1");
    assert_eq!(add.operator, "+");
    assert_eq!(add.right.raw_text(), "2 * 3");
    assert_eq!(add.right.kind_name(), "multiplicative");
}

#[test]
fn test_left_associativity() {
    let e = expr("a - b - c");
    let FpExpression::Additive(outer) = &e.inner else {
        panic!("expected additive, got {:?}", e.inner);
    };
    assert_eq!(outer.left.raw_text(), "a - b");
    assert_eq!(outer.right.raw_text(), "c");
}

#[test]
fn test_operator_text_is_verbatim() {
    let operators: Vec<String> = ["a != b", "a ~ b", "a div b", "a in b", "a or b"]
        .iter()
        .map(|input| expr(input).operator().unwrap_or_default().to_string())
        .collect();
    assert_eq!(operators, vec!["!=", "~", "div", "in", "or"]);
}

#[test]
fn test_type_expression() {
    let e = expr("value is FHIR.string");
    let FpExpression::Type(ty) = &e.inner else {
        panic!("expected type expression, got {:?}", e.inner);
    };
    assert_eq!(ty.operator, "is");
    assert_eq!(ty.type_specifier.to_string(), "FHIR.string");
    assert_eq!(ty.operand.raw_text(), "value");
}

// === Invocations ===

#[test]
fn test_function_chain() {
    let e = expr("name.where(use = 'official').given.first()");
    let FpExpression::Invocation(first) = &e.inner else {
        panic!("expected invocation, got {:?}", e.inner);
    };
    assert!(matches!(
        &first.invocation.inner,
        FpInvocation::Function(f) if f.name == "first" && f.arguments.is_empty()
    ));
    assert_eq!(first.target.raw_text(), "name.where(use = 'official').given");

    let where_call = e
        .children()
        .into_iter()
        .flat_map(|c| c.children())
        .find(|c| c.raw_text() == "name.where(use = 'official')")
        .unwrap();
    let FpExpression::Invocation(inv) = &where_call.inner else {
        panic!("expected invocation, got {:?}", where_call.inner);
    };
    let FpInvocation::Function(func) = &inv.invocation.inner else {
        panic!("expected a function, got {:?}", inv.invocation.inner);
    };
    assert_eq!(func.name, "where");
    assert_eq!(func.arguments.len(), 1);
    assert_eq!(func.arguments[0].operator(), Some("="));
}

#[rstest]
#[case("$this", FpInvocation::This)]
#[case("$index", FpInvocation::Index)]
#[case("$total", FpInvocation::Total)]
#[case("given", FpInvocation::Member("given".into()))]
#[case("`div`", FpInvocation::Member("div".into()))]
fn test_invocation_terms(#[case] input: &str, #[case] expected: FpInvocation) {
    assert_eq!(expr(input).inner, FpExpression::Term(FpTerm::Invocation(expected)));
}

#[test]
fn test_indexer() {
    let e = expr("telecom[1].value");
    let FpExpression::Invocation(inv) = &e.inner else {
        panic!("expected invocation, got {:?}", e.inner);
    };
    let FpExpression::Indexer(idx) = &inv.target.inner else {
        panic!("expected indexer, got {:?}", inv.target.inner);
    };
    assert_eq!(idx.target.raw_text(), "telecom");
    assert_eq!(idx.index.raw_text(), "1");
}

#[test]
fn test_external_constant() {
    assert_eq!(
        expr("%'vs-gender'").inner,
        FpExpression::Term(FpTerm::ExternalConstant("vs-gender".into()))
    );
}

// === Literals ===

#[rstest]
#[case("true", Literal::Boolean(true))]
#[case("{}", Literal::Null)]
#[case("42", Literal::Integer(42))]
#[case("'it\\'s'", Literal::String("it's".into()))]
#[case("@2020-01-01", Literal::Date("2020-01-01".into()))]
#[case("@2020-01-01T10:00:00Z", Literal::DateTime("2020-01-01T10:00:00Z".into()))]
#[case("@T10:00", Literal::Time("10:00".into()))]
fn test_literals(#[case] input: &str, #[case] expected: Literal) {
    assert_eq!(literal(input), expected);
}

#[test]
fn test_decimal_literal() {
    assert_eq!(literal("1.50"), Literal::Decimal(Decimal::new(150, 2)));
}

#[rstest]
#[case("5 'mg'", "5", "mg")]
#[case("2.5 days", "2.5", "days")]
fn test_quantity_literal(#[case] input: &str, #[case] value: &str, #[case] unit: &str) {
    let Literal::Quantity(quantity) = literal(input) else {
        panic!("expected a quantity");
    };
    assert_eq!(quantity.value.to_string(), value);
    assert_eq!(quantity.unit, unit);
}

// === Errors ===

#[rstest]
#[case("a +", "FML0002")]
#[case("a b", "FML0001")]
#[case("* 2", "FML0010")]
fn test_expression_errors(#[case] input: &str, #[case] code: &str) {
    let error = parse_expression(input).unwrap_err();
    assert_eq!(error.code().to_string(), code);
}
