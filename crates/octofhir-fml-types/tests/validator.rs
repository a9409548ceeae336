//! Structure map validation tests
//!
//! Covers:
//! - Scoping of group parameters and rule aliases
//! - Source/target type compatibility, typed groups and cross-version models
//! - Dependent group invocations
//! - Map-level checks (duplicates, metadata, concept maps, extends)
//! - Rule shape warnings

mod common;

use common::{CORE, R4, R5, codes, parse_map, registry, validate};
use octofhir_fml_diagnostics::{DiagnosticCategory, Severity};
use octofhir_fml_types::{StructureMapValidator, TypedGroupIndex, ValidatorConfig};
use pretty_assertions::assert_eq;

// === Baseline ===

#[tokio::test]
async fn test_empty_group_has_no_diagnostics() {
    let report = validate("group empty() { }").await;
    assert!(report.is_empty());
    assert_eq!(report.transcript, vec!["group empty"]);
}

#[tokio::test]
async fn test_validation_is_repeatable() {
    let source = r#"group g(source src : Patient, target tgt : Patient) {
  src.active -> tgt.name.family;
  a -> tgt.active;
}"#;
    let map = parse_map(source);
    let validator = StructureMapValidator::new(registry(R4), registry(R4));

    let first = validator.validate(&map).await;
    let second = validator.validate(&map).await;
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.transcript, second.transcript);
}

#[tokio::test]
async fn test_transcript_lists_parameters() {
    let report = validate(
        r#"map "http://example.org/fml/t" = t

group t(source src : Patient, target tgt : Patient) {
  src.active -> tgt.active;
}"#,
    )
    .await;

    assert!(report.is_empty());
    assert_eq!(
        &report.transcript[..4],
        &[
            "map http://example.org/fml/t = t",
            "group t",
            "  source src : Patient",
            "  target tgt : Patient",
        ]
    );
    assert!(report.transcript[4].starts_with("  rule src.active -> tgt.active"));
}

// === Scopes ===

#[tokio::test]
async fn test_alias_does_not_leak_into_sibling_rule() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.active as a -> tgt.active = a;
  a -> tgt.active;
}"#,
    )
    .await;

    assert_eq!(codes(&report), vec!["FML0102"]);
    assert_eq!(report.diagnostics[0].category, DiagnosticCategory::NotFound);
    assert!(report.diagnostics[0].message.starts_with("`a` is not in scope @ 3:3"));
}

#[tokio::test]
async fn test_duplicate_alias_reported_once() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.active as x, src.name as x -> tgt.active;
}"#,
    )
    .await;

    assert_eq!(codes(&report), vec!["FML0110"]);
    assert_eq!(report.diagnostics[0].category, DiagnosticCategory::Duplicate);
}

#[tokio::test]
async fn test_alias_visible_in_nested_rules() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name as t then {
    n.family -> t.family;
  };
}"#,
    )
    .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
}

#[tokio::test]
async fn test_nested_alias_shadows_outer_alias() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as vs -> tgt.name as vt then {
    vs.given as vs -> vt.given = vs;
  };
}"#,
    )
    .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
}

#[tokio::test]
async fn test_nested_alias_does_not_leak_to_outer_sibling() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name as t then {
    n.family as f -> t.family = f;
  };
  src.active -> tgt.active = f;
}"#,
    )
    .await;

    assert_eq!(codes(&report), vec!["FML0102"]);
    assert!(report.diagnostics[0].message.starts_with("`f` is not in scope @ 5:30"));
}

#[tokio::test]
async fn test_unknown_element() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.nickname -> tgt.active;
}"#,
    )
    .await;

    assert_eq!(codes(&report), vec!["FML0103"]);
    assert!(report.diagnostics[0].message.contains("nickname"));
}

#[tokio::test]
async fn test_unknown_parameter_type() {
    let report = validate("group g(source src : Nope) { }").await;

    assert_eq!(codes(&report), vec!["FML0101"]);
    assert!(report.diagnostics[0].message.contains(&format!("{CORE}Nope")));
}

#[tokio::test]
async fn test_uses_alias_resolves_parameter_type() {
    let report = validate(
        r#"uses "http://hl7.org/fhir/StructureDefinition/Patient" alias P as source
uses "http://hl7.org/fhir/StructureDefinition/Basic" alias B as target

group g(source src : P, target tgt : B) {
  src.birthDate -> tgt.created;
}"#,
    )
    .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
}

// === Compatibility ===

#[tokio::test]
async fn test_matching_types_are_compatible() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.active -> tgt.active;
}"#,
    )
    .await;
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_mismatched_primitives() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.active -> tgt.name.family;
}"#,
    )
    .await;

    assert_eq!(codes(&report), vec!["FML0105"]);
    let message = &report.diagnostics[0].message;
    assert!(message.contains(&format!("{CORE}boolean")));
    assert!(message.contains(&format!("{CORE}string")));
    insta::assert_snapshot!(message, @"No target type for mapping `http://hl7.org/fhir/StructureDefinition/boolean` -> `http://hl7.org/fhir/StructureDefinition/string` @ 2:3");
}

#[tokio::test]
async fn test_primitives_with_same_system_type_are_compatible() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.gender -> tgt.name.family;
}"#,
    )
    .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
}

#[tokio::test]
async fn test_cross_version_primitives_are_compatible() {
    let map = parse_map(
        r#"group g(source s : boolean, target t : boolean) {
  s as v -> t = v;
}"#,
    );
    let report = StructureMapValidator::new(registry(R4), registry(R5))
        .validate(&map)
        .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
}

#[tokio::test]
async fn test_literal_transform_type() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src -> tgt.active = true;
  src -> tgt.active = 'yes';
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0105"]);
    assert!(report.diagnostics[0].message.contains("@ 3:3"));
}

#[tokio::test]
async fn test_typed_group_allows_mapping() {
    let source = r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name.family = n;
}

group nameText(source s : HumanName, target t : string) <<types>> { }"#;
    let map = parse_map(source);

    let without = StructureMapValidator::new(registry(R4), registry(R4))
        .validate(&map)
        .await;
    assert_eq!(codes(&without), vec!["FML0105"]);

    let typed = TypedGroupIndex::from_structure_map(&map, &registry(R4), &registry(R4)).await;
    assert_eq!(typed.len(), 1);
    let with = StructureMapValidator::new(registry(R4), registry(R4))
        .with_typed_groups(typed)
        .validate(&map)
        .await;
    assert!(with.is_empty(), "{:?}", with.diagnostics);
}

// === Sources ===

#[tokio::test]
async fn test_type_cast_narrows_choice() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.deceased : boolean as d -> tgt.active = d;
}"#,
    )
    .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
}

#[tokio::test]
async fn test_invalid_type_cast() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.deceased : string as d -> tgt.active;
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0121"]);
    assert_eq!(report.diagnostics[0].category, DiagnosticCategory::Conflict);
}

#[tokio::test]
async fn test_where_clause_uses_alias() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n where n.given.exists() -> tgt.name;
}"#,
    )
    .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
}

#[tokio::test]
async fn test_variable_hint_can_be_enabled() {
    let map = parse_map(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n where n.given.exists() -> tgt.name;
}"#,
    );
    let report = StructureMapValidator::new(registry(R4), registry(R4))
        .with_config(ValidatorConfig {
            suppress_variable_hint: false,
        })
        .validate(&map)
        .await;

    assert_eq!(codes(&report), vec!["FML0140"]);
    assert_eq!(report.diagnostics[0].severity, Severity::Warning);
    assert!(report.diagnostics[0].message.contains("did you mean to use the variable `%n`"));
}

#[tokio::test]
async fn test_where_clause_unknown_property() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n where n.nickname.exists() -> tgt.name;
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0140"]);
    assert!(report.diagnostics[0].message.contains("Property `nickname` not found"));
}

#[tokio::test]
async fn test_constants_are_visible_in_groups() {
    let report = validate(
        r#"let limit = 3 + 4;

group g(source src : Patient, target tgt : Patient) {
  src.name as n where n.given.count() <= %limit -> tgt.name;
}"#,
    )
    .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
    assert_eq!(report.transcript[0], "let limit : System.Integer");
}

// === Transforms ===

#[tokio::test]
async fn test_create_resolves_named_type() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name = create('HumanName') as hn;
  src.name as n -> tgt.name = create('Nope');
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0101"]);
    assert!(report.diagnostics[0].message.starts_with("Type `Nope` not found"));
}

#[tokio::test]
async fn test_unhandled_invocation() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.active as a -> tgt.active = evaluate(a, 'x');
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0134"]);
}

#[tokio::test]
async fn test_dotted_identifier_transform() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src -> tgt.active = src.active;
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0132"]);
    assert_eq!(report.diagnostics[0].severity, Severity::Warning);
}

// === Simple copies and rule names ===

#[tokio::test]
async fn test_simple_copy_of_backbone() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.contact -> tgt.contact;
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0130"]);
    assert_eq!(report.diagnostics[0].severity, Severity::Warning);
}

#[tokio::test]
async fn test_simple_copy_of_complex_datatype() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name -> tgt.name;
  src.name.family -> tgt.name.family;
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0130"]);
    assert!(
        report.diagnostics[0]
            .message
            .starts_with("`src.name` is a composite element and cannot be copied directly @ 2:3")
    );
}

#[tokio::test]
async fn test_simple_copy_to_context() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src -> tgt;
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0131"]);
}

#[tokio::test]
async fn test_invalid_rule_name() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.active -> tgt.active "not valid";
  src.active -> tgt.active "copy-active";
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0133"]);
}

#[tokio::test]
async fn test_rule_name_reported_after_operands() {
    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.nickname -> tgt.active "bad name";
  src.nickname as n -> tgt.name then missing(n) "also bad";
}"#,
    )
    .await;
    assert_eq!(
        codes(&report),
        vec!["FML0103", "FML0133", "FML0103", "FML0133", "FML0104"]
    );
}

// === Dependent invocations ===

#[tokio::test]
async fn test_conflicting_dependent_arguments() {
    let report = validate(
        r#"group main(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name then copyAny(n, tgt);
  src.address as a -> tgt.address then copyAny(a, tgt);
}

group copyAny(source s, target t) { }"#,
    )
    .await;

    assert_eq!(codes(&report), vec!["FML0120"]);
    assert_eq!(report.diagnostics[0].category, DiagnosticCategory::Conflict);
    assert!(report.diagnostics[0].message.contains("conflicting argument type"));
    assert!(report.transcript.contains(&"  source s : HumanName".to_string()));
}

#[tokio::test]
async fn test_dependent_group_not_found() {
    let report = validate(
        r#"group main(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name then missing(n, tgt);
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0104"]);
}

#[tokio::test]
async fn test_dependent_argument_count() {
    let report = validate(
        r#"group main(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name then copyName(n);
}

group copyName(source s : HumanName, target t : HumanName) { }"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0135"]);
}

#[tokio::test]
async fn test_named_groups_from_registry() {
    let common = parse_map("group copyName(source s, target t) { }");
    let map = parse_map(
        r#"group main(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name as t then copyName(n, t);
}"#,
    );
    let report = StructureMapValidator::new(registry(R4), registry(R4))
        .with_named_groups(octofhir_fml_types::GroupRegistry::from_structure_map(&common))
        .validate(&map)
        .await;
    assert!(report.is_empty(), "{:?}", report.diagnostics);
}

// === Map-level checks ===

#[tokio::test]
async fn test_duplicate_group() {
    let report = validate("group a() { }\ngroup a() { }").await;
    assert_eq!(codes(&report), vec!["FML0111"]);
}

#[tokio::test]
async fn test_unknown_metadata() {
    let report = validate("/// nonsense = 'x'\ngroup a() { }").await;
    assert_eq!(codes(&report), vec!["FML0136"]);
    assert_eq!(report.diagnostics[0].severity, Severity::Warning);
}

#[tokio::test]
async fn test_undeclared_concept_map_prefix() {
    let report = validate(
        r#"conceptmap "http://example.org/cm" {
  prefix s = "http://hl7.org/fhir/administrative-gender"

  s:male == t:M
}"#,
    )
    .await;
    assert_eq!(codes(&report), vec!["FML0107"]);
    assert!(report.diagnostics[0].message.contains("`t`"));
}

#[tokio::test]
async fn test_extends_unknown_group() {
    let report = validate("group a() extends missing { }\ngroup b() extends a { }").await;
    assert_eq!(codes(&report), vec!["FML0106"]);
}

#[tokio::test]
async fn test_report_serializes() {
    let report = validate("group a() extends missing { }").await;
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["diagnostics"][0]["category"], "not-found");
    assert_eq!(json["transcript"][0], "group a");
}
