//! Command-line validation tests
//!
//! Covers:
//! - Loading StructureDefinition bundles from disk
//! - Included maps as named and typed groups
//! - Syntax errors reported as diagnostics
//! - Strict mode and JSON output

use octofhir_fml::cli::output::OutputFormat;
use octofhir_fml::cli::validate::{
    FileReport, ValidateConfig, ValidationSetup, is_failure, load_registry,
};
use octofhir_fml::model::{
    ElementDefinition, StructureDefinition, StructureDefinitionKind, StructureDefinitionRegistry,
};
use octofhir_fml::diagnostics::{Diagnostic, DiagnosticCategory, FML0105, FML0131};
use octofhir_fml::{ModelResolver, ValidationReport, validate};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const CORE: &str = "http://hl7.org/fhir/StructureDefinition/";

fn definitions() -> Vec<StructureDefinition> {
    use StructureDefinitionKind::{ComplexType, PrimitiveType, Resource};

    let sd = |name: &str, kind, elements: Vec<ElementDefinition>| {
        StructureDefinition::new(format!("{CORE}{name}"), name, name, kind).with_snapshot(elements)
    };
    let el = |path: &str, types: &[&str]| ElementDefinition::new(path).with_types(types);

    vec![
        sd("boolean", PrimitiveType, vec![el("boolean", &[]), el("boolean.value", &["http://hl7.org/fhirpath/System.Boolean"])]),
        sd("string", PrimitiveType, vec![el("string", &[]), el("string.value", &["http://hl7.org/fhirpath/System.String"])]),
        sd("HumanName", ComplexType, vec![
            el("HumanName", &[]),
            el("HumanName.family", &["string"]),
            el("HumanName.given", &["string"]),
        ]),
        sd("Patient", Resource, vec![
            el("Patient", &[]),
            el("Patient.active", &["boolean"]),
            el("Patient.name", &["HumanName"]),
        ]),
    ]
}

fn write_bundle(dir: &Path) -> PathBuf {
    let entries: Vec<_> = definitions()
        .into_iter()
        .map(|sd| json!({ "resource": sd }))
        .collect();
    let bundle = json!({ "resourceType": "Bundle", "entry": entries });
    let path = dir.join("definitions.json");
    fs::write(&path, serde_json::to_string_pretty(&bundle).unwrap()).unwrap();
    path
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn config(definitions: PathBuf) -> ValidateConfig {
    ValidateConfig {
        files: Vec::new(),
        source_definitions: vec![definitions],
        target_definitions: Vec::new(),
        includes: Vec::new(),
        fhir_version: None,
        transcript: false,
        strict: false,
        format: OutputFormat::Text,
        verbose: false,
        output_file: None,
    }
}

fn codes(report: &FileReport) -> Vec<String> {
    report
        .report
        .diagnostics
        .iter()
        .map(|d| d.code.to_string())
        .collect()
}

#[tokio::test]
async fn test_validate_convenience() {
    let registry: Arc<dyn ModelResolver> =
        Arc::new(StructureDefinitionRegistry::from_definitions(definitions()));

    let report = validate(
        r#"group g(source src : Patient, target tgt : Patient) {
  src.active -> tgt.active;
}"#,
        registry.clone(),
        registry.clone(),
    )
    .await
    .unwrap();
    assert!(report.is_empty(), "{:?}", report.diagnostics);

    let err = validate("group g(source src : Patient {", registry.clone(), registry).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn test_directory_of_definitions() {
    let dir = TempDir::new().unwrap();
    let defs = dir.path().join("defs");
    fs::create_dir(&defs).unwrap();
    write_bundle(&defs);
    fs::write(defs.join("notes.txt"), "not json").unwrap();

    let registry = load_registry(&[defs], Some("4.0.1")).unwrap();
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.fhir_version(), Some("4.0.1"));
}

#[test]
fn test_missing_definitions_path() {
    let dir = TempDir::new().unwrap();
    let result = load_registry(&[dir.path().join("missing.json")], None);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_mismatch_is_reported() {
    let dir = TempDir::new().unwrap();
    let defs = write_bundle(dir.path());
    let map = write_file(
        dir.path(),
        "map.fml",
        r#"group g(source src : Patient, target tgt : Patient) {
  src.active -> tgt.name.family;
}"#,
    );

    let setup = ValidationSetup::load(&config(defs)).await.unwrap();
    let report = setup.validate_file(&map).await.unwrap();
    assert_eq!(codes(&report), vec!["FML0105"]);
    assert!(is_failure(&[report], false));
}

#[tokio::test]
async fn test_syntax_error_becomes_diagnostic() {
    let dir = TempDir::new().unwrap();
    let defs = write_bundle(dir.path());
    let map = write_file(dir.path(), "broken.fml", "group g(source src : Patient {");

    let setup = ValidationSetup::load(&config(defs)).await.unwrap();
    let report = setup.validate_file(&map).await.unwrap();
    assert_eq!(report.report.diagnostics.len(), 1);
    assert!(report.report.has_errors());
    assert!(report.report.transcript.is_empty());
}

#[tokio::test]
async fn test_unreadable_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let defs = write_bundle(dir.path());
    let setup = ValidationSetup::load(&config(defs)).await.unwrap();
    assert!(setup.validate_file(&dir.path().join("nope.fml")).await.is_err());
}

#[tokio::test]
async fn test_included_groups() {
    let dir = TempDir::new().unwrap();
    let defs = write_bundle(dir.path());
    let common = write_file(
        dir.path(),
        "common.fml",
        r#"group copyName(source s, target t) { }

group nameText(source s : HumanName, target t : string) <<types>> { }"#,
    );
    let map = write_file(
        dir.path(),
        "map.fml",
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name as t then copyName(n, t);
  src.name as n -> tgt.name.family = n;
}"#,
    );

    let without = ValidationSetup::load(&config(defs.clone())).await.unwrap();
    let report = without.validate_file(&map).await.unwrap();
    assert_eq!(codes(&report), vec!["FML0104", "FML0105"]);

    let mut cfg = config(defs);
    cfg.includes = vec![common];
    let with = ValidationSetup::load(&cfg).await.unwrap();
    assert!(with.named_groups.contains("copyName"));
    assert_eq!(with.typed_groups.len(), 1);
    let report = with.validate_file(&map).await.unwrap();
    assert!(report.report.is_empty(), "{:?}", report.report.diagnostics);
}

#[tokio::test]
async fn test_own_typed_groups_are_indexed() {
    let dir = TempDir::new().unwrap();
    let defs = write_bundle(dir.path());
    let map = write_file(
        dir.path(),
        "map.fml",
        r#"group g(source src : Patient, target tgt : Patient) {
  src.name as n -> tgt.name.family = n;
}

group nameText(source s : HumanName, target t : string) <<types>> { }"#,
    );

    let setup = ValidationSetup::load(&config(defs)).await.unwrap();
    let report = setup.validate_file(&map).await.unwrap();
    assert!(report.report.is_empty(), "{:?}", report.report.diagnostics);
}

#[tokio::test]
async fn test_strict_mode_fails_on_warnings() {
    let dir = TempDir::new().unwrap();
    let defs = write_bundle(dir.path());
    let map = write_file(
        dir.path(),
        "map.fml",
        r#"group g(source src : Patient, target tgt : Patient) {
  src -> tgt;
}"#,
    );

    let setup = ValidationSetup::load(&config(defs)).await.unwrap();
    let reports = vec![setup.validate_file(&map).await.unwrap()];
    assert_eq!(codes(&reports[0]), vec!["FML0131"]);
    assert!(!is_failure(&reports, false));
    assert!(is_failure(&reports, true));
}

#[tokio::test]
async fn test_file_report_json() {
    let dir = TempDir::new().unwrap();
    let defs = write_bundle(dir.path());
    let map = write_file(dir.path(), "empty.fml", "group empty() { }");

    let setup = ValidationSetup::load(&config(defs)).await.unwrap();
    let report = setup.validate_file(&map).await.unwrap();
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["diagnostics"], json!([]));
    assert_eq!(value["transcript"], json!(["group empty"]));
    assert!(value["file"].as_str().unwrap().ends_with("empty.fml"));
}

#[rstest]
#[case::clean(vec![], false, false)]
#[case::clean_strict(vec![], true, false)]
#[case::warning(vec![Diagnostic::warning(DiagnosticCategory::Value, FML0131, "w")], false, false)]
#[case::warning_strict(vec![Diagnostic::warning(DiagnosticCategory::Value, FML0131, "w")], true, true)]
#[case::error(vec![Diagnostic::error(DiagnosticCategory::Conflict, FML0105, "e")], false, true)]
fn test_is_failure(
    #[case] diagnostics: Vec<Diagnostic>,
    #[case] strict: bool,
    #[case] expected: bool,
) {
    let report = FileReport {
        file: PathBuf::from("map.fml"),
        report: ValidationReport {
            diagnostics,
            transcript: Vec::new(),
        },
    };
    assert_eq!(is_failure(&[report], strict), expected);
}
