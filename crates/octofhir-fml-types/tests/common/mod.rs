//! Shared fixtures: a small FHIR core model in two versions

#![allow(dead_code)]

use octofhir_fml_ast::FhirStructureMap;
use octofhir_fml_model::{
    ElementDefinition, ModelResolver, StructureDefinition, StructureDefinitionKind,
    StructureDefinitionRegistry,
};
use octofhir_fml_types::{StructureMapValidator, ValidationReport};
use std::sync::Arc;

pub const CORE: &str = "http://hl7.org/fhir/StructureDefinition/";
pub const R4: &str = "4.0.1";
pub const R5: &str = "5.0.0";

fn sd(
    name: &str,
    kind: StructureDefinitionKind,
    version: &str,
    elements: Vec<ElementDefinition>,
) -> StructureDefinition {
    StructureDefinition::new(format!("{CORE}{name}"), name, name, kind)
        .with_version(version)
        .with_fhir_version(version)
        .with_snapshot(elements)
}

fn el(path: &str, types: &[&str]) -> ElementDefinition {
    ElementDefinition::new(path).with_types(types)
}

fn primitive(name: &str, system: &str, version: &str) -> StructureDefinition {
    sd(name, StructureDefinitionKind::PrimitiveType, version, vec![
        el(name, &[]),
        el(&format!("{name}.value"), &[&format!("http://hl7.org/fhirpath/System.{system}")]),
    ])
}

/// Core definitions stamped with one version
pub fn definitions(version: &str) -> Vec<StructureDefinition> {
    use StructureDefinitionKind::{ComplexType, Resource};

    vec![
        primitive("boolean", "Boolean", version),
        primitive("string", "String", version),
        primitive("code", "String", version),
        primitive("integer", "Integer", version),
        primitive("date", "Date", version),
        primitive("dateTime", "DateTime", version),
        sd("HumanName", ComplexType, version, vec![
            el("HumanName", &[]),
            el("HumanName.family", &["string"]),
            el("HumanName.given", &["string"]),
        ]),
        sd("Address", ComplexType, version, vec![
            el("Address", &[]),
            el("Address.line", &["string"]),
            el("Address.city", &["string"]),
        ]),
        sd("CodeableConcept", ComplexType, version, vec![
            el("CodeableConcept", &[]),
            el("CodeableConcept.text", &["string"]),
        ]),
        sd("Reference", ComplexType, version, vec![
            el("Reference", &[]),
            el("Reference.reference", &["string"]),
            el("Reference.display", &["string"]),
        ]),
        sd("Patient", Resource, version, vec![
            el("Patient", &[]),
            el("Patient.active", &["boolean"]),
            el("Patient.name", &["HumanName"]),
            el("Patient.address", &["Address"]),
            el("Patient.gender", &["code"]),
            el("Patient.birthDate", &["date"]),
            el("Patient.deceased[x]", &["boolean", "dateTime"]),
            el("Patient.contact", &["BackboneElement"]),
            el("Patient.contact.name", &["HumanName"]),
        ]),
        sd("Basic", Resource, version, vec![
            el("Basic", &[]),
            el("Basic.code", &["CodeableConcept"]),
            el("Basic.subject", &["Reference"]),
            el("Basic.created", &["date"]),
        ]),
    ]
}

pub fn registry(version: &str) -> Arc<dyn ModelResolver> {
    Arc::new(StructureDefinitionRegistry::from_definitions(definitions(version)).with_fhir_version(version))
}

pub fn parse_map(source: &str) -> FhirStructureMap {
    octofhir_fml_parser::parse(source).unwrap_or_else(|e| panic!("Failed to parse map: {e}"))
}

/// Validate against R4 on both sides
pub async fn validate(source: &str) -> ValidationReport {
    StructureMapValidator::new(registry(R4), registry(R4))
        .validate(&parse_map(source))
        .await
}

/// Diagnostic codes as `FMLnnnn` strings
pub fn codes(report: &ValidationReport) -> Vec<String> {
    report.codes().iter().map(ToString::to_string).collect()
}
