//! Parse command implementation

use super::output::{self, OutputFormat};
use anyhow::{Context, Result};
use octofhir_fml_ast::{FhirStructureMap, GroupDeclaration, ModelMode};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

/// Configuration for parse command
pub struct ParseConfig {
    pub file: PathBuf,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

/// Parse an FML file and print a summary or its AST
pub fn parse(config: &ParseConfig) -> Result<()> {
    let source = fs::read_to_string(&config.file)
        .with_context(|| format!("Failed to read {}", config.file.display()))?;
    let map = crate::parse(&source)
        .with_context(|| format!("Failed to parse {}", config.file.display()))?;

    let content = match config.format {
        OutputFormat::Json => output::format_json(&map)?,
        OutputFormat::Text => summarize(&map),
    };
    output::write_output(&content, config.output_file.as_deref())
}

/// One line per declaration
pub fn summarize(map: &FhirStructureMap) -> String {
    let mut out = String::new();
    if let Some(decl) = &map.map {
        let _ = writeln!(out, "map {} = {}", decl.url, decl.identifier);
    }
    for structure in map.structures.values() {
        let alias = structure
            .alias
            .as_deref()
            .map(|a| format!(" alias {a}"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "uses {}{} as {}",
            structure.url,
            alias,
            mode_keyword(structure.mode)
        );
    }
    for import in map.imports.values() {
        let _ = writeln!(out, "imports {}", import.url);
    }
    for constant in map.constants.values() {
        let _ = writeln!(out, "let {} = {}", constant.name, constant.expression.raw_text());
    }
    for group in map.groups.values() {
        let _ = writeln!(out, "{}", group_signature(group));
    }
    for concept_map in map.concept_maps.values() {
        let _ = writeln!(
            out,
            "conceptmap {} : {} mapping(s)",
            concept_map.url,
            concept_map.mappings.len()
        );
    }
    for duplicate in &map.duplicates {
        let _ = writeln!(
            out,
            "duplicate {} `{}` @ {}",
            duplicate.kind, duplicate.key, duplicate.span
        );
    }
    out.trim_end().to_string()
}

fn group_signature(group: &GroupDeclaration) -> String {
    let parameters: Vec<String> = group
        .parameters
        .iter()
        .map(|p| match &p.type_identifier {
            Some(ty) => format!("{} {} : {}", p.mode, p.identifier, ty.inner),
            None => format!("{} {}", p.mode, p.identifier),
        })
        .collect();
    let extends = group
        .extends
        .as_ref()
        .map(|e| format!(" extends {}", e.inner))
        .unwrap_or_default();
    format!(
        "group {}({}){} : {} rule(s)",
        group.name,
        parameters.join(", "),
        extends,
        group.rules.len()
    )
}

fn mode_keyword(mode: ModelMode) -> &'static str {
    match mode {
        ModelMode::Source => "source",
        ModelMode::Queried => "queried",
        ModelMode::Target => "target",
        ModelMode::Produced => "produced",
    }
}
