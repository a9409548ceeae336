//! Validate command implementation

use super::output::{self, OutputFormat};
use anyhow::{Context, Result};
use colored::Colorize;
use octofhir_fml_ast::FhirStructureMap;
use octofhir_fml_model::{ModelResolver, StructureDefinitionRegistry};
use octofhir_fml_types::{
    GroupRegistry, StructureMapValidator, TypedGroupIndex, ValidationReport,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for validate command
pub struct ValidateConfig {
    pub files: Vec<PathBuf>,
    /// StructureDefinition files or directories for the source side
    pub source_definitions: Vec<PathBuf>,
    /// StructureDefinition files or directories for the target side; defaults to the source side
    pub target_definitions: Vec<PathBuf>,
    /// Maps whose groups may be called by the validated maps
    pub includes: Vec<PathBuf>,
    pub fhir_version: Option<String>,
    pub transcript: bool,
    pub strict: bool,
    pub format: OutputFormat,
    pub verbose: bool,
    pub output_file: Option<PathBuf>,
}

/// Validation result for a single file
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    #[serde(flatten)]
    pub report: ValidationReport,
}

/// Models and shared groups every map is validated against
pub struct ValidationSetup {
    pub source: Arc<dyn ModelResolver>,
    pub target: Arc<dyn ModelResolver>,
    pub named_groups: GroupRegistry,
    pub typed_groups: TypedGroupIndex,
}

impl ValidationSetup {
    /// Load StructureDefinitions and included maps
    pub async fn load(config: &ValidateConfig) -> Result<Self> {
        let source: Arc<dyn ModelResolver> =
            Arc::new(load_registry(&config.source_definitions, config.fhir_version.as_deref())?);
        let target: Arc<dyn ModelResolver> = if config.target_definitions.is_empty() {
            source.clone()
        } else {
            Arc::new(load_registry(&config.target_definitions, config.fhir_version.as_deref())?)
        };

        let mut named_groups = GroupRegistry::new();
        let mut typed_groups = TypedGroupIndex::new();
        for include in &config.includes {
            let map = read_map(include)?;
            named_groups.add_structure_map(&map);
            typed_groups.add_structure_map(&map, &source, &target).await;
        }
        log::debug!(
            "{} named group(s), {} typed group(s) included",
            named_groups.len(),
            typed_groups.len()
        );

        Ok(Self {
            source,
            target,
            named_groups,
            typed_groups,
        })
    }

    /// Validate one map; its own typed groups are indexed next to the included ones
    pub async fn validate_map(&self, map: &FhirStructureMap) -> ValidationReport {
        let mut typed_groups = self.typed_groups.clone();
        typed_groups
            .add_structure_map(map, &self.source, &self.target)
            .await;
        StructureMapValidator::new(self.source.clone(), self.target.clone())
            .with_named_groups(self.named_groups.clone())
            .with_typed_groups(typed_groups)
            .validate(map)
            .await
    }

    /// Parse and validate one file
    ///
    /// A syntax error becomes the only diagnostic of the report.
    pub async fn validate_file(&self, file: &Path) -> Result<FileReport> {
        let source = fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let report = match crate::parse(&source) {
            Ok(map) => self.validate_map(&map).await,
            Err(err) => ValidationReport {
                diagnostics: vec![err.to_diagnostic()],
                transcript: Vec::new(),
            },
        };
        Ok(FileReport {
            file: file.to_path_buf(),
            report,
        })
    }
}

/// Load StructureDefinitions from files and directories into one registry
pub fn load_registry(
    paths: &[PathBuf],
    fhir_version: Option<&str>,
) -> Result<StructureDefinitionRegistry> {
    let mut registry = StructureDefinitionRegistry::new();
    if let Some(version) = fhir_version {
        registry = registry.with_fhir_version(version);
    }
    for path in paths {
        let count = registry
            .load_path(path)
            .with_context(|| format!("Failed to load StructureDefinitions from {}", path.display()))?;
        log::info!("loaded {} StructureDefinition(s) from {}", count, path.display());
    }
    Ok(registry)
}

/// Read and parse an FML file
pub fn read_map(path: &Path) -> Result<FhirStructureMap> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    crate::parse(&source).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Whether the reports fail the run
pub fn is_failure(reports: &[FileReport], strict: bool) -> bool {
    reports.iter().any(|r| {
        r.report.has_errors() || (strict && r.report.warnings().next().is_some())
    })
}

/// Validate FML files; returns `false` when the run failed
pub async fn validate(config: ValidateConfig) -> Result<bool> {
    if config.files.is_empty() {
        anyhow::bail!("No files specified for validation");
    }

    let setup = ValidationSetup::load(&config).await?;
    let mut reports = Vec::with_capacity(config.files.len());
    for file in &config.files {
        if config.verbose {
            eprintln!("Validating: {}", file.display());
        }
        reports.push(setup.validate_file(file).await?);
    }

    match config.format {
        OutputFormat::Json => {
            output::write_output(&output::format_json(&reports)?, config.output_file.as_deref())?;
        }
        OutputFormat::Text => print_reports(&reports, config.transcript),
    }

    Ok(!is_failure(&reports, config.strict))
}

fn print_reports(reports: &[FileReport], transcript: bool) {
    let mut total_errors = 0;
    let mut total_warnings = 0;

    for result in reports {
        let status = if result.report.has_errors() {
            "✗".red().bold()
        } else {
            "✓".green().bold()
        };
        let file = result.file.display().to_string();
        println!("{} {}", status, file.cyan());

        if transcript {
            for line in &result.report.transcript {
                println!("    {}", line.dimmed());
            }
        }
        for diagnostic in &result.report.diagnostics {
            println!("  {}", output::format_diagnostic(&file, diagnostic));
        }

        total_errors += result.report.errors().count();
        total_warnings += result.report.warnings().count();
    }

    println!();
    if total_errors == 0 && total_warnings == 0 {
        println!(
            "{}",
            output::format_success(&format!(
                "All {} file(s) validated successfully",
                reports.len()
            ))
        );
        return;
    }

    let mut summary = Vec::new();
    if total_errors > 0 {
        summary.push(format!("{total_errors} error(s)").red().to_string());
    }
    if total_warnings > 0 {
        summary.push(format!("{total_warnings} warning(s)").yellow().to_string());
    }
    eprintln!("{} {}", "Found".bold(), summary.join(", "));
}
