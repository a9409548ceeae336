//! Validation state and report

use crate::details::PropertyOrTypeDetails;
use indexmap::IndexMap;
use octofhir_fml_diagnostics::{Diagnostic, DiagnosticCategory, ErrorCode, Severity, TokenSpan};
use serde::Serialize;

/// Result of validating one structure map
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Diagnostics in the order they were found
    pub diagnostics: Vec<Diagnostic>,
    /// Human-readable walk of the groups and rules that were validated
    pub transcript: Vec<String>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Error codes of all diagnostics, in order
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.diagnostics.iter().map(|d| d.code).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Mutable state threaded through one validation run
#[derive(Debug, Default)]
pub struct ValidationContext {
    diagnostics: Vec<Diagnostic>,
    transcript: Vec<String>,
    depth: usize,
    // (group, parameter index) -> first argument type seen
    arguments: IndexMap<(String, usize), PropertyOrTypeDetails>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic, attaching the code's help text
    pub fn report(&mut self, diagnostic: Diagnostic) {
        let diagnostic = match (diagnostic.help.is_none(), diagnostic.code.info().help) {
            (true, Some(help)) => diagnostic.with_help(help),
            _ => diagnostic,
        };
        log::debug!("{} {}: {}", diagnostic.severity, diagnostic.code, diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    pub fn error(
        &mut self,
        category: DiagnosticCategory,
        code: ErrorCode,
        message: impl Into<String>,
        span: TokenSpan,
    ) {
        self.report(Diagnostic::error(category, code, message).at(span));
    }

    pub fn warning(
        &mut self,
        category: DiagnosticCategory,
        code: ErrorCode,
        message: impl Into<String>,
        span: TokenSpan,
    ) {
        self.report(Diagnostic::warning(category, code, message).at(span));
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }
    }

    /// Append a transcript line at the current depth
    pub fn note(&mut self, line: impl AsRef<str>) {
        let line = format!("{}{}", "  ".repeat(self.depth), line.as_ref());
        log::trace!("{line}");
        self.transcript.push(line);
    }

    pub fn enter(&mut self) {
        self.depth += 1;
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// The argument type first recorded for a group parameter
    pub fn recorded_argument(&self, group: &str, index: usize) -> Option<&PropertyOrTypeDetails> {
        self.arguments.get(&(group.to_string(), index))
    }

    /// Record an argument type for a group parameter
    ///
    /// Returns the earlier type when it differs from `details`; the earlier type
    /// stays recorded.
    pub fn record_argument(
        &mut self,
        group: &str,
        index: usize,
        details: PropertyOrTypeDetails,
    ) -> Option<PropertyOrTypeDetails> {
        let key = (group.to_string(), index);
        match self.arguments.get(&key) {
            Some(previous) if previous.same_structure(&details) => None,
            Some(previous) => Some(previous.clone()),
            None => {
                self.arguments.insert(key, details);
                None
            }
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_report(self) -> ValidationReport {
        ValidationReport {
            diagnostics: self.diagnostics,
            transcript: self.transcript,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_types::SystemType;
    use octofhir_fml_diagnostics::{FML0101, FML0130};

    #[test]
    fn test_report_attaches_help() {
        let mut ctx = ValidationContext::new();
        ctx.error(
            DiagnosticCategory::NotFound,
            FML0101,
            "Type `X` not found",
            TokenSpan::new(3, 7, 40, 40),
        );
        ctx.warning(
            DiagnosticCategory::Value,
            FML0130,
            "Cannot copy",
            TokenSpan::new(4, 1, 50, 52),
        );

        let report = ctx.into_report();
        assert!(report.has_errors());
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.diagnostics[0].message, "Type `X` not found @ 3:7");
        assert!(report.diagnostics[0].help.is_some());
    }

    #[test]
    fn test_record_argument_conflict() {
        let mut ctx = ValidationContext::new();
        let string = PropertyOrTypeDetails::system("a", SystemType::String);
        let boolean = PropertyOrTypeDetails::system("b", SystemType::Boolean);

        assert_eq!(ctx.record_argument("g", 0, string.clone()), None);
        assert_eq!(ctx.record_argument("g", 0, string.clone()), None);
        assert_eq!(ctx.record_argument("g", 0, boolean), Some(string.clone()));
        assert_eq!(ctx.recorded_argument("g", 0), Some(&string));
    }

    #[test]
    fn test_transcript_indentation() {
        let mut ctx = ValidationContext::new();
        ctx.note("group main");
        ctx.enter();
        ctx.note("rule r");
        ctx.leave();
        ctx.leave();
        ctx.note("group other");
        assert_eq!(
            ctx.into_report().transcript,
            vec!["group main", "  rule r", "group other"]
        );
    }
}
