//! `report.json`
//!
//! The report is versioned. Additive fields bump the minor version; anything
//! an existing reader would misinterpret bumps the major.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diagnostic::{Diagnostic, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    pub major: u32,
    pub minor: u32,
}

impl ReportVersion {
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Counts over one compilation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub files_checked: usize,
    pub queries_compiled: usize,

    /// Diagnostics of every severity
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

impl ReportSummary {
    /// Count `diagnostics` by severity
    pub fn tally(diagnostics: &[Diagnostic]) -> Self {
        diagnostics.iter().fold(Self::default(), |mut summary, diagnostic| {
            let bucket = match diagnostic.severity {
                Severity::Error => &mut summary.errors,
                Severity::Warn => &mut summary.warnings,
                Severity::Info => &mut summary.info,
            };
            *bucket += 1;
            summary.total += 1;
            summary
        })
    }
}

/// Outcome of checking a set of sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub version: ReportVersion,

    /// RFC 3339 time the report was produced
    pub timestamp: String,

    pub summary: ReportSummary,

    /// In the order the compiler emitted them
    pub diagnostics: Vec<Diagnostic>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Report {
    /// Report over `diagnostics` from `files_checked` sources holding
    /// `queries_compiled` labeled statements
    pub fn new(files_checked: usize, queries_compiled: usize, diagnostics: Vec<Diagnostic>) -> Self {
        let summary = ReportSummary {
            files_checked,
            queries_compiled,
            ..ReportSummary::tally(&diagnostics)
        };
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary,
            diagnostics,
            metadata: None,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.summary.warnings > 0
    }

    /// Diagnostic count per source file; diagnostics without a location are
    /// not counted
    pub fn per_file(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for location in self.diagnostics.iter().filter_map(|d| d.location.as_ref()) {
            *counts.entry(location.file.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticCode, Location};
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_report() {
        let report = Report::new(2, 4, Vec::new());
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(
            report.summary,
            ReportSummary {
                files_checked: 2,
                queries_compiled: 4,
                ..ReportSummary::default()
            }
        );
        assert!(!report.has_errors());
        assert!(report.per_file().is_empty());
    }

    #[test]
    fn summary_counts_by_severity() {
        let diagnostics = vec![
            Diagnostic::error(DiagnosticCode::TableNotFound, "No table found with name foo")
                .with_location(Location::with_line("queries.sq", 3)),
            Diagnostic::error(DiagnosticCode::ExpressionError, "Ambiguous column name id")
                .with_location(Location::with_line("queries.sq", 7)),
            Diagnostic::new(DiagnosticCode::Info, Severity::Info, "All good")
                .with_location(Location::with_line("schema.sq", 1)),
            Diagnostic::new(DiagnosticCode::Info, Severity::Warn, "Unplaced"),
        ];

        let report = Report::new(3, 5, diagnostics);
        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.errors, 2);
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.summary.info, 1);
        assert_eq!(report.summary.files_checked, 3);
        assert!(report.has_errors());
        assert!(report.has_warnings());
        assert_eq!(
            report.per_file().into_iter().collect::<Vec<_>>(),
            vec![("queries.sq", 2), ("schema.sq", 1)]
        );
    }

    #[test]
    fn report_json_shape() {
        let json = Report::new(0, 0, Vec::new()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"]["major"], 1);
        assert_eq!(value["summary"]["files_checked"], 0);
        assert!(value["diagnostics"].as_array().unwrap().is_empty());
        assert!(value.get("metadata").is_none());
    }
}
