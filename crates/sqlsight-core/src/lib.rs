//! sqlsight core
//!
//! Core domain model with stable, versioned types shared by every crate.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod schema;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use schema::{SqliteType, OutputColumn};
pub use report::{Report, ReportSummary, ReportVersion};
pub use config::{Config, ConfigError, SeverityThreshold};
