//! Configuration schema (sqlsight.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::diagnostic::{DiagnosticCode, Severity};

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// File extensions (without the dot) that hold SQL sources
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Files to ignore (glob patterns, relative to the project root)
    #[serde(default)]
    pub skip_files: Vec<String>,

    /// Treat warnings as a failing result
    #[serde(default)]
    pub fail_on_warnings: bool,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

fn default_extensions() -> Vec<String> {
    vec!["sql".to_string(), "sq".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            severity: SeverityThreshold::default(),
            skip_files: Vec::new(),
            fail_on_warnings: false,
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Reject bad globs up front rather than at match time
        for pattern in &config.skip_files {
            glob_to_regex(pattern)?;
        }

        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Whether a path has one of the configured source extensions
    pub fn is_source_file(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Whether a (project-relative) path matches one of the skip globs
    pub fn is_skipped(&self, relative_path: &str) -> bool {
        let normalized = relative_path.replace('\\', "/");
        self.skip_files.iter().any(|pattern| {
            glob_to_regex(pattern)
                .map(|re| re.is_match(&normalized))
                .unwrap_or(false)
        })
    }
}

/// Translate a glob (`*`, `**`, `?`) into an anchored regex
fn glob_to_regex(pattern: &str) -> Result<regex::Regex, ConfigError> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                // `**/` also matches zero directories
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');

    regex::Regex::new(&out).map_err(|e| ConfigError::InvalidPattern(pattern.to_string(), e.to_string()))
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid glob pattern '{0}': {1}")]
    InvalidPattern(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.extensions, vec!["sql", "sq"]);
        assert!(!config.fail_on_warnings);
    }

    #[test]
    fn severity_override() {
        let mut threshold = SeverityThreshold::default();
        threshold.set_override(DiagnosticCode::ColumnNotFound, Severity::Warn);

        assert_eq!(
            threshold.get_severity(DiagnosticCode::ColumnNotFound, Severity::Error),
            Severity::Warn
        );
        assert_eq!(
            threshold.get_severity(DiagnosticCode::TableNotFound, Severity::Error),
            Severity::Error
        );
    }

    #[test]
    fn config_from_toml() {
        let config = Config::from_toml(
            r#"
            extensions = ["sq"]
            skip_files = ["migrations/**"]
            fail_on_warnings = true

            [severity.overrides]
            COMPOUND_ARITY_MISMATCH = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(config.extensions, vec!["sq"]);
        assert!(config.fail_on_warnings);
        assert_eq!(
            config.severity.get_severity(DiagnosticCode::CompoundArityMismatch, Severity::Error),
            Severity::Warn
        );
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.extensions, parsed.extensions);
    }

    #[test]
    fn skip_globs() {
        let config = Config {
            skip_files: vec!["migrations/**".to_string(), "*.gen.sql".to_string()],
            ..Config::default()
        };

        assert!(config.is_skipped("migrations/1.sql"));
        assert!(config.is_skipped("migrations/old/2.sql"));
        assert!(config.is_skipped("queries.gen.sql"));
        assert!(!config.is_skipped("src/queries.gen.sql"));
        assert!(!config.is_skipped("queries/user.sql"));
    }

    #[test]
    fn source_extensions() {
        let config = Config::default();
        assert!(config.is_source_file(std::path::Path::new("a/b/Player.sq")));
        assert!(config.is_source_file(std::path::Path::new("schema.SQL")));
        assert!(!config.is_source_file(std::path::Path::new("README.md")));
    }
}
