//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Front-end (1xxx)
    /// Failed to parse SQL
    SqlParseError,

    // Name lookup (2xxx)
    /// A named column does not exist on the table it was looked up in
    ColumnNotFound,

    /// A column reference matched nothing visible in its scope
    ColumnOrTableNotFound,

    /// A table, view or common table name is not declared anywhere
    TableNotFound,

    /// An expression is invalid in its position (ambiguous column, subquery
    /// where none is allowed, non-boolean partial index predicate, ...)
    ExpressionError,

    // Arity (3xxx)
    /// Compound select branches expose different column counts
    CompoundArityMismatch,

    /// VALUES rows expose different column counts
    ValuesArityMismatch,

    /// INSERT supplies a different number of values than target columns
    InsertColumnMismatch,

    /// A WITH clause or view column list does not match its body
    WithTableError,

    // Definitions (4xxx)
    /// A view (directly or transitively) selects from itself
    RecursiveView,

    /// CREATE TABLE constraints are inconsistent
    CreateTableConstraint,

    /// A table, view or index name is declared twice
    DuplicateDeclaration,

    /// Two statements in one file carry the same label
    DuplicateQueryName,

    /// Parse tree reached a shape the analyzer cannot handle
    IncompleteRule,

    // General (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::ColumnNotFound => "COLUMN_NOT_FOUND",
            Self::ColumnOrTableNotFound => "COLUMN_OR_TABLE_NOT_FOUND",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::ExpressionError => "EXPRESSION_ERROR",
            Self::CompoundArityMismatch => "COMPOUND_ARITY_MISMATCH",
            Self::ValuesArityMismatch => "VALUES_ARITY_MISMATCH",
            Self::InsertColumnMismatch => "INSERT_COLUMN_MISMATCH",
            Self::WithTableError => "WITH_TABLE_ERROR",
            Self::RecursiveView => "RECURSIVE_VIEW",
            Self::CreateTableConstraint => "CREATE_TABLE_CONSTRAINT",
            Self::DuplicateDeclaration => "DUPLICATE_DECLARATION",
            Self::DuplicateQueryName => "DUPLICATE_QUERY_NAME",
            Self::IncompleteRule => "INCOMPLETE_RULE",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocking issue that should fail the build
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path relative to project root
    pub file: String,

    /// Optional line number (1-indexed)
    pub line: Option<usize>,

    /// Optional column number (1-indexed)
    pub column: Option<usize>,

    /// Optional end line (for ranges)
    pub end_line: Option<usize>,

    /// Optional end column (for ranges)
    pub end_column: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            column: None,
            end_line: None,
            end_column: None,
        }
    }

    /// Create a location with file and line number
    pub fn with_line(file: impl Into<String>, line: usize) -> Self {
        Self {
            line: Some(line),
            ..Self::new(file)
        }
    }

    /// Create a location spanning `start` to `end`, both (line, column)
    pub fn with_range(file: impl Into<String>, start: (usize, usize), end: (usize, usize)) -> Self {
        Self {
            file: file.into(),
            line: Some(start.0),
            column: Some(start.1),
            end_line: Some(end.0),
            end_column: Some(end.1),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{}:{}:{}", self.file, line, column),
            (Some(line), None) => write!(f, "{}:{}", self.file, line),
            _ => write!(f, "{}", self.file),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Expected value (for arity diagnostics)
    pub expected: Option<String>,

    /// Actual value (for arity diagnostics)
    pub actual: Option<String>,

    /// Names that were visible where the lookup failed, for "did you mean"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
            candidates: Vec::new(),
        }
    }

    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Set the candidate names
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Closest candidate to `name` by edit distance, if any is close enough
    /// to be worth suggesting.
    pub fn suggestion(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.candidates
            .iter()
            .map(|candidate| (candidate, edit_distance(&name, &candidate.to_ascii_lowercase())))
            .filter(|(candidate, distance)| *distance <= (candidate.len() / 3).max(1))
            .min_by_key(|(_, distance)| *distance)
            .map(|(candidate, _)| candidate.as_str())
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }

    previous[b.len()]
}
