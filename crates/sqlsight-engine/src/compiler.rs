//! File-set compilation
//!
//! Validates every statement of every file against the merged symbol
//! table, maps resolution errors to diagnostics and compiles each labelled
//! statement into a [`CompiledQuery`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlsight_core::{Config, Diagnostic, DiagnosticCode, Location, Report, Severity};
use sqlsight_sql::tree::{NodeRef, SourceId, SqlFile, SqlStmt};
use sqlsight_sql::{Dependency, ResolutionError, Response, SymbolTable, SymbolTableError, Tag, Validator};

use crate::arguments::{rewrite_sql, to_sqlite_arguments, Argument};
use crate::query_results::QueryResults;
use crate::workspace::Workspace;

/// One source handed to the compiler
#[derive(Debug, Clone)]
pub struct Source {
    /// Identifies the source across compilations; usually its relative path
    pub tag: Tag,
    pub path: Option<PathBuf>,
    pub text: String,
}

impl Source {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: Tag::new(tag),
            path: None,
            text: text.into(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A labelled statement, ready for code generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// Statement label
    pub name: String,

    /// Source the statement is declared in
    pub tag: Tag,

    /// Statement kind (`select`, `insert`, ...)
    pub kind: String,

    /// 1-based line of the label
    pub line: usize,

    /// Statement text with parameters rewritten to `?N`
    pub sql: String,

    pub result: QueryResults,
    pub arguments: Vec<Argument>,

    /// Sources whose change invalidates this query
    pub dependencies: BTreeSet<Dependency>,

    /// Errors reported against the statement
    pub error_count: usize,
}

impl CompiledQuery {
    /// Whether a change to `tag` can change this query
    pub fn depends_on(&self, tag: &Tag) -> bool {
        &self.tag == tag
            || self.dependencies.contains(&Dependency::AnySource)
            || self.dependencies.contains(&Dependency::Source(tag.clone()))
    }
}

/// Per-file summary of a compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFile {
    pub tag: Tag,

    /// SHA-256 of the source text, hex encoded
    pub fingerprint: String,

    /// Statements parsed (zero if the file did not parse)
    pub statements: usize,

    /// Tables and views the file declares
    pub declarations: Vec<String>,
}

/// Result of compiling a set of files
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub files: Vec<CompiledFile>,
    pub queries: Vec<CompiledQuery>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    /// Queries a change to `tag` may affect
    pub fn affected_by(&self, tag: &Tag) -> Vec<&CompiledQuery> {
        self.queries.iter().filter(|query| query.depends_on(tag)).collect()
    }

    /// Look a compiled query up by label
    pub fn query(&self, name: &str) -> Option<&CompiledQuery> {
        self.queries.iter().find(|query| query.name == name)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Report over every diagnostic of the compilation
    pub fn to_report(&self) -> Report {
        Report::new(self.files.len(), self.queries.len(), self.diagnostics.clone())
    }

    /// Compiled queries as pretty JSON
    pub fn describe_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.queries)
    }
}

/// SHA-256 fingerprint of a source text
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Compiles sources into queries and diagnostics
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: Config,
}

/// Parsed files by source id, for placing diagnostics
pub(crate) type SourceMap<'w> = HashMap<SourceId, (&'w Tag, &'w SqlFile)>;

impl Compiler {
    /// Create a new compiler
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compile a complete set of sources from scratch
    pub fn compile(&self, sources: impl IntoIterator<Item = Source>) -> Compilation {
        let mut workspace = Workspace::new();
        for source in sources {
            workspace.upsert_file(source);
        }
        workspace.compile(self)
    }

    /// Validate one parsed file
    pub(crate) fn compile_file(
        &self,
        symbols: &SymbolTable,
        tag: &Tag,
        file: &SqlFile,
        sources: &SourceMap<'_>,
        compilation: &mut Compilation,
    ) {
        let validator = Validator::new(symbols);
        let mut labels: HashSet<String> = HashSet::new();
        let before = compilation.diagnostics.len();

        for stmt in &file.statements {
            let response = validator.validate(stmt);
            compilation
                .diagnostics
                .extend(response.errors.iter().map(|error| self.resolution_diagnostic(error, tag, sources)));

            let Some(label) = &stmt.label else {
                continue;
            };
            if !labels.insert(label.value.to_ascii_lowercase()) {
                compilation.diagnostics.push(self.diagnostic(
                    DiagnosticCode::DuplicateQueryName,
                    format!("Duplicate query name {}", label.value),
                    locate(tag, sources, label.node_ref()),
                ));
                continue;
            }

            compilation
                .queries
                .push(compile_query(symbols, tag, file, stmt, &label.value, response));
        }

        tracing::debug!(
            tag = %tag,
            statements = file.statements.len(),
            diagnostics = compilation.diagnostics.len() - before,
            "compiled file"
        );
    }

    /// Diagnostic for a declaration the symbol table rejected
    pub(crate) fn declaration_diagnostic(
        &self,
        error: &SymbolTableError,
        tag: &Tag,
        sources: &SourceMap<'_>,
    ) -> Diagnostic {
        self.diagnostic(
            DiagnosticCode::DuplicateDeclaration,
            error.to_string(),
            locate(tag, sources, error.origin()),
        )
    }

    fn resolution_diagnostic(&self, error: &ResolutionError, tag: &Tag, sources: &SourceMap<'_>) -> Diagnostic {
        self.diagnostic(error_code(error), error.message(), locate(tag, sources, error.origin()))
            .with_candidates(error.candidates().to_vec())
    }

    /// Build a diagnostic, applying configured severity overrides
    pub(crate) fn diagnostic(&self, code: DiagnosticCode, message: impl Into<String>, location: Location) -> Diagnostic {
        let severity = self.config.severity.get_severity(code, Severity::Error);
        Diagnostic::new(code, severity, message).with_location(location)
    }
}

fn compile_query(
    symbols: &SymbolTable,
    tag: &Tag,
    file: &SqlFile,
    stmt: &SqlStmt,
    name: &str,
    response: Response,
) -> CompiledQuery {
    let arguments = to_sqlite_arguments(response.arguments.iter().map(Argument::from_bind).collect());
    let sql = rewrite_sql(&file.text, stmt.span, &arguments);
    let line = stmt
        .label
        .as_ref()
        .map_or_else(|| file.line_col(stmt.span.start).0, |label| file.line_col(label.span.start).0);

    CompiledQuery {
        name: name.to_string(),
        tag: tag.clone(),
        kind: stmt.kind.kind_name().to_string(),
        line,
        sql,
        result: QueryResults::new(&response.values, symbols),
        arguments,
        dependencies: response.dependencies,
        error_count: response.errors.len(),
    }
}

/// Stable diagnostic code for each kind of resolution error
pub fn error_code(error: &ResolutionError) -> DiagnosticCode {
    match error {
        ResolutionError::ColumnNameNotFound { .. } => DiagnosticCode::ColumnNotFound,
        ResolutionError::ColumnOrTableNameNotFound { .. } => DiagnosticCode::ColumnOrTableNotFound,
        ResolutionError::ExpressionError { .. } => DiagnosticCode::ExpressionError,
        ResolutionError::CompoundError { .. } => DiagnosticCode::CompoundArityMismatch,
        ResolutionError::ValuesError { .. } => DiagnosticCode::ValuesArityMismatch,
        ResolutionError::RecursiveResolution { .. } => DiagnosticCode::RecursiveView,
        ResolutionError::CreateTableError { .. } => DiagnosticCode::CreateTableConstraint,
        ResolutionError::InsertError { .. } => DiagnosticCode::InsertColumnMismatch,
        ResolutionError::TableNameNotFound { .. } => DiagnosticCode::TableNotFound,
        ResolutionError::WithTableError { .. } => DiagnosticCode::WithTableError,
        ResolutionError::IncompleteRule { .. } => DiagnosticCode::IncompleteRule,
    }
}

/// Location of a node in whichever file it was parsed from
fn locate(tag: &Tag, sources: &SourceMap<'_>, node: NodeRef) -> Location {
    match sources.get(&node.id.source) {
        Some((owner, file)) => Location::with_range(
            owner.as_str(),
            file.line_col(node.span.start),
            file.line_col(node.span.end),
        ),
        None => Location::new(tag.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprints_are_sha256_hex() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(fingerprint("SELECT 1;"), fingerprint("SELECT 2;"));
    }

    #[test]
    fn diagnostics_are_placed_and_coded() {
        let compilation = Compiler::default().compile([Source::new(
            "queries.sq",
            "CREATE TABLE t (a INTEGER);\nbad: SELECT b FROM t;",
        )]);

        assert_eq!(compilation.diagnostics.len(), 1);
        let diagnostic = &compilation.diagnostics[0];
        assert_eq!(diagnostic.code, DiagnosticCode::ColumnOrTableNotFound);
        assert_eq!(diagnostic.candidates, vec!["a".to_string()]);

        let location = diagnostic.location.as_ref().unwrap();
        assert_eq!(location.file, "queries.sq");
        assert_eq!((location.line, location.column), (Some(2), Some(13)));
        assert_eq!(compilation.queries[0].error_count, 1);
    }

    #[test]
    fn severity_overrides_apply() {
        let mut config = Config::default();
        config.severity.set_override(DiagnosticCode::TableNotFound, Severity::Warn);

        let compilation = Compiler::new(config).compile([Source::new("q.sq", "q: SELECT * FROM later;")]);
        assert_eq!(compilation.diagnostics[0].severity, Severity::Warn);
        assert!(!compilation.has_errors());
    }

    #[test]
    fn duplicate_labels_are_reported() {
        let compilation = Compiler::default().compile([Source::new("q.sq", "q: SELECT 1;\nq: SELECT 2;")]);
        assert_eq!(compilation.queries.len(), 1);
        assert_eq!(compilation.diagnostics[0].code, DiagnosticCode::DuplicateQueryName);
    }
}
