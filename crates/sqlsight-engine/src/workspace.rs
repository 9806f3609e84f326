//! Incremental workspace
//!
//! Holds parsed sources by tag together with the merged symbol table.
//! Changing one source evicts and re-merges only that source's
//! declarations; the other sources are neither re-parsed nor rebuilt.

use std::collections::BTreeMap;
use std::path::PathBuf;

use sqlsight_core::DiagnosticCode;
use sqlsight_sql::tree::SqlFile;
use sqlsight_sql::{ParseError, SqlParser, SymbolTable, SymbolTableError, Tag};

use crate::compiler::{fingerprint, Compilation, CompiledFile, Compiler, Source, SourceMap};

#[derive(Debug)]
struct WorkspaceFile {
    path: Option<PathBuf>,
    fingerprint: String,
    parsed: Result<SqlFile, ParseError>,

    /// Declarations the symbol table refused for this file
    rejected: Vec<SymbolTableError>,
}

/// Sources and their merged declarations
#[derive(Debug, Default)]
pub struct Workspace {
    files: BTreeMap<Tag, WorkspaceFile>,
    symbols: SymbolTable,
}

impl Workspace {
    /// Create an empty workspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Current merged symbol table
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Add or replace a source
    ///
    /// Returns `false` if the source is already present with the same text.
    pub fn upsert_file(&mut self, source: Source) -> bool {
        let fingerprint = fingerprint(&source.text);
        if self
            .files
            .get(&source.tag)
            .is_some_and(|file| file.fingerprint == fingerprint)
        {
            tracing::trace!(tag = %source.tag, "source unchanged");
            return false;
        }

        let parsed = SqlParser::new().parse(&source.text, source.path.as_deref());
        if let Err(error) = &parsed {
            tracing::debug!(tag = %source.tag, error = %error, "source failed to parse");
        }

        self.files.insert(
            source.tag.clone(),
            WorkspaceFile {
                path: source.path,
                fingerprint,
                parsed,
                rejected: Vec::new(),
            },
        );
        self.merge(&source.tag);

        // Sources that lost a name clash may now be able to declare it
        self.remerge_rejected(Some(&source.tag));
        true
    }

    /// Remove a source and its declarations
    pub fn remove_file(&mut self, tag: &Tag) -> bool {
        if self.files.remove(tag).is_none() {
            return false;
        }
        self.symbols = self.symbols.evict(tag);
        tracing::debug!(tag = %tag, "removed source");

        self.remerge_rejected(None);
        true
    }

    /// Merge one file's declarations under its tag, dropping any name
    /// another tag already owns
    fn merge(&mut self, tag: &Tag) {
        let Some(file) = self.files.get_mut(tag) else {
            return;
        };
        let mut symbols = self.symbols.evict(tag);
        file.rejected.clear();

        if let Ok(parsed) = &file.parsed {
            let (mut declared, errors) = SymbolTable::build(parsed, tag);
            file.rejected.extend(errors);

            loop {
                match symbols.merge(&declared, tag) {
                    Ok(merged) => {
                        symbols = merged;
                        break;
                    }
                    Err(error) => {
                        declared = declared.without(error.name());
                        file.rejected.push(error);
                    }
                }
            }
        }

        self.symbols = symbols;
    }

    fn remerge_rejected(&mut self, except: Option<&Tag>) {
        let retry: Vec<Tag> = self
            .files
            .iter()
            .filter(|(tag, file)| Some(*tag) != except && lost_clash(tag, &file.rejected))
            .map(|(tag, _)| tag.clone())
            .collect();
        for tag in retry {
            tracing::trace!(tag = %tag, "re-merging after a name clash");
            self.merge(&tag);
        }
    }

    /// Validate every source against the current symbol table
    pub fn compile(&self, compiler: &Compiler) -> Compilation {
        let mut compilation = Compilation::default();

        let sources: SourceMap<'_> = self
            .files
            .iter()
            .filter_map(|(tag, file)| file.parsed.as_ref().ok().map(|parsed| (parsed.source, (tag, parsed))))
            .collect();

        for (tag, file) in &self.files {
            let statements = match &file.parsed {
                Ok(parsed) => {
                    compilation.diagnostics.extend(
                        file.rejected
                            .iter()
                            .map(|error| compiler.declaration_diagnostic(error, tag, &sources)),
                    );
                    compiler.compile_file(&self.symbols, tag, parsed, &sources, &mut compilation);
                    parsed.statements.len()
                }
                Err(error) => {
                    let mut diagnostic = error.to_diagnostic();
                    if let Some(location) = diagnostic.location.as_mut() {
                        location.file = tag.to_string();
                    }
                    diagnostic.severity = compiler
                        .config()
                        .severity
                        .get_severity(DiagnosticCode::SqlParseError, diagnostic.severity);
                    compilation.diagnostics.push(diagnostic);
                    0
                }
            };

            compilation.files.push(CompiledFile {
                tag: tag.clone(),
                fingerprint: file.fingerprint.clone(),
                statements,
                declarations: self.symbols.names_for(tag),
            });
        }

        tracing::info!(
            files = compilation.files.len(),
            queries = compilation.queries.len(),
            diagnostics = compilation.diagnostics.len(),
            "compilation finished"
        );
        compilation
    }

    /// Path a source was read from, if any
    pub fn path(&self, tag: &Tag) -> Option<&PathBuf> {
        self.files.get(tag).and_then(|file| file.path.as_ref())
    }
}

/// Whether another source owns a name this one declares
fn lost_clash(tag: &Tag, rejected: &[SymbolTableError]) -> bool {
    rejected
        .iter()
        .any(|error| matches!(error, SymbolTableError::DuplicateDeclaration { existing, .. } if existing != tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(tag: &str, text: &str) -> Source {
        Source::new(tag, text)
    }

    #[test]
    fn upsert_replaces_declarations_of_the_same_tag() {
        let mut workspace = Workspace::new();
        workspace.upsert_file(source("a.sq", "CREATE TABLE one (x INTEGER);"));
        workspace.upsert_file(source("a.sq", "CREATE TABLE two (x INTEGER);"));

        assert_eq!(workspace.symbols().names(), vec!["two"]);
        assert_eq!(workspace.len(), 1);
    }

    #[test]
    fn unchanged_source_is_skipped() {
        let mut workspace = Workspace::new();
        assert!(workspace.upsert_file(source("a.sq", "CREATE TABLE one (x INTEGER);")));
        assert!(!workspace.upsert_file(source("a.sq", "CREATE TABLE one (x INTEGER);")));
    }

    #[test]
    fn clash_is_reported_then_recovers_on_removal() {
        let mut workspace = Workspace::new();
        workspace.upsert_file(source("a.sq", "CREATE TABLE shared (x INTEGER);"));
        workspace.upsert_file(source("b.sq", "CREATE TABLE shared (y TEXT); CREATE TABLE own (z TEXT);"));

        let compilation = workspace.compile(&Compiler::default());
        let codes: Vec<_> = compilation.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::DuplicateDeclaration]);
        assert_eq!(workspace.symbols().names_for(&Tag::new("b.sq")), vec!["own"]);

        workspace.remove_file(&Tag::new("a.sq"));
        let mut names = workspace.symbols().names_for(&Tag::new("b.sq"));
        names.sort();
        assert_eq!(names, vec!["own", "shared"]);
    }

    #[test]
    fn parse_failures_become_diagnostics() {
        let mut workspace = Workspace::new();
        workspace.upsert_file(source("broken.sq", "SELECT FROM WHERE;"));
        workspace.upsert_file(source("fine.sq", "q: SELECT 1;"));

        let compilation = workspace.compile(&Compiler::default());
        assert_eq!(compilation.diagnostics.len(), 1);
        assert_eq!(compilation.diagnostics[0].code, DiagnosticCode::SqlParseError);
        assert_eq!(compilation.diagnostics[0].location.as_ref().unwrap().file, "broken.sq");
        assert_eq!(compilation.files[0].statements, 0);
        assert_eq!(compilation.queries.len(), 1);
    }
}
