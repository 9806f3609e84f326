//! SQL front-end
//!
//! Tokenizes with sqlparser's SQLite dialect and builds the positioned
//! [`tree`](crate::tree) with a small recursive-descent parser, since the
//! analyzer needs labels, trigger bodies and parameter spans that the
//! generic AST does not keep.

mod expressions;
mod statements;

use std::path::{Path, PathBuf};

use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use sqlsight_core::{Diagnostic, DiagnosticCode, Location, Severity};

use crate::tree::{line_col, Ident, NodeId, SourceId, Span, SqlFile};

/// SQL parser for the SQLite dialect
pub struct SqlParser {
    dialect: SQLiteDialect,
}

impl SqlParser {
    /// Create a new SQL parser
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }

    /// Parse SQL string into a positioned tree
    pub fn parse(&self, sql: &str, file_path: Option<&Path>) -> Result<SqlFile, ParseError> {
        let path = file_path.map(|p| p.to_path_buf());
        let fail = |message: String, span: Option<Span>| ParseError {
            sql: sql.to_string(),
            message,
            span,
            file_path: path.clone(),
        };

        let tokens = self.tokenize(sql).map_err(|message| fail(message, None))?;
        let source = SourceId::fresh();
        let mut parser = Parser::new(sql, tokens, source);

        let statements = parser
            .parse_statements()
            .map_err(|e| fail(e.message, Some(e.span)))?;

        tracing::trace!(statements = statements.len(), "parsed sql source");

        Ok(SqlFile {
            source,
            path,
            text: sql.to_string(),
            statements,
        })
    }

    /// Parse SQL from a file
    pub fn parse_file(&self, path: &Path) -> Result<SqlFile, ParseError> {
        let sql = std::fs::read_to_string(path).map_err(|e| ParseError {
            sql: String::new(),
            message: format!("Failed to read file: {}", e),
            span: None,
            file_path: Some(path.to_path_buf()),
        })?;

        self.parse(&sql, Some(path))
    }

    /// Parse SQL and return diagnostic on error
    pub fn parse_with_diagnostic(&self, sql: &str, file_path: Option<&Path>) -> Result<SqlFile, Diagnostic> {
        self.parse(sql, file_path).map_err(|e| e.to_diagnostic())
    }

    /// Significant tokens with byte spans, terminated by `Token::EOF`
    fn tokenize(&self, sql: &str) -> Result<Vec<Tok>, String> {
        let raw = Tokenizer::new(&self.dialect, sql)
            .tokenize_with_location()
            .map_err(|e| e.to_string())?;

        let lines = LineStarts::new(sql);
        let mut tokens: Vec<Tok> = raw
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
            .map(|t| {
                let start = lines.offset(sql, t.span.start.line, t.span.start.column);
                let end = lines.offset(sql, t.span.end.line, t.span.end.column);
                Tok {
                    token: t.token,
                    span: Span::new(start, end.max(start)),
                }
            })
            .collect();

        tokens.push(Tok {
            token: Token::EOF,
            span: Span::new(sql.len(), sql.len()),
        });
        Ok(tokens)
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offsets of line starts, for turning tokenizer (line, column)
/// locations into byte offsets
struct LineStarts(Vec<usize>);

impl LineStarts {
    fn new(sql: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self(starts)
    }

    fn offset(&self, sql: &str, line: u64, column: u64) -> usize {
        let line = (line.max(1) - 1) as usize;
        let Some(&start) = self.0.get(line) else {
            return sql.len();
        };
        let chars = (column.max(1) - 1) as usize;
        sql[start..]
            .char_indices()
            .nth(chars)
            .map(|(i, _)| start + i)
            .unwrap_or(sql.len())
    }
}

/// SQL parsing error with diagnostic information
#[derive(Debug, thiserror::Error)]
#[error("SQL parse error: {message}")]
pub struct ParseError {
    /// Original SQL string
    pub sql: String,

    /// What went wrong
    pub message: String,

    /// Offending span, if known
    pub span: Option<Span>,

    /// Source file path
    pub file_path: Option<PathBuf>,
}

impl ParseError {
    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let message = format!("Failed to parse SQL: {}", self.message);
        let file = self
            .file_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<input>".to_string());

        let location = match self.span {
            Some(span) => Location::with_range(file, line_col(&self.sql, span.start), line_col(&self.sql, span.end)),
            None => Location::new(file),
        };

        Diagnostic::new(DiagnosticCode::SqlParseError, Severity::Error, message).with_location(location)
    }
}

/// A significant token with its byte span
#[derive(Debug, Clone)]
pub(crate) struct Tok {
    pub(crate) token: Token,
    pub(crate) span: Span,
}

#[derive(Debug)]
pub(crate) struct SyntaxError {
    pub(crate) message: String,
    pub(crate) span: Span,
}

pub(crate) type PResult<T> = Result<T, SyntaxError>;

/// Words that end an expression or select clause; never taken as aliases
const RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "BETWEEN", "BY", "CASE", "CHECK", "COLLATE", "CONSTRAINT", "CREATE",
    "CROSS", "DEFAULT", "DELETE", "DISTINCT", "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS",
    "FOREIGN", "FROM", "FULL", "GLOB", "GROUP", "HAVING", "IN", "INDEXED", "INNER", "INSERT",
    "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "LEFT", "LIKE", "LIMIT", "MATCH", "NATURAL",
    "NOT", "NOTNULL", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES",
    "REGEXP", "RIGHT", "SELECT", "SET", "THEN", "UNION", "UNIQUE", "UPDATE", "USING", "VALUES",
    "WHEN", "WHERE", "WITH",
];

/// Token cursor shared by the statement and expression grammars
pub(crate) struct Parser<'s> {
    sql: &'s str,
    tokens: Vec<Tok>,
    pos: usize,
    source: SourceId,
    next_index: u32,
}

impl<'s> Parser<'s> {
    fn new(sql: &'s str, tokens: Vec<Tok>, source: SourceId) -> Self {
        Self {
            sql,
            tokens,
            pos: 0,
            source,
            next_index: 0,
        }
    }

    pub(crate) fn next_id(&mut self) -> NodeId {
        let id = NodeId {
            source: self.source,
            index: self.next_index,
        };
        self.next_index += 1;
        id
    }

    pub(crate) fn peek(&self) -> &Tok {
        self.peek_at(0)
    }

    pub(crate) fn peek_at(&self, n: usize) -> &Tok {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    pub(crate) fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    /// Start of the next token
    pub(crate) fn start(&self) -> usize {
        self.peek().span.start
    }

    /// End of the last consumed token
    pub(crate) fn prev_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    pub(crate) fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.prev_end().max(start))
    }

    pub(crate) fn text(&self, span: Span) -> &'s str {
        span.slice(self.sql)
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek().token, Token::EOF)
    }

    pub(crate) fn error<T>(&self, message: impl Into<String>) -> PResult<T> {
        Err(SyntaxError {
            message: message.into(),
            span: self.peek().span,
        })
    }

    pub(crate) fn unexpected<T>(&self, expected: &str) -> PResult<T> {
        let found = match &self.peek().token {
            Token::EOF => "end of input".to_string(),
            other => format!("'{}'", other),
        };
        self.error(format!("Expected {}, found {}", expected, found))
    }

    /// Whether token `n` ahead is the unquoted keyword `kw`
    pub(crate) fn is_keyword_at(&self, n: usize, kw: &str) -> bool {
        matches!(&self.peek_at(n).token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(kw))
    }

    pub(crate) fn is_keyword(&self, kw: &str) -> bool {
        self.is_keyword_at(0, kw)
    }

    pub(crate) fn is_any_keyword(&self, kws: &[&str]) -> bool {
        kws.iter().any(|kw| self.is_keyword(kw))
    }

    pub(crate) fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Eat a run of keywords only if all of them are next
    pub(crate) fn eat_keywords(&mut self, kws: &[&str]) -> bool {
        if kws.iter().enumerate().all(|(i, kw)| self.is_keyword_at(i, kw)) {
            for _ in kws {
                self.advance();
            }
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, kw: &str) -> PResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            self.unexpected(kw)
        }
    }

    pub(crate) fn is_token(&self, token: &Token) -> bool {
        &self.peek().token == token
    }

    pub(crate) fn eat_token(&mut self, token: &Token) -> bool {
        if self.is_token(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_token(&mut self, token: &Token) -> PResult<()> {
        if self.eat_token(token) {
            Ok(())
        } else {
            self.unexpected(&format!("'{}'", token))
        }
    }

    /// Whether the next token is a word that can start an identifier
    pub(crate) fn is_identifier(&self) -> bool {
        match &self.peek().token {
            Token::Word(w) => w.quote_style.is_some() || !is_reserved(&w.value),
            Token::DoubleQuotedString(_) => true,
            _ => false,
        }
    }

    /// A (possibly quoted) name
    pub(crate) fn parse_ident(&mut self) -> PResult<Ident> {
        let value = match &self.peek().token {
            Token::Word(w) => w.value.clone(),
            Token::DoubleQuotedString(s) => s.clone(),
            Token::SingleQuotedString(s) => s.clone(),
            _ => return self.unexpected("a name"),
        };
        let span = self.advance().span;
        Ok(Ident {
            value,
            span,
            id: self.next_id(),
        })
    }

    /// A name that is not a reserved word
    pub(crate) fn parse_name(&mut self) -> PResult<Ident> {
        if !self.is_identifier() {
            return self.unexpected("a name");
        }
        self.parse_ident()
    }

    /// `schema.name` or `name`; the schema is dropped
    pub(crate) fn parse_qualified_name(&mut self) -> PResult<Ident> {
        let name = self.parse_name()?;
        if self.is_token(&Token::Period) && matches!(self.peek_at(1).token, Token::Word(_)) {
            self.advance();
            return self.parse_ident();
        }
        Ok(name)
    }

    /// `( name, ... )`
    pub(crate) fn parse_name_list(&mut self) -> PResult<Vec<Ident>> {
        self.expect_token(&Token::LParen)?;
        let mut names = vec![self.parse_ident()?];
        while self.eat_token(&Token::Comma) {
            names.push(self.parse_ident()?);
        }
        self.expect_token(&Token::RParen)?;
        Ok(names)
    }

    /// Optional `[AS] alias`
    pub(crate) fn parse_optional_alias(&mut self) -> PResult<Option<Ident>> {
        if self.eat_keyword("AS") {
            return self.parse_ident().map(Some);
        }
        match &self.peek().token {
            Token::Word(w) if w.quote_style.is_some() || !is_reserved(&w.value) => self.parse_ident().map(Some),
            Token::DoubleQuotedString(_) | Token::SingleQuotedString(_) => self.parse_ident().map(Some),
            _ => Ok(None),
        }
    }
}

pub(crate) fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}
