//! Semantic resolver
//!
//! Resolves any node of the tree to the ordered values it exposes, collecting
//! errors, dependencies and bind parameters on the way. Resolution never
//! fails outright: every problem becomes a [`ResolutionError`] in the
//! [`Response`] and resolution carries on as far as it can.
//!
//! A [`Resolver`] is an immutable snapshot. Entering a WITH clause, a FROM
//! scope or a view body derives a new resolver, so nothing leaks between
//! sibling resolutions and one symbol table can be shared across threads.
//! Every resolver derived from the same root shares one cache of resolved
//! view bodies, so a view referenced many times is resolved once.

mod expressions;
mod response;
mod select;

pub use response::{column_names, ArgumentKind, BindArgument, ResolutionError, Response};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::symbol_table::{Declaration, Dependency, SymbolTable};
use crate::tree::*;
use crate::value::{table_values, Value};

/// A node the resolver can evaluate
#[derive(Debug, Clone, Copy)]
pub enum Node<'n> {
    TableOrSubquery(&'n TableOrSubquery),
    JoinClause(&'n JoinClause),
    SelectStmt(&'n SelectStmt),
    /// One SELECT or VALUES branch
    SelectCore(&'n SelectCore),
    Values(&'n ValuesClause),
    /// Resolved against the innermost scope
    ResultColumn(&'n ResultColumn),
    Expr(&'n Expr),
    CreateTable(&'n CreateTable),
    /// A table, view or common table reference
    TableName(&'n Ident),
}

#[derive(Debug, Clone)]
struct CommonTableEntry {
    name: String,
    values: Vec<Value>,
}

/// A view body resolved without any recursion
#[derive(Debug, Clone)]
struct ResolvedView {
    values: Vec<Value>,
    dependencies: BTreeSet<Dependency>,
}

/// Resolver over one symbol table snapshot
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    symbols: &'a SymbolTable,

    /// Common tables in scope, innermost last
    common_tables: Vec<CommonTableEntry>,

    /// Views whose bodies are being resolved, outermost first
    resolving: Vec<String>,

    /// Visible values, innermost scope last
    scopes: Vec<Vec<Value>>,

    /// Resolved view bodies keyed by lowercase view name
    views: Arc<RwLock<HashMap<String, ResolvedView>>>,
}

impl<'a> Resolver<'a> {
    /// Create a new resolver with nothing in scope
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            common_tables: Vec::new(),
            resolving: Vec::new(),
            scopes: Vec::new(),
            views: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn symbols(&self) -> &'a SymbolTable {
        self.symbols
    }

    /// Derive a resolver that also sees `values`, ahead of everything
    /// already in scope
    pub fn with_scope(&self, values: Vec<Value>) -> Self {
        let mut resolver = self.clone();
        resolver.scopes.push(values);
        resolver
    }

    /// Derive a resolver for the body of view `name`; references back to it
    /// are recursion errors
    pub fn resolving_view(&self, name: &str) -> Self {
        let mut resolver = self.clone();
        resolver.resolving.push(name.to_string());
        resolver
    }

    /// Values of the innermost scope
    pub fn innermost(&self) -> &[Value] {
        self.scopes.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every value in scope, innermost first
    pub fn visible_values(&self) -> Vec<Value> {
        self.scopes.iter().rev().flatten().cloned().collect()
    }

    /// Resolve a node to the values it exposes
    pub fn resolve(&self, node: Node<'_>) -> Response {
        match node {
            Node::TableOrSubquery(table) => self.resolve_table_or_subquery(table),
            Node::JoinClause(join) => self.resolve_join_clause(join),
            Node::SelectStmt(select) => self.resolve_select_stmt(select),
            Node::SelectCore(core) => self.resolve_core(core, None).0,
            Node::Values(values) => self.resolve_values(values, None),
            Node::ResultColumn(column) => self.resolve_result_column(column, None),
            Node::Expr(expr) => self.resolve_expr(expr),
            Node::CreateTable(table) => Response::new(table_values(table)),
            Node::TableName(name) => self.resolve_table_name(name),
        }
    }

    /// Derive a resolver that sees the common tables of `with`, folded left
    /// to right so each may use the ones before it
    pub fn with_common_tables(&self, with: &WithClause) -> (Resolver<'a>, Response) {
        let mut resolver = self.clone();
        let mut response = Response::default();
        let mut declared: Vec<&Ident> = Vec::new();

        for cte in &with.tables {
            if declared.iter().any(|name| name.matches(&cte.name.value)) {
                response.push_error(ResolutionError::WithTableError {
                    origin: cte.name.node_ref(),
                    message: format!("Common table {} is already defined", cte.name.value),
                });
                continue;
            }
            declared.push(&cte.name);

            let body = if with.recursive && !cte.select.compounds.is_empty() {
                // The first branch seeds the table the recursive branches read
                let (seed, _) = resolver.resolve_core(&cte.select.first, None);
                let seed_values = rename_common_table(cte, seed.values, &mut Response::default());
                let mut recursive = resolver.clone();
                recursive.common_tables.push(CommonTableEntry {
                    name: cte.name.value.clone(),
                    values: seed_values,
                });
                recursive.resolve_select_stmt(&cte.select)
            } else {
                resolver.resolve_select_stmt(&cte.select)
            };

            let values = response.absorb(body);
            let values = rename_common_table(cte, values, &mut response);
            resolver.common_tables.push(CommonTableEntry {
                name: cte.name.value.clone(),
                values,
            });
        }

        (resolver, response)
    }

    /// Look a name up as a common table, then a view or table
    pub(crate) fn resolve_table_name(&self, name: &Ident) -> Response {
        if let Some(entry) = self.common_tables.iter().rev().find(|entry| name.matches(&entry.name)) {
            return Response::new(entry.values.clone());
        }

        match self.symbols.lookup(&name.value) {
            Some((tag, Declaration::Table(table))) => {
                let mut response = Response::new(table_values(table));
                response.dependencies.insert(Dependency::Source(tag.clone()));
                response
            }
            Some((tag, Declaration::View(view))) => {
                let mut response = self.resolve_view(name, view);
                response.dependencies.insert(Dependency::Source(tag.clone()));
                response
            }
            None => {
                let mut available: Vec<String> = self.common_tables.iter().map(|entry| entry.name.clone()).collect();
                available.extend(self.symbols.names());

                let mut response = Response::error(ResolutionError::TableNameNotFound {
                    origin: name.node_ref(),
                    message: format!("No table found with name {}", name.value),
                    available_table_names: available,
                });
                // The name may be declared by a source not compiled yet
                response.dependencies.insert(Dependency::AnySource);
                response
            }
        }
    }

    fn resolve_view(&self, reference: &Ident, view: &CreateView) -> Response {
        let name = &view.name.value;
        if self.resolving.iter().any(|resolving| resolving.eq_ignore_ascii_case(name)) {
            let chain: Vec<&str> = self
                .resolving
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(name.as_str()))
                .collect();
            return Response::error(ResolutionError::RecursiveResolution {
                origin: reference.node_ref(),
                message: format!("Recursive subquery found: {}", chain.join(" -> ")),
            });
        }

        let key = name.to_ascii_lowercase();
        if let Ok(views) = self.views.read() {
            if let Some(resolved) = views.get(&key) {
                let mut response = Response::new(resolved.values.clone());
                response.dependencies.extend(resolved.dependencies.iter().cloned());
                return response;
            }
        }

        tracing::trace!(view = %name, depth = self.resolving.len(), "resolving view body");

        // A view body sees neither the referencing query's scope nor its
        // common tables
        let mut body_resolver = self.clone();
        body_resolver.common_tables.clear();
        body_resolver.scopes.clear();
        body_resolver.resolving.push(name.clone());
        let body = body_resolver.resolve_select_stmt(&view.select);

        let mut response = Response::default();
        response.dependencies.extend(body.dependencies);
        for error in body.errors {
            // Body errors belong to the view; only cycles surface here
            if let ResolutionError::RecursiveResolution { message, .. } = error {
                let error = ResolutionError::RecursiveResolution {
                    origin: reference.node_ref(),
                    message,
                };
                if !response.errors.contains(&error) {
                    response.push_error(error);
                }
            }
        }

        response.values = view_values(view, body.values);

        // Cycle messages depend on the chain being resolved
        if !response.has_errors() {
            if let Ok(mut views) = self.views.write() {
                views.insert(
                    key,
                    ResolvedView {
                        values: response.values.clone(),
                        dependencies: response.dependencies.clone(),
                    },
                );
            }
        }
        response
    }
}

/// A view's body values as seen through the view
pub(crate) fn view_values(view: &CreateView, values: Vec<Value>) -> Vec<Value> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let value = value.with_table_name(view.name.value.clone());
            match view.columns.get(index) {
                Some(column) => value.with_column_name(column.value.clone()),
                None => value,
            }
        })
        .collect()
}

/// Name a common table's values after it, applying its column list
fn rename_common_table(cte: &CommonTable, values: Vec<Value>, response: &mut Response) -> Vec<Value> {
    let name = &cte.name.value;
    let values: Vec<Value> = values.into_iter().map(|v| v.with_table_name(name.clone())).collect();
    if cte.columns.is_empty() {
        return values;
    }

    for column in cte.columns.iter().skip(values.len()) {
        response.push_error(ResolutionError::WithTableError {
            origin: column.node_ref(),
            message: format!("No column found in {} for declared column {}", name, column.value),
        });
    }
    if values.len() > cte.columns.len() {
        response.push_error(ResolutionError::WithTableError {
            origin: cte.name.node_ref(),
            message: format!(
                "Table {} has {} values for {} columns",
                name,
                values.len(),
                cte.columns.len()
            ),
        });
    }

    values
        .into_iter()
        .zip(&cte.columns)
        .map(|(value, column)| value.with_column_name(column.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParser;
    use crate::symbol_table::Tag;
    use sqlsight_core::SqliteType;

    fn symbols(sql: &str) -> (SqlFile, SymbolTable) {
        let file = SqlParser::new().parse(sql, None).unwrap();
        let (table, errors) = SymbolTable::build(&file, &Tag::new("test.sq"));
        assert!(errors.is_empty(), "{:?}", errors);
        (file, table)
    }

    fn resolve_last(sql: &str) -> Response {
        let (file, table) = symbols(sql);
        let resolver = Resolver::new(&table);
        match &file.statements.last().unwrap().kind {
            StmtKind::Select(select) => resolver.resolve(Node::SelectStmt(select)),
            _ => panic!("last statement should be a select"),
        }
    }

    fn shape(response: &Response) -> Vec<(Option<String>, Option<String>, SqliteType, bool)> {
        response
            .values
            .iter()
            .map(|v| (v.table_name.clone(), v.column_name.clone(), v.sqlite_type, v.nullable))
            .collect()
    }

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn star_expands_declared_columns() {
        let response = resolve_last("CREATE TABLE data (id INTEGER PRIMARY KEY, value TEXT); SELECT * FROM data;");
        assert!(response.errors.is_empty());
        assert_eq!(
            shape(&response),
            vec![
                (some("data"), some("id"), SqliteType::Integer, false),
                (some("data"), some("value"), SqliteType::Text, true),
            ]
        );
        assert!(response.dependencies.contains(&Dependency::Source(Tag::new("test.sq"))));
    }

    #[test]
    fn common_tables_fold_left_to_right() {
        let response = resolve_last(
            "CREATE TABLE t (x INTEGER NOT NULL);
             WITH a AS (SELECT x FROM t), b (y) AS (SELECT x FROM a) SELECT * FROM b;",
        );
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(shape(&response), vec![(some("b"), some("y"), SqliteType::Integer, false)]);
    }

    #[test]
    fn later_common_table_is_not_visible_earlier() {
        let response = resolve_last(
            "CREATE TABLE t (x INTEGER);
             WITH a AS (SELECT * FROM b), b AS (SELECT x FROM t) SELECT * FROM a;",
        );
        assert!(matches!(response.errors[0], ResolutionError::TableNameNotFound { .. }));
        assert!(response.dependencies.contains(&Dependency::AnySource));
    }

    #[test]
    fn common_table_column_list_mismatch() {
        let response = resolve_last("CREATE TABLE t (x INTEGER); WITH a (p, q) AS (SELECT x FROM t) SELECT * FROM a;");
        assert_eq!(response.errors.len(), 1);
        assert!(matches!(response.errors[0], ResolutionError::WithTableError { .. }));
        assert_eq!(shape(&response), vec![(some("a"), some("p"), SqliteType::Integer, true)]);
    }

    #[test]
    fn recursive_common_table_terminates() {
        let response = resolve_last(
            "WITH RECURSIVE counter (n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM counter LIMIT 10)
             SELECT n FROM counter;",
        );
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(response.values.len(), 1);
        assert_eq!(response.values[0].column_name.as_deref(), Some("n"));
    }

    #[test]
    fn views_are_opaque_tables() {
        let response = resolve_last(
            "CREATE TABLE t (x INTEGER, y TEXT);
             CREATE VIEW v (a, b) AS SELECT x, y FROM t;
             SELECT * FROM v;",
        );
        assert!(response.errors.is_empty());
        assert_eq!(
            shape(&response),
            vec![
                (some("v"), some("a"), SqliteType::Integer, true),
                (some("v"), some("b"), SqliteType::Text, true),
            ]
        );
    }

    #[test]
    fn recursive_views_report_and_terminate() {
        let response = resolve_last(
            "CREATE VIEW a AS SELECT * FROM b;
             CREATE VIEW b AS SELECT * FROM c;
             CREATE VIEW c AS SELECT * FROM a;
             SELECT * FROM a;",
        );
        assert_eq!(response.errors.len(), 1);
        let ResolutionError::RecursiveResolution { message, .. } = &response.errors[0] else {
            panic!("expected a recursion error, got {:?}", response.errors);
        };
        assert_eq!(message, "Recursive subquery found: a -> b -> c -> a");
    }

    #[test]
    fn deep_view_chain_resolves_each_view_once() {
        let mut sql = String::from("CREATE TABLE v0 (x INTEGER NOT NULL);\n");
        for level in 1..=30 {
            let below = level - 1;
            sql.push_str(&format!(
                "CREATE VIEW v{level} AS SELECT a.x FROM v{below} a JOIN v{below} b ON a.x = b.x;\n"
            ));
        }
        sql.push_str("SELECT * FROM v30;");

        let (file, table) = symbols(&sql);
        let resolver = Resolver::new(&table);
        let StmtKind::Select(select) = &file.statements.last().unwrap().kind else {
            panic!("last statement should be a select");
        };
        let response = resolver.resolve(Node::SelectStmt(select));

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(shape(&response), vec![(some("v30"), some("x"), SqliteType::Integer, false)]);
        assert_eq!(resolver.views.read().unwrap().len(), 30);
    }

    #[test]
    fn cached_view_does_not_hide_a_cycle() {
        let response = resolve_last(
            "CREATE TABLE t (x INTEGER);
             CREATE VIEW shared AS SELECT x FROM t;
             CREATE VIEW a AS SELECT s.x FROM shared s JOIN b ON s.x = b.x;
             CREATE VIEW b AS SELECT s.x FROM shared s JOIN a ON s.x = a.x;
             SELECT * FROM shared JOIN a ON shared.x = a.x;",
        );
        assert_eq!(response.errors.len(), 1, "{:?}", response.errors);
        let ResolutionError::RecursiveResolution { message, .. } = &response.errors[0] else {
            panic!("expected a recursion error, got {:?}", response.errors);
        };
        assert_eq!(message, "Recursive subquery found: a -> b -> a");
    }

    #[test]
    fn missing_table_lists_candidates() {
        let response = resolve_last("CREATE TABLE players (x INTEGER); SELECT * FROM player;");
        let error = &response.errors[0];
        assert_eq!(error.message(), "No table found with name player");
        assert_eq!(error.candidates().to_vec(), vec!["players".to_string()]);
    }
}
