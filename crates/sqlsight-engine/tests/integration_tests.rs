//! End-to-end compilation tests

use pretty_assertions::assert_eq;
use sqlsight_core::{DiagnosticCode, SqliteType};
use sqlsight_engine::{Compiler, Source, Workspace};
use sqlsight_sql::{ArgumentKind, Tag};

fn compile(sources: &[(&str, &str)]) -> sqlsight_engine::Compilation {
    Compiler::default().compile(sources.iter().map(|(tag, text)| Source::new(*tag, *text)))
}

#[test]
fn test_select_for_id() {
    let compilation = compile(&[(
        "data.sq",
        "CREATE TABLE data (id INTEGER PRIMARY KEY, value TEXT);\n\
         selectForId: SELECT * FROM data WHERE id = ?;",
    )]);

    assert!(compilation.diagnostics.is_empty(), "{:?}", compilation.diagnostics);
    let query = compilation.query("selectForId").expect("query should compile");

    assert_eq!(query.kind, "select");
    assert_eq!(query.line, 2);
    assert_eq!(query.sql, "SELECT * FROM data WHERE id = ?1");

    assert_eq!(query.arguments.len(), 1);
    let argument = &query.arguments[0];
    assert_eq!(argument.name.as_deref(), Some("id"));
    assert_eq!(argument.index, Some(1));
    assert_eq!(argument.sqlite_type, SqliteType::Integer);
    assert!(!argument.nullable);

    let table = query.result.single_table().expect("the whole table is returned");
    assert_eq!(table.table, "data");
    assert_eq!(table.positions, vec![0, 1]);
}

#[test]
fn test_in_bind_through_view() {
    let compilation = compile(&[(
        "view.sq",
        "CREATE TABLE a (x INTEGER);\n\
         CREATE VIEW b AS SELECT x FROM a;\n\
         selectIn: SELECT * FROM b WHERE x IN ?;",
    )]);

    assert!(compilation.diagnostics.is_empty(), "{:?}", compilation.diagnostics);
    let query = compilation.query("selectIn").unwrap();
    assert_eq!(query.arguments.len(), 1);
    assert_eq!(query.arguments[0].kind, ArgumentKind::SetOfValues);
    assert_eq!(query.arguments[0].name.as_deref(), Some("x"));
}

#[test]
fn test_named_parameter_used_twice() {
    let compilation = compile(&[(
        "people.sq",
        "CREATE TABLE person (first TEXT NOT NULL, last TEXT NOT NULL);\n\
         byName: SELECT * FROM person WHERE first = :name OR last = :name;",
    )]);

    let query = compilation.query("byName").unwrap();
    assert_eq!(query.arguments.len(), 1);
    assert_eq!(query.arguments[0].name.as_deref(), Some("name"));
    assert_eq!(query.arguments[0].ranges.len(), 2);
    assert_eq!(query.arguments[0].sqlite_type, SqliteType::Text);
    assert_eq!(query.sql, "SELECT * FROM person WHERE first = ?1 OR last = ?1");
}

#[test]
fn test_join_accessor_names() {
    let compilation = compile(&[(
        "join.sq",
        "CREATE TABLE t1 (id INTEGER PRIMARY KEY, label TEXT);\n\
         CREATE TABLE t2 (id INTEGER PRIMARY KEY, t1_id INTEGER NOT NULL);\n\
         pairs: SELECT t1.id, t2.id FROM t1 LEFT JOIN t2 ON t2.t1_id = t1.id;",
    )]);

    let query = compilation.query("pairs").unwrap();
    assert!(query.result.tables.is_empty());
    assert_eq!(query.result.column_names(), vec!["id", "t2_id"]);
    assert!(!query.result.columns[0].column.nullable);
    assert!(query.result.columns[1].column.nullable);
}

#[test]
fn test_insert_arguments_take_column_types() {
    let compilation = compile(&[(
        "insert.sq",
        "CREATE TABLE item (id INTEGER PRIMARY KEY, label TEXT NOT NULL, weight REAL);\n\
         insertItem: INSERT INTO item (label, weight) VALUES (?, ?);",
    )]);

    assert!(compilation.diagnostics.is_empty(), "{:?}", compilation.diagnostics);
    let query = compilation.query("insertItem").unwrap();
    assert_eq!(query.kind, "insert");
    let arguments: Vec<_> = query
        .arguments
        .iter()
        .map(|a| (a.name.clone().unwrap(), a.sqlite_type, a.nullable))
        .collect();
    assert_eq!(
        arguments,
        vec![
            ("label".to_string(), SqliteType::Text, false),
            ("weight".to_string(), SqliteType::Real, true),
        ]
    );
    assert!(query.result.columns.is_empty());
}

#[test]
fn test_dependencies_across_files() {
    let compilation = compile(&[
        ("tables.sq", "CREATE TABLE a (x INTEGER);"),
        ("views.sq", "CREATE VIEW b AS SELECT x FROM a;"),
        ("queries.sq", "fromView: SELECT * FROM b;\nfromTable: SELECT x FROM a;"),
        ("other.sq", "CREATE TABLE unrelated (y TEXT);"),
    ]);

    assert!(compilation.diagnostics.is_empty(), "{:?}", compilation.diagnostics);

    let affected = |tag: &str| -> Vec<String> {
        compilation
            .affected_by(&Tag::new(tag))
            .into_iter()
            .map(|q| q.name.clone())
            .collect()
    };
    assert_eq!(affected("tables.sq"), vec!["fromView", "fromTable"]);
    assert_eq!(affected("views.sq"), vec!["fromView"]);
    assert_eq!(affected("queries.sq"), vec!["fromView", "fromTable"]);
    assert!(affected("other.sq").is_empty());
}

#[test]
fn test_missing_table_depends_on_every_source() {
    let compilation = compile(&[("queries.sq", "early: SELECT * FROM later;")]);
    let query = compilation.query("early").unwrap();
    assert_eq!(query.error_count, 1);
    assert!(query.depends_on(&Tag::new("anything.sq")));
    assert_eq!(compilation.diagnostics[0].code, DiagnosticCode::TableNotFound);
}

#[test]
fn test_workspace_recompiles_after_a_change() {
    let compiler = Compiler::default();
    let mut workspace = Workspace::new();
    workspace.upsert_file(Source::new("schema.sq", "CREATE TABLE a (x INTEGER);"));
    workspace.upsert_file(Source::new("queries.sq", "q: SELECT y FROM a;"));

    let before = workspace.compile(&compiler);
    assert_eq!(before.diagnostics.len(), 1);
    assert_eq!(before.diagnostics[0].code, DiagnosticCode::ColumnOrTableNotFound);

    workspace.upsert_file(Source::new("schema.sq", "CREATE TABLE a (x INTEGER, y TEXT);"));
    let after = workspace.compile(&compiler);
    assert!(after.diagnostics.is_empty(), "{:?}", after.diagnostics);
    assert_eq!(after.query("q").unwrap().result.column_names(), vec!["y"]);
}

#[test]
fn test_report_counts() {
    let compilation = compile(&[
        ("schema.sq", "CREATE TABLE a (x INTEGER);"),
        ("queries.sq", "good: SELECT x FROM a;\nbad: SELECT nope FROM a;"),
    ]);

    let report = compilation.to_report();
    assert_eq!(report.summary.files_checked, 2);
    assert_eq!(report.summary.queries_compiled, 2);
    assert_eq!(report.summary.errors, 1);
    assert!(compilation.has_errors());

    let described = compilation.describe_json().unwrap();
    assert!(described.contains("\"good\""));
    assert!(described.contains("\"bad\""));
}
