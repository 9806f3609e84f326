//! Query result shapes
//!
//! A query's values are split into whole tables (every declared column of
//! one table, each exactly once, in any order) and individual columns.
//! Individual columns get unique accessor names.

use serde::{Deserialize, Serialize};
use sqlsight_core::OutputColumn;
use sqlsight_sql::value::table_values;
use sqlsight_sql::{SymbolTable, Value};

use crate::arguments::NameAllocator;

/// Every column of one declared table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableResult {
    /// Declared table name
    pub table: String,

    /// Name the query reads the table through (alias or view)
    pub read_as: Option<String>,

    /// Positions of the table's columns in the output, in declaration order
    pub positions: Vec<usize>,

    /// Whether the row can be missing entirely (outer joins)
    pub nullable: bool,
}

/// One output column that is not part of a whole table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnResult {
    pub position: usize,

    #[serde(flatten)]
    pub column: OutputColumn,
}

/// Shape of a query's output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResults {
    pub tables: Vec<TableResult>,
    pub columns: Vec<ColumnResult>,
}

impl QueryResults {
    /// Partition `values` against the tables declared in `symbols`
    pub fn new(values: &[Value], symbols: &SymbolTable) -> Self {
        let mut claimed = vec![false; values.len()];
        let mut tables = Vec::new();

        for table in symbols.tables() {
            let declared = table_values(table);
            if declared.is_empty() {
                continue;
            }

            let mut positions = Vec::with_capacity(declared.len());
            for column in &declared {
                let position = values
                    .iter()
                    .enumerate()
                    .position(|(i, value)| !claimed[i] && !positions.contains(&i) && value.is_same_column(column));
                match position {
                    Some(position) => positions.push(position),
                    None => break,
                }
            }
            if positions.len() != declared.len() {
                continue;
            }

            for &position in &positions {
                claimed[position] = true;
            }
            tables.push(TableResult {
                table: table.name.value.clone(),
                read_as: values[positions[0]]
                    .table_name
                    .clone()
                    .filter(|name| !name.eq_ignore_ascii_case(&table.name.value)),
                nullable: positions.iter().all(|&p| values[p].nullable)
                    && declared.iter().any(|column| !column.nullable),
                positions,
            });
        }
        tables.sort_by_key(|table| table.positions.iter().min().copied());

        let mut names = NameAllocator::default();
        let mut columns = Vec::new();
        for (position, value) in values.iter().enumerate() {
            if claimed[position] {
                continue;
            }
            let name = accessor_name(value, &mut names);
            columns.push(ColumnResult {
                position,
                column: OutputColumn::new(name, value.sqlite_type, value.nullable)
                    .with_adapter(value.adapter_type.clone()),
            });
        }

        Self { tables, columns }
    }

    /// The one whole table a query returns, if that is all it returns
    pub fn single_table(&self) -> Option<&TableResult> {
        match (self.tables.as_slice(), self.columns.is_empty()) {
            ([table], true) => Some(table),
            _ => None,
        }
    }

    /// Accessor names of the individual columns, in output order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column.name.as_str()).collect()
    }
}

/// First free of: the column name, `table_column`, then the column name
/// (or expression name) suffixed `_2`, `_3`, ...
fn accessor_name(value: &Value, names: &mut NameAllocator) -> String {
    let base = match (&value.column_name, &value.name_hint) {
        (Some(column), _) => column.clone(),
        (None, Some(hint)) => hint.clone(),
        (None, None) => "expr".to_string(),
    };

    if names.try_claim(&base) {
        return base;
    }
    if let (Some(table), Some(column)) = (&value.table_name, &value.column_name) {
        let qualified = format!("{}_{}", table, column);
        if names.try_claim(&qualified) {
            return qualified;
        }
    }
    names.allocate(&base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlsight_sql::tree::StmtKind;
    use sqlsight_sql::{Node, Resolver, SqlParser, Tag};

    fn results(sql: &str) -> QueryResults {
        let file = SqlParser::new().parse(sql, None).unwrap();
        let (symbols, _) = SymbolTable::build(&file, &Tag::new("test.sq"));
        let StmtKind::Select(select) = &file.statements.last().unwrap().kind else {
            panic!("last statement should be a select");
        };
        let response = Resolver::new(&symbols).resolve(Node::SelectStmt(select));
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        QueryResults::new(&response.values, &symbols)
    }

    const SCHEMA: &str = "CREATE TABLE t1 (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                          CREATE TABLE t2 (id INTEGER PRIMARY KEY, t1_id INTEGER);";

    #[test]
    fn whole_table_in_any_order() {
        let results = results(&format!("{} SELECT name, id FROM t1;", SCHEMA));
        assert_eq!(results.tables.len(), 1);
        assert_eq!(results.tables[0].positions, vec![1, 0]);
        assert!(results.single_table().is_some());
    }

    #[test]
    fn partial_tables_are_columns() {
        let results = results(&format!("{} SELECT t1.id, t2.id FROM t1 JOIN t2 ON t2.t1_id = t1.id;", SCHEMA));
        assert!(results.tables.is_empty());
        assert_eq!(results.column_names(), vec!["id", "t2_id"]);
    }

    #[test]
    fn duplicates_are_left_as_columns() {
        let results = results(&format!("{} SELECT *, id FROM t1;", SCHEMA));
        assert_eq!(results.tables.len(), 1);
        assert_eq!(results.tables[0].positions, vec![0, 1]);
        assert_eq!(results.column_names(), vec!["id"]);
    }

    #[test]
    fn expression_names_and_suffixes() {
        let results = results(&format!(
            "{} SELECT max(id), max(id), count(*), 1, 'a', id + 1 FROM t2;",
            SCHEMA
        ));
        assert_eq!(
            results.column_names(),
            vec!["max_id", "max_id_2", "count", "int_literal", "string_literal", "expr"]
        );
    }

    #[test]
    fn qualified_fallback_then_suffix() {
        let results = results(&format!(
            "{} SELECT t1.id, t2.id, t2.id AS id FROM t1 JOIN t2 ON t2.t1_id = t1.id;",
            SCHEMA
        ));
        assert_eq!(results.column_names(), vec!["id", "t2_id", "id_2"]);
    }

    #[test]
    fn aliased_table_is_still_whole() {
        let results = results(&format!("{} SELECT a.* FROM t1 AS a JOIN t2 ON t2.t1_id = a.id;", SCHEMA));
        assert_eq!(results.tables[0].table, "t1");
        assert_eq!(results.tables[0].read_as.as_deref(), Some("a"));
    }
}
