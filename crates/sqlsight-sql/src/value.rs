//! Resolved values
//!
//! A [`Value`] describes one column a statement exposes: where it came from,
//! its storage class and whether it can be NULL.

use sqlsight_core::SqliteType;

use crate::tree::*;

/// A single resolved column or scalar expression result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// Table (or alias, or view) the value is read through
    pub table_name: Option<String>,

    /// Column name as visible to the query
    pub column_name: Option<String>,

    /// Storage class
    pub sqlite_type: SqliteType,

    /// Whether the value may be NULL
    pub nullable: bool,

    /// Node this value originates from; declared columns use their name node
    pub element: NodeRef,

    /// Target type declared with `AS` on the column
    pub adapter_type: Option<String>,

    /// Table that declares the column, for adapter lookups
    pub foreign_table: Option<String>,

    /// Name derived from the expression shape, for expressions without a column name
    pub name_hint: Option<String>,

    /// Right-hand side of a USING join: reachable as `table.column` only
    pub qualified_only: bool,
}

impl Value {
    /// Value of a declared column
    pub fn column(table: &CreateTable, column: &ColumnDef) -> Self {
        let in_table_primary_key = table.constraints.iter().any(|constraint| match &constraint.kind {
            TableConstraintKind::PrimaryKey(columns) => columns.iter().any(|c| c.name.matches(&column.name.value)),
            _ => false,
        });
        let type_name = column.type_name.as_ref();

        Self {
            table_name: Some(table.name.value.clone()),
            column_name: Some(column.name.value.clone()),
            sqlite_type: SqliteType::from_type_name(type_name.map(|t| t.name.as_str())),
            nullable: !(column.is_not_null() || column.is_primary_key() || in_table_primary_key),
            element: column.name.node_ref(),
            adapter_type: type_name.and_then(|t| t.adapter.clone()),
            foreign_table: Some(table.name.value.clone()),
            name_hint: None,
            qualified_only: false,
        }
    }

    /// Anonymous value of an expression that is not a plain column reference
    ///
    /// Expressions are not type checked: they resolve to a non-null INTEGER.
    pub fn expression(expr: &Expr) -> Self {
        let (sqlite_type, nullable) = match expr.kind {
            ExprKind::Literal(Literal::Null) => (SqliteType::Null, true),
            _ => (SqliteType::Integer, false),
        };
        Self {
            name_hint: Some(expression_name(expr)),
            ..Self::typed(sqlite_type, nullable, expr.node_ref())
        }
    }

    /// Nameless value of a known type, used as a bind parameter hint
    pub fn typed(sqlite_type: SqliteType, nullable: bool, element: NodeRef) -> Self {
        Self {
            table_name: None,
            column_name: None,
            sqlite_type,
            nullable,
            element,
            adapter_type: None,
            foreign_table: None,
            name_hint: None,
            qualified_only: false,
        }
    }

    /// Same value read through another table name
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Same value under another column name
    pub fn with_column_name(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    /// Same value with nullability forced
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Same value, visible to unqualified references again once it leaves
    /// its FROM scope
    pub fn unhidden(mut self) -> Self {
        self.qualified_only = false;
        self
    }

    /// Two values are the same column iff they originate from the same node
    pub fn is_same_column(&self, other: &Value) -> bool {
        self.element.id == other.element.id
    }

    /// Whether a `[table.]column` reference names this value
    pub fn matches(&self, column: &str, table: Option<&str>) -> bool {
        let column_matches = self
            .column_name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(column));
        let table_matches = match table {
            Some(table) => self
                .table_name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(table)),
            None => true,
        };
        column_matches && table_matches
    }

    /// `table.column`, or whichever part is known
    pub fn display_name(&self) -> String {
        match (&self.table_name, &self.column_name) {
            (Some(table), Some(column)) => format!("{}.{}", table, column),
            (None, Some(column)) => column.clone(),
            _ => self.name_hint.clone().unwrap_or_else(|| "expr".to_string()),
        }
    }
}

/// Every declared column of a table, in declaration order
pub fn table_values(table: &CreateTable) -> Vec<Value> {
    table.columns.iter().map(|column| Value::column(table, column)).collect()
}

/// Base name of an expression result: the column it reads, a literal kind,
/// or a function name combined with its first argument's name
pub fn expression_name(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Column { column, .. } => column.value.clone(),
        ExprKind::Literal(Literal::Integer(_)) => "int_literal".to_string(),
        ExprKind::Literal(Literal::Real(_)) => "real_literal".to_string(),
        ExprKind::Literal(Literal::String(_)) => "string_literal".to_string(),
        ExprKind::Literal(Literal::Blob(_)) => "blob_literal".to_string(),
        ExprKind::Function { name, args, .. } => {
            let name = name.value.to_ascii_lowercase();
            let first = match args {
                FunctionArgs::List(args) => args.first(),
                FunctionArgs::Star => None,
            };
            match first {
                Some(arg) if matches!(arg.kind, ExprKind::Column { .. } | ExprKind::Function { .. }) => {
                    format!("{}_{}", name, expression_name(arg))
                }
                _ => name,
            }
        }
        ExprKind::Nested(inner) => expression_name(inner),
        _ => "expr".to_string(),
    }
}

/// Keys a child table's foreign key may reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Primary key columns, in key order
    pub primary_key: Vec<Value>,

    /// Column sets of every unique constraint and unique index
    pub unique_constraints: Vec<Vec<Value>>,
}

impl ForeignKey {
    /// Collect the keys of `table`, including the full (non-partial) unique
    /// indexes declared on it
    pub fn new<'i>(table: &CreateTable, unique_indexes: impl IntoIterator<Item = &'i CreateIndex>) -> Self {
        let values = table_values(table);
        let pick = |names: &[&Ident]| -> Vec<Value> {
            names
                .iter()
                .filter_map(|name| values.iter().find(|v| v.matches(&name.value, None)).cloned())
                .collect()
        };

        let mut primary_key: Vec<Value> = table
            .columns
            .iter()
            .zip(&values)
            .filter(|(column, _)| column.is_primary_key())
            .map(|(_, value)| value.clone())
            .collect();
        let mut unique_constraints: Vec<Vec<Value>> = table
            .columns
            .iter()
            .zip(&values)
            .filter(|(column, _)| column.is_unique())
            .map(|(_, value)| vec![value.clone()])
            .collect();

        for constraint in &table.constraints {
            match &constraint.kind {
                TableConstraintKind::PrimaryKey(columns) if primary_key.is_empty() => {
                    primary_key = pick(&columns.iter().map(|c| &c.name).collect::<Vec<_>>());
                }
                TableConstraintKind::Unique(columns) => {
                    unique_constraints.push(pick(&columns.iter().map(|c| &c.name).collect::<Vec<_>>()));
                }
                _ => {}
            }
        }

        for index in unique_indexes {
            if index.unique && index.where_clause.is_none() && index.table.matches(&table.name.value) {
                unique_constraints.push(pick(&index.columns.iter().map(|c| &c.name).collect::<Vec<_>>()));
            }
        }

        Self {
            primary_key,
            unique_constraints,
        }
    }

    /// Whether `columns` names exactly the primary key or one unique
    /// constraint, in any order
    pub fn is_key(&self, columns: &[&str]) -> bool {
        std::iter::once(&self.primary_key)
            .chain(&self.unique_constraints)
            .any(|key| same_column_set(key, columns))
    }
}

fn same_column_set(key: &[Value], columns: &[&str]) -> bool {
    key.len() == columns.len()
        && columns
            .iter()
            .all(|name| key.iter().any(|value| value.matches(name, None)))
}
