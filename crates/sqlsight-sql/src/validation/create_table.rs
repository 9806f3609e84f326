//! CREATE TABLE rules: columns, keys, constraint expressions, foreign keys

use super::{require_column, ExprRules, Validator};
use crate::resolver::{ResolutionError, Response};
use crate::symbol_table::{Declaration, Dependency};
use crate::tree::*;
use crate::value::{table_values, ForeignKey, Value};

const CONSTRAINT_RULES: ExprRules = ExprRules {
    subqueries_allowed: false,
    binds_allowed: false,
    context: "CREATE TABLE statements",
};

impl<'a> Validator<'a> {
    pub(crate) fn validate_create_table(&self, table: &CreateTable) -> Response {
        let values = table_values(table);
        let mut response = Response::default();

        self.check_columns(table, &mut response);
        self.check_primary_keys(table, &mut response);

        let scoped = self.resolver.with_scope(values.clone());
        let unscoped = self.resolver.with_scope(Vec::new());

        for column in &table.columns {
            for constraint in &column.constraints {
                match &constraint.kind {
                    ColumnConstraintKind::Check(expr) => {
                        response.absorb(self.check_expr(&scoped, expr, None, CONSTRAINT_RULES));
                    }
                    ColumnConstraintKind::Default(expr) => {
                        response.absorb(self.check_expr(&unscoped, expr, None, CONSTRAINT_RULES));
                    }
                    ColumnConstraintKind::References(clause) => {
                        self.check_foreign_key(table, &[&column.name], clause, &mut response);
                    }
                    _ => {}
                }
            }
        }

        for constraint in &table.constraints {
            match &constraint.kind {
                TableConstraintKind::PrimaryKey(columns) | TableConstraintKind::Unique(columns) => {
                    for column in columns {
                        require_column(&values, &column.name, &mut response);
                    }
                }
                TableConstraintKind::Check(expr) => {
                    response.absorb(self.check_expr(&scoped, expr, None, CONSTRAINT_RULES));
                }
                TableConstraintKind::ForeignKey { columns, clause } => {
                    for column in columns {
                        require_column(&values, column, &mut response);
                    }
                    let columns: Vec<&Ident> = columns.iter().collect();
                    self.check_foreign_key(table, &columns, clause, &mut response);
                }
            }
        }

        response.values = values;
        response
    }

    /// Duplicate names, and at most one UNIQUE per column
    fn check_columns(&self, table: &CreateTable, response: &mut Response) {
        for (index, column) in table.columns.iter().enumerate() {
            if table.columns[..index].iter().any(|earlier| earlier.name.matches(&column.name.value)) {
                response.push_error(ResolutionError::create_table(
                    column.name.node_ref(),
                    format!("Duplicate column name {}", column.name.value),
                ));
            }

            let unique = column
                .constraints
                .iter()
                .filter(|c| matches!(c.kind, ColumnConstraintKind::Unique));
            for constraint in unique.skip(1) {
                response.push_error(ResolutionError::create_table(
                    NodeRef {
                        id: column.name.id,
                        span: constraint.span,
                    },
                    format!("Column {} can only have one UNIQUE constraint", column.name.value),
                ));
            }
        }
    }

    /// One primary key, declared on a column or on the table
    fn check_primary_keys(&self, table: &CreateTable, response: &mut Response) {
        let column_keys = table.columns.iter().flat_map(|column| {
            column
                .constraints
                .iter()
                .filter(|c| matches!(c.kind, ColumnConstraintKind::PrimaryKey { .. }))
                .map(move |c| NodeRef {
                    id: column.name.id,
                    span: c.span,
                })
        });
        let table_keys = table
            .constraints
            .iter()
            .filter(|c| matches!(c.kind, TableConstraintKind::PrimaryKey(_)))
            .map(|c| NodeRef {
                id: table.name.id,
                span: c.span,
            });

        for origin in column_keys.chain(table_keys).skip(1) {
            response.push_error(ResolutionError::create_table(
                origin,
                format!("Table {} can only have one primary key", table.name.value),
            ));
        }
    }

    /// A foreign key must name the parent's primary key or one of its
    /// unique keys, with as many columns as the child lists
    fn check_foreign_key(
        &self,
        table: &CreateTable,
        child_columns: &[&Ident],
        clause: &ForeignKeyClause,
        response: &mut Response,
    ) {
        let symbols = self.resolver.symbols();
        let parent_name = &clause.table;

        let parent = if parent_name.matches(&table.name.value) {
            // Self-references resolve to the table being declared
            Some(std::sync::Arc::new(table.clone()))
        } else {
            match symbols.lookup(&parent_name.value) {
                Some((tag, Declaration::Table(parent))) => {
                    response.dependencies.insert(Dependency::Source(tag.clone()));
                    Some(parent.clone())
                }
                Some((tag, Declaration::View(_))) => {
                    response.dependencies.insert(Dependency::Source(tag.clone()));
                    response.push_error(ResolutionError::create_table(
                        parent_name.node_ref(),
                        format!("Foreign key cannot reference view {}", parent_name.value),
                    ));
                    return;
                }
                None => None,
            }
        };

        let Some(parent) = parent else {
            response.push_error(ResolutionError::TableNameNotFound {
                origin: parent_name.node_ref(),
                message: format!("No table found with name {}", parent_name.value),
                available_table_names: symbols.names(),
            });
            response.dependencies.insert(Dependency::AnySource);
            return;
        };

        let keys = ForeignKey::new(&parent, symbols.indexes_on(&parent.name.value));

        if clause.columns.is_empty() {
            if keys.primary_key.len() != 1 {
                response.push_error(ResolutionError::create_table(
                    parent_name.node_ref(),
                    format!(
                        "Table {} does not have a unique primary key to reference",
                        parent.name.value
                    ),
                ));
            } else if child_columns.len() != 1 {
                response.push_error(foreign_key_arity(clause, child_columns.len(), 1));
            }
            return;
        }

        let parent_values = table_values(&parent);
        let found: Vec<Value> = clause
            .columns
            .iter()
            .filter_map(|column| require_column(&parent_values, column, response))
            .collect();
        if found.len() != clause.columns.len() {
            return;
        }

        let names: Vec<&str> = clause.columns.iter().map(|c| c.value.as_str()).collect();
        if !keys.is_key(&names) {
            response.push_error(ResolutionError::create_table(
                clause.columns[0].node_ref(),
                format!(
                    "Table {} has no unique index on columns ({})",
                    parent.name.value,
                    names.join(", ")
                ),
            ));
        }
        if child_columns.len() != clause.columns.len() {
            response.push_error(foreign_key_arity(clause, child_columns.len(), clause.columns.len()));
        }
    }
}

fn foreign_key_arity(clause: &ForeignKeyClause, found: usize, expected: usize) -> ResolutionError {
    ResolutionError::create_table(
        clause.table.node_ref(),
        format!(
            "Unexpected number of columns in foreign key found: {} expected: {}",
            found, expected
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::super::tests::{messages, validate_all};
    use crate::resolver::ResolutionError;
    use crate::symbol_table::Dependency;

    #[test]
    fn well_formed_table_has_no_errors() {
        let responses = validate_all(
            "CREATE TABLE team (id INTEGER PRIMARY KEY, code TEXT UNIQUE);
             CREATE TABLE player (
               id INTEGER NOT NULL,
               team_id INTEGER REFERENCES team,
               team_code TEXT REFERENCES team (code),
               score INTEGER DEFAULT 0 CHECK (score >= 0),
               PRIMARY KEY (id)
             );",
        );
        assert!(responses.iter().all(|r| r.errors.is_empty()), "{:?}", responses[1].errors);
        assert_eq!(responses[1].values.len(), 4);
    }

    #[test]
    fn duplicate_columns_and_keys() {
        let responses = validate_all(
            "CREATE TABLE t (a INTEGER PRIMARY KEY, a TEXT UNIQUE UNIQUE, b TEXT, PRIMARY KEY (b));",
        );
        assert_eq!(
            messages(&responses[0]),
            vec![
                "Duplicate column name a",
                "Column a can only have one UNIQUE constraint",
                "Table t can only have one primary key",
            ]
        );
    }

    #[test]
    fn constraint_columns_must_exist() {
        let responses = validate_all("CREATE TABLE t (a INTEGER, UNIQUE (a, c));");
        assert_eq!(responses[0].errors.len(), 1);
        assert!(matches!(responses[0].errors[0], ResolutionError::ColumnNameNotFound { .. }));
        assert_eq!(responses[0].errors[0].candidates().to_vec(), vec!["a".to_string()]);
    }

    #[test]
    fn constraint_expressions_reject_subqueries_and_binds() {
        let responses = validate_all(
            "CREATE TABLE t (a INTEGER CHECK (a IN (SELECT 1)), b INTEGER DEFAULT ?);",
        );
        assert_eq!(
            messages(&responses[0]),
            vec![
                "Subqueries are not permitted as part of CREATE TABLE statements",
                "Cannot bind arguments in CREATE TABLE statements",
            ]
        );
        assert!(responses[0].arguments.is_empty());
    }

    #[test]
    fn foreign_key_must_target_a_key() {
        let responses = validate_all(
            "CREATE TABLE parent (a TEXT, b TEXT, c TEXT, UNIQUE (a, b));
             CREATE UNIQUE INDEX parent_c ON parent (c);
             CREATE TABLE good (x TEXT, y TEXT, z TEXT, FOREIGN KEY (y, x) REFERENCES parent (b, a), FOREIGN KEY (z) REFERENCES parent (c));
             CREATE TABLE bad (x TEXT REFERENCES parent (a));
             CREATE TABLE implicit (x TEXT REFERENCES parent);",
        );
        assert!(responses[2].errors.is_empty(), "{:?}", responses[2].errors);
        assert_eq!(messages(&responses[3]), vec!["Table parent has no unique index on columns (a)"]);
        assert_eq!(
            messages(&responses[4]),
            vec!["Table parent does not have a unique primary key to reference"]
        );
    }

    #[test]
    fn foreign_key_arity_and_missing_parent() {
        let responses = validate_all(
            "CREATE TABLE parent (a TEXT, b TEXT, PRIMARY KEY (a, b));
             CREATE TABLE child (x TEXT, FOREIGN KEY (x) REFERENCES parent (a, b));
             CREATE TABLE orphan (x TEXT REFERENCES missing (id));",
        );
        assert_eq!(
            messages(&responses[1]),
            vec!["Unexpected number of columns in foreign key found: 1 expected: 2"]
        );
        assert!(matches!(responses[2].errors[0], ResolutionError::TableNameNotFound { .. }));
        assert!(responses[2].dependencies.contains(&Dependency::AnySource));
    }

    #[test]
    fn self_reference() {
        let responses = validate_all("CREATE TABLE node (id INTEGER PRIMARY KEY, parent INTEGER REFERENCES node (id));");
        assert!(responses[0].errors.is_empty(), "{:?}", responses[0].errors);
    }
}
