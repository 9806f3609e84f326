//! INSERT, UPDATE and DELETE rules

use super::{require_column, Validator};
use crate::resolver::{ResolutionError, Resolver, Response};
use crate::tree::*;
use crate::value::Value;

impl<'a> Validator<'a> {
    /// A WITH clause on a data modification statement scopes the whole statement
    fn statement_resolver(&self, with: Option<&WithClause>, response: &mut Response) -> Resolver<'a> {
        match with {
            Some(with) => {
                let (resolver, common) = self.resolver.with_common_tables(with);
                response.absorb(common);
                resolver
            }
            None => self.resolver.clone(),
        }
    }

    pub(crate) fn validate_insert(&self, insert: &InsertStmt) -> Response {
        let mut response = Response::default();
        let resolver = self.statement_resolver(insert.with.as_ref(), &mut response);
        let target = self.target_values(&resolver, &insert.table, insert.alias.as_ref());
        let target_found = !target.has_errors();
        let table_values = response.absorb(target);

        // Positions stay aligned with the column list; an unknown column
        // leaves its position untyped
        let targets: Vec<Option<Value>> = if insert.columns.is_empty() {
            table_values.iter().cloned().map(Some).collect()
        } else if target_found {
            insert
                .columns
                .iter()
                .map(|column| require_column(&table_values, column, &mut response))
                .collect()
        } else {
            vec![None; insert.columns.len()]
        };
        let expected = targets.len();

        if let InsertSource::Select(select) = &insert.source {
            let source = response.absorb(resolver.resolve_select_stmt_hinted(select, Some(targets.as_slice())));
            if target_found && source.len() != expected {
                response.push_error(ResolutionError::InsertError {
                    origin: select.node_ref(),
                    message: format!(
                        "Unexpected number of values being inserted. found: {} expected: {}",
                        source.len(),
                        expected
                    ),
                });
            }
        }

        response
    }

    pub(crate) fn validate_update(&self, update: &UpdateStmt) -> Response {
        let mut response = Response::default();
        let resolver = self.statement_resolver(update.with.as_ref(), &mut response);
        let table_values = response.absorb(self.target_values(&resolver, &update.table, update.alias.as_ref()));
        let scoped = resolver.with_scope(table_values.clone());

        for assignment in &update.assignments {
            let target = require_column(&table_values, &assignment.column, &mut response);
            response.absorb(scoped.resolve_expr_hinted(&assignment.value, target.as_ref()));
        }

        self.check_filters(
            &scoped,
            update.where_clause.as_ref(),
            &update.order_by,
            update.limit.as_ref(),
            &mut response,
        );
        response
    }

    pub(crate) fn validate_delete(&self, delete: &DeleteStmt) -> Response {
        let mut response = Response::default();
        let resolver = self.statement_resolver(delete.with.as_ref(), &mut response);
        let table_values = response.absorb(self.target_values(&resolver, &delete.table, delete.alias.as_ref()));
        let scoped = resolver.with_scope(table_values);

        self.check_filters(
            &scoped,
            delete.where_clause.as_ref(),
            &delete.order_by,
            delete.limit.as_ref(),
            &mut response,
        );
        response
    }

    fn check_filters(
        &self,
        scoped: &Resolver<'_>,
        where_clause: Option<&Expr>,
        order_by: &[OrderingTerm],
        limit: Option<&Limit>,
        response: &mut Response,
    ) {
        if let Some(where_clause) = where_clause {
            response.absorb(scoped.resolve_expr(where_clause));
        }
        for term in order_by {
            response.absorb(scoped.resolve_expr(&term.expr));
        }
        if let Some(limit) = limit {
            response.absorb(scoped.resolve_limit(limit));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{messages, validate_all};
    use crate::resolver::ResolutionError;
    use crate::tree::BindParameter;
    use sqlsight_core::SqliteType;

    const SCHEMA: &str = "CREATE TABLE one (a INTEGER NOT NULL);
                          CREATE TABLE two (a INTEGER NOT NULL, b TEXT);";

    #[test]
    fn insert_arity_per_row() {
        let responses = validate_all(&format!(
            "{} INSERT INTO one VALUES (?), (?); INSERT INTO two VALUES (?), (?);",
            SCHEMA
        ));
        assert!(responses[2].errors.is_empty(), "{:?}", responses[2].errors);
        assert_eq!(
            messages(&responses[3]),
            vec!["Unexpected number of values being inserted. found: 1 expected: 2"]
        );
    }

    #[test]
    fn insert_parameters_take_target_column_types() {
        let responses = validate_all(&format!("{} INSERT INTO two (b, a) VALUES (:label, ?);", SCHEMA));
        let response = &responses[2];
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let arguments: Vec<_> = response
            .arguments
            .iter()
            .map(|a| (a.parameter.clone(), a.value.as_ref().map(|v| v.sqlite_type)))
            .collect();
        assert_eq!(
            arguments,
            vec![
                (
                    BindParameter::Named {
                        prefix: ':',
                        name: "label".to_string()
                    },
                    Some(SqliteType::Text)
                ),
                (BindParameter::Anonymous, Some(SqliteType::Integer)),
            ]
        );
    }

    #[test]
    fn insert_named_columns_must_exist() {
        let responses = validate_all(&format!("{} INSERT INTO two (a, c) SELECT a, a FROM one;", SCHEMA));
        assert_eq!(responses[2].errors.len(), 1);
        assert!(matches!(responses[2].errors[0], ResolutionError::ColumnNameNotFound { .. }));
    }

    #[test]
    fn insert_into_unknown_table() {
        let responses = validate_all("INSERT INTO nowhere DEFAULT VALUES;");
        assert!(matches!(responses[0].errors[0], ResolutionError::TableNameNotFound { .. }));
    }

    #[test]
    fn unknown_insert_column_keeps_later_positions() {
        let responses = validate_all(&format!("{} INSERT INTO two (c, b) VALUES (?, ?);", SCHEMA));
        assert_eq!(messages(&responses[2]), vec!["No column found with name c"]);
        let types: Vec<_> = responses[2]
            .arguments
            .iter()
            .map(|a| a.value.as_ref().map(|v| v.sqlite_type))
            .collect();
        assert_eq!(types, vec![None, Some(SqliteType::Text)]);
    }

    #[test]
    fn unknown_insert_target_still_checks_the_source() {
        let responses = validate_all("INSERT INTO missing SELECT nope FROM also_missing WHERE a = ?;");
        let response = &responses[0];
        assert!(response.errors.len() >= 3, "{:?}", response.errors);
        assert!(matches!(response.errors[0], ResolutionError::TableNameNotFound { .. }));
        assert!(response
            .errors
            .iter()
            .all(|error| !matches!(error, ResolutionError::InsertError { .. })));
        assert_eq!(response.arguments.len(), 1);
    }

    #[test]
    fn update_and_delete() {
        let responses = validate_all(&format!(
            "{} UPDATE two SET b = ?, c = 1 WHERE a = ?;
             DELETE FROM two AS t WHERE t.b LIKE ? ORDER BY t.a LIMIT ?;",
            SCHEMA
        ));
        assert_eq!(messages(&responses[2]), vec!["No column found with name c"]);
        let types: Vec<_> = responses[2]
            .arguments
            .iter()
            .map(|a| a.value.as_ref().map(|v| v.sqlite_type))
            .collect();
        assert_eq!(types, vec![Some(SqliteType::Text), Some(SqliteType::Integer)]);

        assert!(responses[3].errors.is_empty(), "{:?}", responses[3].errors);
        assert_eq!(responses[3].arguments.len(), 2);
    }

    #[test]
    fn with_clause_scopes_the_statement() {
        let responses = validate_all(&format!(
            "{} WITH src AS (SELECT a FROM one) INSERT INTO one SELECT a FROM src;",
            SCHEMA
        ));
        assert!(responses[2].errors.is_empty(), "{:?}", responses[2].errors);
    }
}
