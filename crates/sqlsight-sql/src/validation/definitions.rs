//! CREATE VIEW, CREATE INDEX and CREATE TRIGGER rules

use sqlsight_core::SqliteType;

use super::{require_column, ExprRules, Validator};
use crate::resolver::{view_values, ResolutionError, Response};
use crate::tree::*;
use crate::value::Value;

const INDEX_RULES: ExprRules = ExprRules {
    subqueries_allowed: false,
    binds_allowed: false,
    context: "CREATE INDEX statements",
};

const TRIGGER_RULES: ExprRules = ExprRules {
    subqueries_allowed: true,
    binds_allowed: false,
    context: "CREATE TRIGGER statements",
};

impl<'a> Validator<'a> {
    pub(crate) fn validate_create_view(&self, view: &CreateView) -> Response {
        let mut response = self
            .resolver
            .resolving_view(&view.name.value)
            .resolve_select_stmt(&view.select);

        if !view.columns.is_empty() && view.columns.len() != response.values.len() {
            response.push_error(ResolutionError::CompoundError {
                origin: view.name.node_ref(),
                message: format!(
                    "Unexpected number of columns in view found: {} expected: {}",
                    response.values.len(),
                    view.columns.len()
                ),
            });
        }

        for argument in std::mem::take(&mut response.arguments) {
            response.push_error(ResolutionError::expression(
                argument.element,
                "Cannot bind arguments in CREATE VIEW statements",
            ));
        }

        response.values = view_values(view, std::mem::take(&mut response.values));
        response
    }

    pub(crate) fn validate_create_index(&self, index: &CreateIndex) -> Response {
        let mut response = Response::default();
        let table = self.resolver.resolve_table_name(&index.table);
        let table_found = !table.has_errors();
        let values = response.absorb(table);

        if table_found {
            for column in &index.columns {
                require_column(&values, &column.name, &mut response);
            }
        }

        if let Some(where_clause) = &index.where_clause {
            let scoped = self.resolver.with_scope(values);
            let condition = response.absorb(self.check_expr(&scoped, where_clause, None, INDEX_RULES));
            let is_boolean = condition
                .first()
                .map_or(true, |value| matches!(value.sqlite_type, SqliteType::Integer | SqliteType::Null));
            if !is_boolean {
                response.push_error(ResolutionError::expression(
                    where_clause.node_ref(),
                    "Partial index condition must be a boolean expression",
                ));
            }
        }

        response
    }

    pub(crate) fn validate_create_trigger(&self, trigger: &CreateTrigger) -> Response {
        let mut response = Response::default();
        let values = response.absorb(self.resolver.resolve_table_name(&trigger.table));

        let mut visible: Vec<Value> = Vec::new();
        let (new, old) = match &trigger.event {
            TriggerEvent::Insert => (true, false),
            TriggerEvent::Delete => (false, true),
            TriggerEvent::Update { columns } => {
                for column in columns {
                    require_column(&values, column, &mut response);
                }
                (true, true)
            }
        };
        if new {
            visible.extend(values.iter().cloned().map(|v| v.with_table_name("new")));
        }
        if old {
            visible.extend(values.iter().cloned().map(|v| v.with_table_name("old")));
        }

        let scoped = self.resolver.with_scope(visible);
        if let Some(when) = &trigger.when {
            response.absorb(self.check_expr(&scoped, when, None, TRIGGER_RULES));
        }

        let body = Validator::nested(scoped, TRIGGER_RULES.context);
        for stmt in &trigger.body {
            let mut statement = body.validate(stmt);
            // Body statements expose nothing
            statement.values.clear();
            response.absorb(statement);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{messages, validate_all};
    use crate::resolver::ResolutionError;

    #[test]
    fn view_column_list_must_match() {
        let responses = validate_all(
            "CREATE TABLE t (a INTEGER, b TEXT);
             CREATE VIEW v (x) AS SELECT a, b FROM t;",
        );
        assert_eq!(
            messages(&responses[1]),
            vec!["Unexpected number of columns in view found: 2 expected: 1"]
        );
        assert!(responses[1].values.iter().all(|v| v.table_name.as_deref() == Some("v")));
    }

    #[test]
    fn view_body_errors_and_binds() {
        let responses = validate_all(
            "CREATE TABLE t (a INTEGER);
             CREATE VIEW v AS SELECT missing FROM t WHERE a = ?;",
        );
        assert_eq!(
            messages(&responses[1]),
            vec!["No column found with name missing", "Cannot bind arguments in CREATE VIEW statements"]
        );
        assert!(responses[1].arguments.is_empty());
    }

    #[test]
    fn self_referencing_view_is_recursive() {
        let responses = validate_all("CREATE VIEW a AS SELECT * FROM a;");
        assert_eq!(messages(&responses[0]), vec!["Recursive subquery found: a -> a"]);
    }

    #[test]
    fn index_columns_and_condition() {
        let responses = validate_all(
            "CREATE TABLE t (a INTEGER, b TEXT);
             CREATE INDEX good ON t (a, b) WHERE a > 0;
             CREATE INDEX missing ON t (c);
             CREATE INDEX text_condition ON t (a) WHERE b;
             CREATE INDEX bound ON t (a) WHERE a > ?;
             CREATE INDEX nowhere ON u (a);",
        );
        assert!(responses[1].errors.is_empty(), "{:?}", responses[1].errors);
        assert!(matches!(responses[2].errors[0], ResolutionError::ColumnNameNotFound { .. }));
        assert_eq!(
            messages(&responses[3]),
            vec!["Partial index condition must be a boolean expression"]
        );
        assert_eq!(messages(&responses[4]), vec!["Cannot bind arguments in CREATE INDEX statements"]);
        assert!(matches!(responses[5].errors[0], ResolutionError::TableNameNotFound { .. }));
    }

    #[test]
    fn index_on_unknown_table_still_checks_condition() {
        let responses = validate_all("CREATE INDEX nowhere ON u (a) WHERE 1 = ?;");
        assert_eq!(
            messages(&responses[0]),
            vec!["No table found with name u", "Cannot bind arguments in CREATE INDEX statements"]
        );
    }

    #[test]
    fn trigger_sees_new_and_old_by_event() {
        let responses = validate_all(
            "CREATE TABLE t (a INTEGER, b TEXT);
             CREATE TABLE log (value TEXT);
             CREATE TRIGGER on_insert AFTER INSERT ON t BEGIN
               INSERT INTO log (value) VALUES (new.b);
             END;
             CREATE TRIGGER on_delete AFTER DELETE ON t BEGIN
               INSERT INTO log (value) VALUES (new.b);
             END;
             CREATE TRIGGER on_update AFTER UPDATE OF b, c ON t WHEN old.a <> new.a BEGIN
               DELETE FROM log WHERE value = old.b;
             END;",
        );
        assert!(responses[2].errors.is_empty(), "{:?}", responses[2].errors);
        assert!(matches!(
            responses[3].errors[0],
            ResolutionError::ColumnOrTableNameNotFound { .. }
        ));
        assert_eq!(messages(&responses[4]), vec!["No column found with name c"]);
    }

    #[test]
    fn trigger_body_rejects_binds() {
        let responses = validate_all(
            "CREATE TABLE t (a INTEGER);
             CREATE TRIGGER t_insert AFTER INSERT ON t BEGIN
               UPDATE t SET a = ? WHERE a = new.a;
             END;",
        );
        assert_eq!(messages(&responses[1]), vec!["Cannot bind arguments in CREATE TRIGGER statements"]);
    }
}
