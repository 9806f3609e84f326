//! Expression resolution
//!
//! Column references resolve to the value they name. Every other form is
//! an anonymous placeholder; its operands are still resolved so errors,
//! dependencies and bind parameters inside them are collected.

use sqlsight_core::SqliteType;

use super::{column_names, ArgumentKind, BindArgument, ResolutionError, Resolver, Response};
use crate::tree::*;
use crate::value::Value;

impl<'a> Resolver<'a> {
    pub(crate) fn resolve_expr(&self, expr: &Expr) -> Response {
        self.resolve_expr_hinted(expr, None)
    }

    /// Resolve `expr`; `hint` is the value a bind parameter in its position
    /// would be compared with or stored into
    pub(crate) fn resolve_expr_hinted(&self, expr: &Expr, hint: Option<&Value>) -> Response {
        let mut response = Response::default();

        match &expr.kind {
            ExprKind::Column { table, column } => return self.resolve_column(expr, table.as_ref(), column),
            ExprKind::Nested(inner) => return self.resolve_expr_hinted(inner, hint),
            ExprKind::BindParameter(_) => {
                response
                    .arguments
                    .extend(BindArgument::from_expr(expr, ArgumentKind::SingleValue, hint.cloned()));
            }
            ExprKind::Literal(_) | ExprKind::Raise { .. } => {}
            ExprKind::Unary { op, expr: operand } => {
                let hint = if *op == UnaryOp::Not { None } else { hint };
                response.absorb(self.resolve_expr_hinted(operand, hint));
            }
            ExprKind::Binary { op, left, right } => match op {
                BinaryOp::And | BinaryOp::Or => {
                    response.absorb(self.resolve_expr(left));
                    response.absorb(self.resolve_expr(right));
                }
                _ => {
                    self.resolve_against(left, right, &mut response, |value| value);
                }
            },
            ExprKind::Is { left, right, .. } => {
                // IS compares with NULL too
                self.resolve_against(left, right, &mut response, |value| value.with_nullable(true));
            }
            ExprKind::Function { args, .. } => {
                if let FunctionArgs::List(args) = args {
                    for arg in args {
                        response.absorb(self.resolve_expr(arg));
                    }
                }
            }
            ExprKind::Cast { expr: operand, type_name } => {
                let cast = Value::typed(
                    SqliteType::from_type_name(Some(type_name.name.as_str())),
                    false,
                    operand.node_ref(),
                );
                response.absorb(self.resolve_expr_hinted(operand, Some(&cast)));
            }
            ExprKind::Collate { expr: operand, .. } => {
                response.absorb(self.resolve_expr_hinted(operand, hint));
            }
            ExprKind::Like {
                expr: subject,
                pattern,
                escape,
                ..
            } => {
                self.resolve_against(subject, pattern, &mut response, |value| value);
                if let Some(escape) = escape {
                    let text = Value::typed(SqliteType::Text, false, escape.node_ref());
                    response.absorb(self.resolve_expr_hinted(escape, Some(&text)));
                }
            }
            ExprKind::Null { expr: operand, .. } => {
                response.absorb(self.resolve_expr(operand));
            }
            ExprKind::Between { expr: subject, low, high, .. } => {
                let bounds = [low.as_ref(), high.as_ref()];
                let subject_value = self.resolve_subject(subject, &bounds, &mut response);
                for bound in bounds {
                    response.absorb(self.resolve_expr_hinted(bound, subject_value.as_ref()));
                }
            }
            ExprKind::In { expr: subject, target, .. } => self.resolve_in(subject, target, &mut response),
            ExprKind::Exists { select, .. } => {
                response.absorb(self.resolve_select_stmt(select));
            }
            ExprKind::Subquery(select) => {
                let values = response.absorb(self.resolve_select_stmt(select));
                if values.len() > 1 {
                    response.push_error(ResolutionError::expression(
                        select.node_ref(),
                        format!("Subquery used as an expression returns {} columns, expected 1", values.len()),
                    ));
                }
            }
            ExprKind::Case {
                operand,
                branches,
                else_expr,
            } => {
                let operand_value = match operand {
                    Some(operand) => {
                        let values = response.absorb(self.resolve_expr(operand));
                        values.into_iter().next()
                    }
                    None => None,
                };
                for (when, then) in branches {
                    response.absorb(self.resolve_expr_hinted(when, operand_value.as_ref()));
                    response.absorb(self.resolve_expr_hinted(then, hint));
                }
                if let Some(else_expr) = else_expr {
                    response.absorb(self.resolve_expr_hinted(else_expr, hint));
                }
            }
        }

        response.values = vec![Value::expression(expr)];
        response
    }

    /// Resolve two operands that constrain each other's type. The side that
    /// is not a bind parameter goes first so its value can type the other.
    /// Arguments are still recorded in source order.
    fn resolve_against(
        &self,
        left: &Expr,
        right: &Expr,
        response: &mut Response,
        adjust: impl Fn(Value) -> Value,
    ) {
        let left_is_bind = matches!(left.kind, ExprKind::BindParameter(_));

        let (left_response, right_response) = if left_is_bind {
            let right_response = self.resolve_expr(right);
            let hint = right_response.values.first().cloned().map(&adjust);
            (self.resolve_expr_hinted(left, hint.as_ref()), right_response)
        } else {
            let left_response = self.resolve_expr(left);
            let hint = left_response.values.first().cloned().map(&adjust);
            let right_response = self.resolve_expr_hinted(right, hint.as_ref());
            (left_response, right_response)
        };

        response.absorb(left_response);
        response.absorb(right_response);
    }

    /// Resolve the subject of BETWEEN or IN; a bind parameter subject is
    /// typed by the first operand that is not one
    fn resolve_subject(&self, subject: &Expr, operands: &[&Expr], response: &mut Response) -> Option<Value> {
        if !matches!(subject.kind, ExprKind::BindParameter(_)) {
            return response.absorb(self.resolve_expr(subject)).into_iter().next();
        }

        let hint = operands
            .iter()
            .find(|operand| !matches!(operand.kind, ExprKind::BindParameter(_)))
            .and_then(|operand| self.resolve_expr(operand).values.into_iter().next());
        response.absorb(self.resolve_expr_hinted(subject, hint.as_ref()));
        hint
    }

    fn resolve_in(&self, subject: &Expr, target: &InTarget, response: &mut Response) {
        match target {
            InTarget::List(items) => {
                let operands: Vec<&Expr> = items.iter().collect();
                let subject_value = self.resolve_subject(subject, &operands, response);
                for item in items {
                    response.absorb(self.resolve_expr_hinted(item, subject_value.as_ref()));
                }
            }
            InTarget::Select(select) => {
                // The subquery goes first so it can type a bind parameter subject
                let mut subquery = self.resolve_select_stmt(select);
                if subquery.values.len() > 1 {
                    subquery.push_error(ResolutionError::expression(
                        select.node_ref(),
                        format!("Subquery in IN returns {} columns, expected 1", subquery.values.len()),
                    ));
                }
                let hint = subquery.values.first().cloned();
                response.absorb(self.resolve_expr_hinted(subject, hint.as_ref()));
                response.absorb(subquery);
            }
            InTarget::Table(name) => {
                response.absorb(self.resolve_expr(subject));
                response.absorb(self.resolve_table_name(name));
            }
            InTarget::Bind(bind) => {
                let subject_value = response.absorb(self.resolve_expr(subject)).into_iter().next();
                match BindArgument::from_expr(bind, ArgumentKind::SetOfValues, subject_value) {
                    Some(argument) => response.arguments.push(argument),
                    None => response.push_error(ResolutionError::IncompleteRule {
                        origin: bind.node_ref(),
                        message: "Expected a bind parameter after IN".to_string(),
                    }),
                }
            }
        }
    }

    /// Look a `[table.]column` reference up, innermost scope first
    fn resolve_column(&self, expr: &Expr, table: Option<&Ident>, column: &Ident) -> Response {
        let table_name = table.map(|t| t.value.as_str());

        for layer in self.scopes.iter().rev() {
            let mut found: Vec<&Value> = Vec::new();
            let candidates = layer
                .iter()
                .filter(|v| v.matches(&column.value, table_name) && (table_name.is_some() || !v.qualified_only));
            for value in candidates {
                // The same column reachable twice through one name is one match
                let duplicate = found
                    .iter()
                    .any(|f| f.is_same_column(value) && f.table_name == value.table_name);
                if !duplicate {
                    found.push(value);
                }
            }

            match found.as_slice() {
                [] => continue,
                [value] => return Response::new(vec![(*value).clone().unhidden()]),
                [first, ..] => {
                    let mut response = Response::error(ResolutionError::expression(
                        column.node_ref(),
                        format!("Ambiguous column name {}", column.value),
                    ));
                    response.values = vec![(*first).clone().unhidden()];
                    return response;
                }
            }
        }

        let visible = self.visible_values();
        let available = match table_name {
            Some(table_name) => {
                let qualified: Vec<Value> = visible
                    .iter()
                    .filter(|v| v.table_name.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(table_name)))
                    .cloned()
                    .collect();
                if qualified.is_empty() {
                    column_names(&visible)
                } else {
                    column_names(&qualified)
                }
            }
            None => column_names(&visible),
        };
        let message = match table {
            Some(table) => format!("No column found with name {}.{}", table.value, column.value),
            None => format!("No column found with name {}", column.value),
        };

        let mut response = Response::error(ResolutionError::ColumnOrTableNameNotFound {
            origin: expr.node_ref(),
            message,
            available_columns: available,
            table_name: table.map(|t| t.value.clone()),
        });
        // Keep the expression's position so arity checks downstream stay quiet
        response.values = vec![Value::expression(expr)];
        response
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::SqlParser;
    use crate::resolver::{ArgumentKind, Node, ResolutionError, Resolver, Response};
    use crate::symbol_table::{SymbolTable, Tag};
    use crate::tree::*;
    use sqlsight_core::SqliteType;

    fn resolve_last(sql: &str) -> Response {
        let file = SqlParser::new().parse(sql, None).unwrap();
        let (table, _) = SymbolTable::build(&file, &Tag::new("test.sq"));
        match &file.statements.last().unwrap().kind {
            StmtKind::Select(select) => Resolver::new(&table).resolve(Node::SelectStmt(select)),
            _ => panic!("last statement should be a select"),
        }
    }

    fn argument_types(response: &Response) -> Vec<(ArgumentKind, Option<SqliteType>, Option<String>)> {
        response
            .arguments
            .iter()
            .map(|a| {
                (
                    a.kind,
                    a.value.as_ref().map(|v| v.sqlite_type),
                    a.value.as_ref().and_then(|v| v.column_name.clone()),
                )
            })
            .collect()
    }

    const SCHEMA: &str = "CREATE TABLE item (id INTEGER PRIMARY KEY, label TEXT, price REAL NOT NULL);";

    #[test]
    fn comparisons_type_parameters_from_either_side() {
        let response = resolve_last(&format!("{} SELECT * FROM item WHERE id = ? AND ? < price;", SCHEMA));
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            argument_types(&response),
            vec![
                (ArgumentKind::SingleValue, Some(SqliteType::Integer), Some("id".to_string())),
                (ArgumentKind::SingleValue, Some(SqliteType::Real), Some("price".to_string())),
            ]
        );
    }

    #[test]
    fn in_bind_is_a_set_of_values() {
        let response = resolve_last(&format!("{} SELECT * FROM item WHERE label IN ?;", SCHEMA));
        assert_eq!(
            argument_types(&response),
            vec![(ArgumentKind::SetOfValues, Some(SqliteType::Text), Some("label".to_string()))]
        );
    }

    #[test]
    fn in_list_between_like_and_cast() {
        let response = resolve_last(&format!(
            "{} SELECT * FROM item WHERE id IN (?, 2) AND price BETWEEN ? AND ? AND label LIKE ? AND CAST(? AS TEXT) = label;",
            SCHEMA
        ));
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let types: Vec<_> = argument_types(&response).into_iter().map(|(_, t, _)| t).collect();
        assert_eq!(
            types,
            vec![
                Some(SqliteType::Integer),
                Some(SqliteType::Real),
                Some(SqliteType::Real),
                Some(SqliteType::Text),
                Some(SqliteType::Text),
            ]
        );
    }

    #[test]
    fn is_hint_is_nullable() {
        let response = resolve_last(&format!("{} SELECT * FROM item WHERE price IS ?;", SCHEMA));
        assert_eq!(response.arguments.len(), 1);
        assert!(response.arguments[0].value.as_ref().is_some_and(|v| v.nullable));
    }

    #[test]
    fn expressions_are_placeholders() {
        let response = resolve_last(&format!("{} SELECT price * 2, NULL, (label) FROM item;", SCHEMA));
        let shape: Vec<_> = response.values.iter().map(|v| (v.sqlite_type, v.nullable)).collect();
        assert_eq!(
            shape,
            vec![
                (SqliteType::Integer, false),
                (SqliteType::Null, true),
                (SqliteType::Text, true),
            ]
        );
        assert_eq!(response.values[0].name_hint.as_deref(), Some("expr"));
    }

    #[test]
    fn correlated_subquery_sees_outer_scope() {
        let response = resolve_last(&format!(
            "{} CREATE TABLE tag (item_id INTEGER NOT NULL, name TEXT NOT NULL);
             SELECT label FROM item WHERE EXISTS (SELECT 1 FROM tag WHERE tag.item_id = item.id);",
            SCHEMA
        ));
        assert!(response.errors.is_empty(), "{:?}", response.errors);
    }

    #[test]
    fn scalar_subquery_must_have_one_column() {
        let response = resolve_last(&format!("{} SELECT (SELECT id, label FROM item) FROM item;", SCHEMA));
        assert_eq!(response.errors.len(), 1);
        assert!(matches!(response.errors[0], ResolutionError::ExpressionError { .. }));
    }

    #[test]
    fn unknown_column_lists_candidates() {
        let response = resolve_last(&format!("{} SELECT lable FROM item;", SCHEMA));
        let error = &response.errors[0];
        assert!(matches!(error, ResolutionError::ColumnOrTableNameNotFound { .. }));
        assert_eq!(error.message(), "No column found with name lable");
        assert_eq!(error.candidates().to_vec(), vec!["id", "label", "price"]);
        // the output keeps its width
        assert_eq!(response.values.len(), 1);
    }

    #[test]
    fn inner_scope_wins_over_outer() {
        let response = resolve_last(&format!(
            "{} SELECT (SELECT id FROM item AS inner_item) FROM item AS outer_item;",
            SCHEMA
        ));
        assert!(response.errors.is_empty(), "{:?}", response.errors);
    }
}
