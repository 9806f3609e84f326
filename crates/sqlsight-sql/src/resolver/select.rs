//! Selects, compounds, FROM clauses and result columns

use sqlsight_core::SqliteType;

use super::{ResolutionError, Resolver, Response};
use crate::tree::*;
use crate::value::Value;

impl<'a> Resolver<'a> {
    pub(crate) fn resolve_select_stmt(&self, select: &SelectStmt) -> Response {
        self.resolve_select_stmt_hinted(select, None)
    }

    /// Resolve a (compound) select; `hints` type bind parameters by result
    /// position, as when the select feeds an INSERT
    pub(crate) fn resolve_select_stmt_hinted(&self, select: &SelectStmt, hints: Option<&[Option<Value>]>) -> Response {
        let (resolver, mut response) = match &select.with {
            Some(with) => self.with_common_tables(with),
            None => (self.clone(), Response::default()),
        };

        // The first branch fixes the column count
        let (first, from_values) = resolver.resolve_core(&select.first, hints);
        let values = response.absorb(first);

        for (_, core) in &select.compounds {
            let (branch, _) = resolver.resolve_core(core, hints);
            let branch_values = response.absorb(branch);
            if branch_values.len() != values.len() {
                response.push_error(ResolutionError::CompoundError {
                    origin: core.node_ref(),
                    message: format!(
                        "Unexpected number of columns in compound statement found: {} expected: {}",
                        branch_values.len(),
                        values.len()
                    ),
                });
            }
        }

        let ordering = if select.compounds.is_empty() {
            resolver.with_scope(from_values).with_scope(values.clone())
        } else {
            resolver.with_scope(values.clone())
        };
        for term in &select.order_by {
            response.absorb(ordering.resolve_expr(&term.expr));
        }
        if let Some(limit) = &select.limit {
            response.absorb(resolver.with_scope(values.clone()).resolve_limit(limit));
        }

        response.values = values;
        response
    }

    /// LIMIT and OFFSET expressions; parameters there are integers
    pub(crate) fn resolve_limit(&self, limit: &Limit) -> Response {
        let mut response = Response::default();
        for expr in std::iter::once(&limit.limit).chain(limit.offset.as_ref()) {
            let hint = Value::typed(SqliteType::Integer, false, expr.node_ref());
            response.absorb(self.resolve_expr_hinted(expr, Some(&hint)));
        }
        response
    }

    /// Resolve one branch, also handing back the values its FROM clause
    /// made visible
    pub(crate) fn resolve_core(&self, core: &SelectCore, hints: Option<&[Option<Value>]>) -> (Response, Vec<Value>) {
        match core {
            SelectCore::Values(values) => (self.resolve_values(values, hints), Vec::new()),
            SelectCore::Select(select) => self.resolve_select_clause(select, hints),
        }
    }

    fn resolve_select_clause(&self, select: &SelectClause, hints: Option<&[Option<Value>]>) -> (Response, Vec<Value>) {
        let mut response = Response::default();

        let from_values = match &select.from {
            Some(FromClause::Join(join)) => response.absorb(self.resolve_join_clause(join)),
            Some(FromClause::List(tables)) => {
                let mut values = Vec::new();
                for table in tables {
                    values.extend(response.absorb(self.resolve_table_or_subquery(table)));
                }
                values
            }
            None => Vec::new(),
        };

        let scoped = self.with_scope(from_values.clone());
        if let Some(where_clause) = &select.where_clause {
            response.absorb(scoped.resolve_expr(where_clause));
        }
        for expr in &select.group_by {
            response.absorb(scoped.resolve_expr(expr));
        }

        let mut output = Vec::new();
        for (index, column) in select.columns.iter().enumerate() {
            if let (ResultColumn::Star(span), None) = (column, &select.from) {
                response.push_error(ResolutionError::expression(
                    NodeRef { id: select.id, span: *span },
                    "SELECT * requires a FROM clause",
                ));
                continue;
            }
            let hint = hints.and_then(|hints| hints.get(index)).and_then(Option::as_ref);
            output.extend(response.absorb(scoped.resolve_result_column(column, hint)));
        }

        if let Some(having) = &select.having {
            response.absorb(scoped.with_scope(output.clone()).resolve_expr(having));
        }

        response.values = output;
        (response, from_values)
    }

    /// `VALUES (...), (...)`: every row must match the first row's width
    pub(crate) fn resolve_values(&self, values: &ValuesClause, hints: Option<&[Option<Value>]>) -> Response {
        let mut response = Response::default();
        let mut first: Option<Vec<Value>> = None;

        for row in &values.rows {
            let mut row_values = Vec::new();
            for (index, expr) in row.iter().enumerate() {
                let hint = hints.and_then(|hints| hints.get(index)).and_then(Option::as_ref);
                row_values.extend(response.absorb(self.resolve_expr_hinted(expr, hint)));
            }

            match &first {
                None => first = Some(row_values),
                Some(expected) if expected.len() != row_values.len() => {
                    let origin = row.first().map(Expr::node_ref).unwrap_or(NodeRef {
                        id: values.id,
                        span: values.span,
                    });
                    response.push_error(ResolutionError::ValuesError {
                        origin,
                        message: format!(
                            "Unexpected number of columns in values found: {} expected: {}",
                            row_values.len(),
                            expected.len()
                        ),
                    });
                }
                Some(_) => {}
            }
        }

        response.values = first.unwrap_or_default();
        response
    }

    /// Joins accumulate left to right; each constraint sees only the
    /// relations introduced so far
    pub(crate) fn resolve_join_clause(&self, join: &JoinClause) -> Response {
        let mut response = Response::default();
        let mut values = response.absorb(self.resolve_table_or_subquery(&join.first));

        for clause in &join.joins {
            let mut right = response.absorb(self.resolve_table_or_subquery(&clause.table));

            match clause.operator.kind {
                JoinKind::Left => right.iter_mut().for_each(|v| v.nullable = true),
                JoinKind::Right => values.iter_mut().for_each(|v| v.nullable = true),
                JoinKind::Full => {
                    right.iter_mut().for_each(|v| v.nullable = true);
                    values.iter_mut().for_each(|v| v.nullable = true);
                }
                JoinKind::Comma | JoinKind::Inner | JoinKind::Cross => {}
            }

            match &clause.constraint {
                Some(JoinConstraint::Using(columns)) => {
                    for column in columns {
                        let mut found = true;
                        for side in [&values, &right] {
                            if !side.iter().any(|v| v.matches(&column.value, None) && !v.qualified_only) {
                                found = false;
                                response.push_error(ResolutionError::column_not_found(
                                    column.node_ref(),
                                    &column.value,
                                    side,
                                ));
                            }
                        }
                        // Both sides hold one merged column; the left one answers
                        // unqualified references
                        if found {
                            right
                                .iter_mut()
                                .filter(|v| v.matches(&column.value, None))
                                .for_each(|v| v.qualified_only = true);
                        }
                    }
                    values.extend(right);
                }
                Some(JoinConstraint::On(expr)) => {
                    values.extend(right);
                    response.absorb(self.with_scope(values.clone()).resolve_expr(expr));
                }
                None => values.extend(right),
            }
        }

        response.values = values;
        response
    }

    pub(crate) fn resolve_table_or_subquery(&self, table: &TableOrSubquery) -> Response {
        let mut response = match &table.source {
            TableSource::Table(name) => self.resolve_table_name(name),
            TableSource::Subquery(select) => self.resolve_select_stmt(select),
            TableSource::Nested(tables) => tables
                .iter()
                .fold(Response::default(), |response, table| {
                    response.concat(self.resolve_table_or_subquery(table))
                }),
            TableSource::Join(join) => self.resolve_join_clause(join),
        };

        if let Some(alias) = &table.alias {
            response.values = response
                .values
                .into_iter()
                .map(|value| value.with_table_name(alias.value.clone()))
                .collect();
        }
        response
    }

    /// `*`, `table.*` or `expr [AS alias]` against the innermost scope
    pub(crate) fn resolve_result_column(&self, column: &ResultColumn, hint: Option<&Value>) -> Response {
        match column {
            ResultColumn::Star(_) => {
                Response::new(self.innermost().iter().filter(|v| !v.qualified_only).cloned().collect())
            }
            ResultColumn::TableStar(table) => {
                let values: Vec<Value> = self
                    .innermost()
                    .iter()
                    .filter(|value| {
                        value
                            .table_name
                            .as_deref()
                            .is_some_and(|name| table.matches(name))
                    })
                    .cloned()
                    .map(Value::unhidden)
                    .collect();

                if values.is_empty() {
                    let mut available: Vec<String> = Vec::new();
                    for name in self.innermost().iter().filter_map(|v| v.table_name.as_ref()) {
                        if !available.contains(name) {
                            available.push(name.clone());
                        }
                    }
                    return Response::error(ResolutionError::TableNameNotFound {
                        origin: table.node_ref(),
                        message: format!("No table found with name {}", table.value),
                        available_table_names: available,
                    });
                }
                Response::new(values)
            }
            ResultColumn::Expr { expr, alias } => {
                let mut response = self.resolve_expr_hinted(expr, hint);
                if let Some(alias) = alias {
                    response.values = response
                        .values
                        .into_iter()
                        .map(|value| value.with_column_name(alias.value.clone()))
                        .collect();
                }
                response
            }
        }
    }
}
