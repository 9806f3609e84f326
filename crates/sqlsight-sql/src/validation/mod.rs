//! Statement validators
//!
//! Each rule resolves the parts of a statement it needs through the
//! [`Resolver`] and appends what it finds wrong to the [`Response`]. Like
//! resolution, validation never stops at the first problem.

mod create_table;
mod definitions;
mod modification;

use crate::resolver::{ResolutionError, Resolver, Response};
use crate::symbol_table::SymbolTable;
use crate::tree::*;
use crate::value::Value;

/// Validates statements against one symbol table snapshot
#[derive(Debug, Clone)]
pub struct Validator<'a> {
    resolver: Resolver<'a>,

    /// Where bind parameters are rejected, the construct named in the error
    bind_context: Option<&'static str>,
}

/// What an expression may contain where it appears
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExprRules {
    pub subqueries_allowed: bool,
    pub binds_allowed: bool,
    pub context: &'static str,
}

impl<'a> Validator<'a> {
    /// Create a new validator
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            resolver: Resolver::new(symbols),
            bind_context: None,
        }
    }

    fn nested(resolver: Resolver<'a>, bind_context: &'static str) -> Self {
        Self {
            resolver,
            bind_context: Some(bind_context),
        }
    }

    /// Resolve and check one statement
    ///
    /// The response carries the statement's output values (for selects),
    /// every error found, the sources consulted and the bind parameters
    /// in resolution order.
    pub fn validate(&self, stmt: &SqlStmt) -> Response {
        let mut response = match &stmt.kind {
            StmtKind::CreateTable(table) => self.validate_create_table(table),
            StmtKind::CreateView(view) => self.validate_create_view(view),
            StmtKind::CreateIndex(index) => self.validate_create_index(index),
            StmtKind::CreateTrigger(trigger) => self.validate_create_trigger(trigger),
            StmtKind::Select(select) => self.resolver.resolve_select_stmt(select),
            StmtKind::Insert(insert) => self.validate_insert(insert),
            StmtKind::Update(update) => self.validate_update(update),
            StmtKind::Delete(delete) => self.validate_delete(delete),
        };

        if let Some(context) = self.bind_context {
            reject_arguments(&mut response, context);
        }

        tracing::trace!(
            kind = stmt.kind.kind_name(),
            errors = response.errors.len(),
            arguments = response.arguments.len(),
            "validated statement"
        );
        response
    }

    /// Resolve an expression under `rules`
    pub(crate) fn check_expr(
        &self,
        resolver: &Resolver<'_>,
        expr: &Expr,
        hint: Option<&Value>,
        rules: ExprRules,
    ) -> Response {
        let mut response = resolver.resolve_expr_hinted(expr, hint);

        if !rules.subqueries_allowed && expr.contains_subquery() {
            response.push_error(ResolutionError::expression(
                expr.node_ref(),
                format!("Subqueries are not permitted as part of {}", rules.context),
            ));
        }
        if !rules.binds_allowed {
            reject_arguments(&mut response, rules.context);
        }
        response
    }

    /// Values of the target of an INSERT, UPDATE or DELETE, under its alias
    pub(crate) fn target_values(&self, resolver: &Resolver<'_>, table: &Ident, alias: Option<&Ident>) -> Response {
        let mut response = resolver.resolve_table_name(table);
        if let Some(alias) = alias {
            response.values = response
                .values
                .into_iter()
                .map(|value| value.with_table_name(alias.value.clone()))
                .collect();
        }
        response
    }
}

/// Turn every recorded bind parameter into an error
fn reject_arguments(response: &mut Response, context: &str) {
    for argument in std::mem::take(&mut response.arguments) {
        response.push_error(ResolutionError::expression(
            argument.element,
            format!("Cannot bind arguments in {}", context),
        ));
    }
}

/// Look up a column of `values` by name, reporting it if missing
pub(crate) fn require_column(values: &[Value], column: &Ident, response: &mut Response) -> Option<Value> {
    match values.iter().find(|value| value.matches(&column.value, None)) {
        Some(value) => Some(value.clone()),
        None => {
            response.push_error(ResolutionError::column_not_found(column.node_ref(), &column.value, values));
            None
        }
    }
}
