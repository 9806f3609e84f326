//! Resolution results and errors

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::symbol_table::Dependency;
use crate::tree::{BindParameter, Expr, ExprKind, NodeRef, Span};
use crate::value::Value;

/// Outcome of resolving one node
///
/// Responses accumulate: combining two concatenates their values and errors
/// in order and unions what they depended on.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Exposed columns, in position order
    pub values: Vec<Value>,

    /// Problems found while resolving
    pub errors: Vec<ResolutionError>,

    /// Symbol table sources consulted
    pub dependencies: BTreeSet<Dependency>,

    /// Bind parameter occurrences, in resolution order
    pub arguments: Vec<BindArgument>,
}

impl Response {
    /// Create a response exposing `values`
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Create a response carrying a single error
    pub fn error(error: ResolutionError) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }

    /// Concatenate `other` onto this response
    pub fn concat(mut self, other: Response) -> Self {
        let values = self.absorb(other);
        self.values.extend(values);
        self
    }

    /// Take over `other`'s errors, dependencies and arguments, handing back
    /// its values for the caller to place
    pub fn absorb(&mut self, other: Response) -> Vec<Value> {
        self.errors.extend(other.errors);
        self.dependencies.extend(other.dependencies);
        self.arguments.extend(other.arguments);
        other.values
    }

    pub fn push_error(&mut self, error: ResolutionError) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Whether a parameter stands for one value or a list of values (`IN ?`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentKind {
    SingleValue,
    SetOfValues,
}

/// One bind parameter occurrence, with the value whose position it fills
#[derive(Debug, Clone, PartialEq)]
pub struct BindArgument {
    pub kind: ArgumentKind,
    pub parameter: BindParameter,
    pub element: NodeRef,
    /// Value the parameter is compared with, assigned to or cast to
    pub value: Option<Value>,
}

impl BindArgument {
    /// Record the parameter `expr`, or `None` if it is not one
    pub fn from_expr(expr: &Expr, kind: ArgumentKind, value: Option<Value>) -> Option<Self> {
        match &expr.kind {
            ExprKind::BindParameter(parameter) => Some(Self {
                kind,
                parameter: parameter.clone(),
                element: expr.node_ref(),
                value,
            }),
            _ => None,
        }
    }

    pub fn span(&self) -> Span {
        self.element.span
    }
}

/// A semantic problem found during resolution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("{message}")]
    ColumnNameNotFound {
        origin: NodeRef,
        message: String,
        available_columns: Vec<String>,
    },

    #[error("{message}")]
    ColumnOrTableNameNotFound {
        origin: NodeRef,
        message: String,
        available_columns: Vec<String>,
        table_name: Option<String>,
    },

    /// Invalid or ambiguous expression
    #[error("{message}")]
    ExpressionError { origin: NodeRef, message: String },

    #[error("{message}")]
    CompoundError { origin: NodeRef, message: String },

    #[error("{message}")]
    ValuesError { origin: NodeRef, message: String },

    #[error("{message}")]
    RecursiveResolution { origin: NodeRef, message: String },

    #[error("{message}")]
    CreateTableError { origin: NodeRef, message: String },

    #[error("{message}")]
    InsertError { origin: NodeRef, message: String },

    #[error("{message}")]
    TableNameNotFound {
        origin: NodeRef,
        message: String,
        available_table_names: Vec<String>,
    },

    #[error("{message}")]
    WithTableError { origin: NodeRef, message: String },

    /// A tree shape the resolver does not expect
    #[error("{message}")]
    IncompleteRule { origin: NodeRef, message: String },
}

impl ResolutionError {
    /// Node the error is reported at
    pub fn origin(&self) -> NodeRef {
        match self {
            Self::ColumnNameNotFound { origin, .. }
            | Self::ColumnOrTableNameNotFound { origin, .. }
            | Self::ExpressionError { origin, .. }
            | Self::CompoundError { origin, .. }
            | Self::ValuesError { origin, .. }
            | Self::RecursiveResolution { origin, .. }
            | Self::CreateTableError { origin, .. }
            | Self::InsertError { origin, .. }
            | Self::TableNameNotFound { origin, .. }
            | Self::WithTableError { origin, .. }
            | Self::IncompleteRule { origin, .. } => *origin,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::ColumnNameNotFound { message, .. }
            | Self::ColumnOrTableNameNotFound { message, .. }
            | Self::ExpressionError { message, .. }
            | Self::CompoundError { message, .. }
            | Self::ValuesError { message, .. }
            | Self::RecursiveResolution { message, .. }
            | Self::CreateTableError { message, .. }
            | Self::InsertError { message, .. }
            | Self::TableNameNotFound { message, .. }
            | Self::WithTableError { message, .. }
            | Self::IncompleteRule { message, .. } => message,
        }
    }

    /// Names that were visible where a lookup failed
    pub fn candidates(&self) -> &[String] {
        match self {
            Self::ColumnNameNotFound { available_columns, .. }
            | Self::ColumnOrTableNameNotFound { available_columns, .. } => available_columns,
            Self::TableNameNotFound { available_table_names, .. } => available_table_names,
            _ => &[],
        }
    }

    pub fn expression(origin: NodeRef, message: impl Into<String>) -> Self {
        Self::ExpressionError {
            origin,
            message: message.into(),
        }
    }

    pub fn create_table(origin: NodeRef, message: impl Into<String>) -> Self {
        Self::CreateTableError {
            origin,
            message: message.into(),
        }
    }

    pub fn column_not_found(origin: NodeRef, column: &str, available: &[Value]) -> Self {
        Self::ColumnNameNotFound {
            origin,
            message: format!("No column found with name {}", column),
            available_columns: column_names(available),
        }
    }
}

/// Distinct column names of `values`, in order
pub fn column_names(values: &[Value]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in values.iter().filter_map(|v| v.column_name.as_ref()) {
        if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            names.push(name.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeId, SourceId};
    use sqlsight_core::SqliteType;

    fn node(index: u32) -> NodeRef {
        NodeRef {
            id: NodeId {
                source: SourceId::fresh(),
                index,
            },
            span: Span::new(0, 1),
        }
    }

    #[test]
    fn concat_keeps_order() {
        let a = Response::new(vec![Value::typed(SqliteType::Integer, false, node(0))]);
        let mut b = Response::new(vec![Value::typed(SqliteType::Text, true, node(1))]);
        b.push_error(ResolutionError::expression(node(2), "bad"));
        b.dependencies.insert(Dependency::AnySource);

        let combined = a.concat(b);
        let types: Vec<_> = combined.values.iter().map(|v| v.sqlite_type).collect();
        assert_eq!(types, vec![SqliteType::Integer, SqliteType::Text]);
        assert_eq!(combined.errors.len(), 1);
        assert!(combined.dependencies.contains(&Dependency::AnySource));
    }

    #[test]
    fn error_accessors() {
        let error = ResolutionError::TableNameNotFound {
            origin: node(3),
            message: "No table found with name foo".to_string(),
            available_table_names: vec!["food".to_string()],
        };
        assert_eq!(error.to_string(), "No table found with name foo");
        assert_eq!(error.candidates().to_vec(), vec!["food".to_string()]);
        assert_eq!(error.origin().id.index, 3);
    }
}
