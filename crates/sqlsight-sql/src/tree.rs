//! Positioned parse tree
//!
//! This is the interface between the front-end and the analyzer. Every node
//! that can originate a resolved value or a diagnostic carries a [`NodeId`]
//! (unique across every parsed source) and a byte [`Span`] into its source.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

static NEXT_SOURCE: AtomicU32 = AtomicU32::new(1);

/// Identity of one parsed source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(u32);

impl SourceId {
    /// Allocate an id no other parse in this process has used
    pub fn fresh() -> Self {
        Self(NEXT_SOURCE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of one node; equal ids mean the same declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub source: SourceId,
    pub index: u32,
}

/// Half-open byte range into a source text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Slice `text` to this span (empty if out of range)
    pub fn slice(self, text: &str) -> &str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

/// Reference to an originating node, carried by values and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub span: Span,
}

/// A name as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub value: String,
    pub span: Span,
    pub id: NodeId,
}

impl Ident {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef { id: self.id, span: self.span }
    }

    /// SQL names compare case-insensitively
    pub fn matches(&self, name: &str) -> bool {
        self.value.eq_ignore_ascii_case(name)
    }
}

/// One parsed source file
#[derive(Debug, Clone)]
pub struct SqlFile {
    pub source: SourceId,
    pub path: Option<PathBuf>,
    pub text: String,
    pub statements: Vec<SqlStmt>,
}

impl SqlFile {
    /// 1-based (line, column) of a byte offset
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        line_col(&self.text, offset)
    }

    /// Display name: the path if there is one
    pub fn display_name(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<input>".to_string())
    }

    /// Statements that carry a label
    pub fn named_statements(&self) -> impl Iterator<Item = (&Ident, &SqlStmt)> {
        self.statements
            .iter()
            .filter_map(|stmt| stmt.label.as_ref().map(|label| (label, stmt)))
    }
}

/// 1-based (line, column) of a byte offset, columns counted in chars
pub fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text[..floor_char_boundary(text, offset)];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// A top-level statement, optionally labelled (`name: SELECT ...`)
#[derive(Debug, Clone)]
pub struct SqlStmt {
    pub label: Option<Ident>,
    pub kind: StmtKind,
    pub span: Span,
    pub id: NodeId,
}

impl SqlStmt {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef { id: self.id, span: self.span }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    CreateTable(Arc<CreateTable>),
    CreateView(Arc<CreateView>),
    CreateIndex(Arc<CreateIndex>),
    CreateTrigger(Arc<CreateTrigger>),
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

impl StmtKind {
    /// Short lower-case name of the statement kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::CreateTable(_) => "create_table",
            Self::CreateView(_) => "create_view",
            Self::CreateIndex(_) => "create_index",
            Self::CreateTrigger(_) => "create_trigger",
            Self::Select(_) => "select",
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

// ---- definitions ----

#[derive(Debug, Clone)]
pub struct CreateTable {
    pub name: Ident,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    /// The name node is the column's identity
    pub name: Ident,
    pub type_name: Option<TypeName>,
    pub constraints: Vec<ColumnConstraint>,
    pub span: Span,
}

impl ColumnDef {
    pub fn is_primary_key(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c.kind, ColumnConstraintKind::PrimaryKey { .. }))
    }

    pub fn is_not_null(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c.kind, ColumnConstraintKind::NotNull))
    }

    pub fn is_unique(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c.kind, ColumnConstraintKind::Unique))
    }
}

/// Declared type, with an optional target adapter type (`TEXT AS Foo`)
#[derive(Debug, Clone)]
pub struct TypeName {
    pub name: String,
    pub adapter: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ColumnConstraint {
    pub name: Option<Ident>,
    pub kind: ColumnConstraintKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ColumnConstraintKind {
    PrimaryKey { order: Option<SortOrder>, autoincrement: bool },
    NotNull,
    Null,
    Unique,
    Check(Expr),
    Default(Expr),
    Collate(Ident),
    References(ForeignKeyClause),
}

#[derive(Debug, Clone)]
pub struct TableConstraint {
    pub name: Option<Ident>,
    pub kind: TableConstraintKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TableConstraintKind {
    PrimaryKey(Vec<IndexedColumn>),
    Unique(Vec<IndexedColumn>),
    Check(Expr),
    ForeignKey { columns: Vec<Ident>, clause: ForeignKeyClause },
}

#[derive(Debug, Clone)]
pub struct ForeignKeyClause {
    pub table: Ident,
    pub columns: Vec<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct IndexedColumn {
    pub name: Ident,
    pub collate: Option<Ident>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct CreateView {
    pub name: Ident,
    pub columns: Vec<Ident>,
    pub select: SelectStmt,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CreateIndex {
    pub name: Ident,
    pub unique: bool,
    pub table: Ident,
    pub columns: Vec<IndexedColumn>,
    pub where_clause: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CreateTrigger {
    pub name: Ident,
    pub timing: Option<TriggerTiming>,
    pub event: TriggerEvent,
    pub table: Ident,
    pub when: Option<Expr>,
    /// Select, insert, update or delete statements
    pub body: Vec<SqlStmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

#[derive(Debug, Clone)]
pub enum TriggerEvent {
    Delete,
    Insert,
    Update { columns: Vec<Ident> },
}

// ---- queries ----

#[derive(Debug, Clone)]
pub struct WithClause {
    pub recursive: bool,
    pub tables: Vec<CommonTable>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CommonTable {
    pub name: Ident,
    pub columns: Vec<Ident>,
    pub select: SelectStmt,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SelectStmt {
    pub with: Option<WithClause>,
    pub first: SelectCore,
    pub compounds: Vec<(CompoundOperator, SelectCore)>,
    pub order_by: Vec<OrderingTerm>,
    pub limit: Option<Limit>,
    pub span: Span,
    pub id: NodeId,
}

impl SelectStmt {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef { id: self.id, span: self.span }
    }

    pub fn cores(&self) -> impl Iterator<Item = &SelectCore> {
        std::iter::once(&self.first).chain(self.compounds.iter().map(|(_, core)| core))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

/// One SELECT or VALUES branch of a (compound) select
#[derive(Debug, Clone)]
pub enum SelectCore {
    Select(SelectClause),
    Values(ValuesClause),
}

impl SelectCore {
    pub fn span(&self) -> Span {
        match self {
            Self::Select(select) => select.span,
            Self::Values(values) => values.span,
        }
    }

    pub fn node_ref(&self) -> NodeRef {
        match self {
            Self::Select(select) => NodeRef { id: select.id, span: select.span },
            Self::Values(values) => NodeRef { id: values.id, span: values.span },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectClause {
    pub distinct: bool,
    pub columns: Vec<ResultColumn>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub span: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone)]
pub struct ValuesClause {
    pub rows: Vec<Vec<Expr>>,
    pub span: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone)]
pub enum FromClause {
    /// `FROM a JOIN b ON ...`
    Join(JoinClause),
    /// `FROM a, b` with no join keywords
    List(Vec<TableOrSubquery>),
}

#[derive(Debug, Clone)]
pub struct JoinClause {
    pub first: TableOrSubquery,
    pub joins: Vec<Join>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub operator: JoinOperator,
    pub table: TableOrSubquery,
    pub constraint: Option<JoinConstraint>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOperator {
    pub natural: bool,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Comma,
    Inner,
    Cross,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone)]
pub enum JoinConstraint {
    On(Expr),
    Using(Vec<Ident>),
}

#[derive(Debug, Clone)]
pub struct TableOrSubquery {
    pub source: TableSource,
    pub alias: Option<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TableSource {
    Table(Ident),
    Subquery(Box<SelectStmt>),
    /// `(a, b)`
    Nested(Vec<TableOrSubquery>),
    /// `(a JOIN b ON ...)`
    Join(Box<JoinClause>),
}

#[derive(Debug, Clone)]
pub enum ResultColumn {
    Star(Span),
    TableStar(Ident),
    Expr { expr: Expr, alias: Option<Ident> },
}

#[derive(Debug, Clone)]
pub struct OrderingTerm {
    pub expr: Expr,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone)]
pub struct Limit {
    pub limit: Expr,
    pub offset: Option<Expr>,
}

// ---- data modification ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    Rollback,
    Abort,
    Replace,
    Fail,
    Ignore,
}

#[derive(Debug, Clone)]
pub struct InsertStmt {
    pub with: Option<WithClause>,
    pub or_action: Option<ConflictAction>,
    pub table: Ident,
    pub alias: Option<Ident>,
    pub columns: Vec<Ident>,
    pub source: InsertSource,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum InsertSource {
    /// `VALUES (...)` or `SELECT ...`
    Select(Box<SelectStmt>),
    DefaultValues,
}

#[derive(Debug, Clone)]
pub struct UpdateStmt {
    pub with: Option<WithClause>,
    pub or_action: Option<ConflictAction>,
    pub table: Ident,
    pub alias: Option<Ident>,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderingTerm>,
    pub limit: Option<Limit>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct DeleteStmt {
    pub with: Option<WithClause>,
    pub table: Ident,
    pub alias: Option<Ident>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderingTerm>,
    pub limit: Option<Limit>,
    pub span: Span,
}

// ---- expressions ----

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Column { table: Option<Ident>, column: Ident },
    BindParameter(BindParameter),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Function { name: Ident, distinct: bool, args: FunctionArgs },
    Cast { expr: Box<Expr>, type_name: TypeName },
    Collate { expr: Box<Expr>, collation: Ident },
    Like {
        expr: Box<Expr>,
        not: bool,
        op: LikeOp,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
    },
    /// `ISNULL`, `NOTNULL`, `NOT NULL`
    Null { expr: Box<Expr>, not: bool },
    Is { left: Box<Expr>, not: bool, right: Box<Expr> },
    Between { expr: Box<Expr>, not: bool, low: Box<Expr>, high: Box<Expr> },
    In { expr: Box<Expr>, not: bool, target: InTarget },
    Exists { not: bool, select: Box<SelectStmt> },
    Subquery(Box<SelectStmt>),
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    Raise { action: RaiseAction, message: Option<String> },
    Nested(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Integer(String),
    Real(String),
    String(String),
    Blob(String),
    Null,
    CurrentTime,
    CurrentDate,
    CurrentTimestamp,
}

/// A bind parameter occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindParameter {
    /// `?`
    Anonymous,
    /// `?N`
    Indexed(u32),
    /// `:name`, `@name`, `$name`
    Named { prefix: char, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    BitNot,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Concat,
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Lt | Self::LtEq | Self::Gt | Self::GtEq | Self::Eq | Self::NotEq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOp {
    Like,
    Glob,
    Regexp,
    Match,
}

#[derive(Debug, Clone)]
pub enum FunctionArgs {
    /// `count(*)`
    Star,
    List(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum InTarget {
    List(Vec<Expr>),
    Select(Box<SelectStmt>),
    Table(Ident),
    /// `IN ?`: one parameter standing for a list of values
    Bind(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaiseAction {
    Ignore,
    Rollback,
    Abort,
    Fail,
}

impl Expr {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef { id: self.id, span: self.span }
    }

    /// Visit this expression and every expression nested in it, pre-order.
    ///
    /// Subquery bodies are not entered; the subquery expression itself is
    /// visited.
    pub fn walk<'e>(&'e self, f: &mut impl FnMut(&'e Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::Column { .. }
            | ExprKind::BindParameter(_)
            | ExprKind::Raise { .. }
            | ExprKind::Exists { .. }
            | ExprKind::Subquery(_) => {}
            ExprKind::Unary { expr, .. }
            | ExprKind::Cast { expr, .. }
            | ExprKind::Collate { expr, .. }
            | ExprKind::Null { expr, .. }
            | ExprKind::Nested(expr) => expr.walk(f),
            ExprKind::Binary { left, right, .. } | ExprKind::Is { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Function { args, .. } => {
                if let FunctionArgs::List(args) = args {
                    for arg in args {
                        arg.walk(f);
                    }
                }
            }
            ExprKind::Like { expr, pattern, escape, .. } => {
                expr.walk(f);
                pattern.walk(f);
                if let Some(escape) = escape {
                    escape.walk(f);
                }
            }
            ExprKind::Between { expr, low, high, .. } => {
                expr.walk(f);
                low.walk(f);
                high.walk(f);
            }
            ExprKind::In { expr, target, .. } => {
                expr.walk(f);
                match target {
                    InTarget::List(items) => {
                        for item in items {
                            item.walk(f);
                        }
                    }
                    InTarget::Bind(bind) => bind.walk(f),
                    InTarget::Select(_) | InTarget::Table(_) => {}
                }
            }
            ExprKind::Case { operand, branches, else_expr } => {
                if let Some(operand) = operand {
                    operand.walk(f);
                }
                for (when, then) in branches {
                    when.walk(f);
                    then.walk(f);
                }
                if let Some(else_expr) = else_expr {
                    else_expr.walk(f);
                }
            }
        }
    }

    /// Whether a subquery appears anywhere in this expression
    pub fn contains_subquery(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr| {
            if matches!(
                expr.kind,
                ExprKind::Subquery(_)
                    | ExprKind::Exists { .. }
                    | ExprKind::In { target: InTarget::Select(_), .. }
            ) {
                found = true;
            }
        });
        found
    }

    /// First bind parameter anywhere in this expression
    pub fn first_bind_parameter(&self) -> Option<&Expr> {
        let mut found = None;
        self.walk(&mut |expr| {
            if found.is_none() && matches!(expr.kind, ExprKind::BindParameter(_)) {
                found = Some(expr);
            }
        });
        found
    }
}
