//! Statement grammar: definitions, queries and data modification

use std::sync::Arc;

use sqlparser::tokenizer::Token;

use super::{PResult, Parser};
use crate::tree::*;

impl<'s> Parser<'s> {
    /// `stmt (; stmt)*` up to end of input
    pub(crate) fn parse_statements(&mut self) -> PResult<Vec<SqlStmt>> {
        let mut statements = Vec::new();
        loop {
            while self.eat_token(&Token::SemiColon) {}
            if self.at_eof() {
                break;
            }
            statements.push(self.parse_statement()?);
            if !self.at_eof() && !self.is_token(&Token::SemiColon) {
                return self.unexpected("';'");
            }
        }
        Ok(statements)
    }

    /// `[label:] stmt`
    fn parse_statement(&mut self) -> PResult<SqlStmt> {
        let label = if matches!(self.peek().token, Token::Word(_)) && matches!(self.peek_at(1).token, Token::Colon) {
            let label = self.parse_ident()?;
            self.advance();
            Some(label)
        } else {
            None
        };

        let body_start = self.start();
        let kind = if self.is_keyword("CREATE") {
            self.parse_create()?
        } else {
            self.parse_query_statement()?
        };

        Ok(SqlStmt {
            label,
            kind,
            span: self.span_from(body_start),
            id: self.next_id(),
        })
    }

    /// SELECT / VALUES / INSERT / REPLACE / UPDATE / DELETE, with optional WITH
    fn parse_query_statement(&mut self) -> PResult<StmtKind> {
        let start = self.start();
        let with = if self.is_keyword("WITH") {
            Some(self.parse_with_clause()?)
        } else {
            None
        };

        if self.is_keyword("SELECT") || self.is_keyword("VALUES") {
            Ok(StmtKind::Select(self.parse_select_body(start, with)?))
        } else if self.is_keyword("INSERT") || self.is_keyword("REPLACE") {
            Ok(StmtKind::Insert(self.parse_insert(start, with)?))
        } else if self.is_keyword("UPDATE") {
            Ok(StmtKind::Update(self.parse_update(start, with)?))
        } else if self.is_keyword("DELETE") {
            Ok(StmtKind::Delete(self.parse_delete(start, with)?))
        } else {
            self.unexpected("a statement")
        }
    }

    fn parse_create(&mut self) -> PResult<StmtKind> {
        let start = self.start();
        self.expect_keyword("CREATE")?;
        let _temporary = self.eat_keyword("TEMP") || self.eat_keyword("TEMPORARY");
        let unique = self.eat_keyword("UNIQUE");

        if self.eat_keyword("TABLE") {
            self.parse_create_table(start).map(|t| StmtKind::CreateTable(Arc::new(t)))
        } else if !unique && self.eat_keyword("VIEW") {
            self.parse_create_view(start).map(|v| StmtKind::CreateView(Arc::new(v)))
        } else if self.eat_keyword("INDEX") {
            self.parse_create_index(start, unique).map(|i| StmtKind::CreateIndex(Arc::new(i)))
        } else if !unique && self.eat_keyword("TRIGGER") {
            self.parse_create_trigger(start).map(|t| StmtKind::CreateTrigger(Arc::new(t)))
        } else {
            self.unexpected("TABLE, VIEW, INDEX or TRIGGER")
        }
    }

    fn parse_if_not_exists(&mut self) {
        self.eat_keywords(&["IF", "NOT", "EXISTS"]);
    }

    // ---- CREATE TABLE ----

    fn parse_create_table(&mut self, start: usize) -> PResult<CreateTable> {
        self.parse_if_not_exists();
        let name = self.parse_qualified_name()?;
        self.expect_token(&Token::LParen)?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        loop {
            if self.is_any_keyword(&["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"]) {
                constraints.push(self.parse_table_constraint()?);
            } else if constraints.is_empty() {
                columns.push(self.parse_column_def()?);
            } else {
                return self.unexpected("a table constraint");
            }
            if !self.eat_token(&Token::Comma) {
                break;
            }
        }
        self.expect_token(&Token::RParen)?;
        self.eat_keywords(&["WITHOUT", "ROWID"]);

        Ok(CreateTable {
            name,
            columns,
            constraints,
            span: self.span_from(start),
        })
    }

    fn parse_column_def(&mut self) -> PResult<ColumnDef> {
        let start = self.start();
        let name = self.parse_ident()?;
        let type_name = self.parse_type_name(true)?;

        let mut constraints = Vec::new();
        while let Some(constraint) = self.parse_column_constraint()? {
            constraints.push(constraint);
        }

        Ok(ColumnDef {
            name,
            type_name,
            constraints,
            span: self.span_from(start),
        })
    }

    /// Type words, optional `(n[, m])`, and (for columns) an optional
    /// `AS <adapter type>`
    pub(crate) fn parse_type_name(&mut self, allow_adapter: bool) -> PResult<Option<TypeName>> {
        const STOP: &[&str] = &[
            "CONSTRAINT", "PRIMARY", "NOT", "NULL", "UNIQUE", "CHECK", "DEFAULT", "COLLATE",
            "REFERENCES", "GENERATED", "AS",
        ];
        let start = self.start();
        let mut words = Vec::new();
        while let Token::Word(w) = &self.peek().token {
            if w.quote_style.is_none() && STOP.iter().any(|kw| w.value.eq_ignore_ascii_case(kw)) {
                break;
            }
            words.push(w.value.clone());
            self.advance();
        }
        if words.is_empty() {
            return Ok(None);
        }
        if self.eat_token(&Token::LParen) {
            while !self.is_token(&Token::RParen) && !self.at_eof() {
                self.advance();
            }
            self.expect_token(&Token::RParen)?;
        }
        let name = words.join(" ");

        let adapter = if allow_adapter && self.is_keyword("AS") && !matches!(self.peek_at(1).token, Token::LParen) {
            self.advance();
            Some(self.parse_adapter_type()?)
        } else {
            None
        };

        Ok(Some(TypeName {
            name,
            adapter,
            span: self.span_from(start),
        }))
    }

    /// Free-form target type such as `java.util.List<String>`, read up to the
    /// next column constraint, `,` or `)` at nesting depth zero
    fn parse_adapter_type(&mut self) -> PResult<String> {
        let start = self.start();
        let mut depth = 0usize;
        loop {
            match &self.peek().token {
                Token::EOF => break,
                Token::Lt => depth += 1,
                Token::Gt => depth = depth.saturating_sub(1),
                Token::ShiftRight => depth = depth.saturating_sub(2),
                Token::Comma | Token::RParen if depth == 0 => break,
                Token::Word(w) if depth == 0 && w.quote_style.is_none() && is_constraint_start(&w.value) => break,
                _ => {}
            }
            self.advance();
        }
        let span = self.span_from(start);
        if span.start == span.end {
            return self.unexpected("an adapter type");
        }
        Ok(self.text(span).to_string())
    }

    fn parse_column_constraint(&mut self) -> PResult<Option<ColumnConstraint>> {
        let start = self.start();
        let name = if self.eat_keyword("CONSTRAINT") {
            Some(self.parse_ident()?)
        } else {
            None
        };

        let kind = if self.eat_keywords(&["PRIMARY", "KEY"]) {
            let order = self.parse_sort_order();
            self.parse_conflict_clause()?;
            let autoincrement = self.eat_keyword("AUTOINCREMENT");
            ColumnConstraintKind::PrimaryKey { order, autoincrement }
        } else if self.eat_keywords(&["NOT", "NULL"]) {
            self.parse_conflict_clause()?;
            ColumnConstraintKind::NotNull
        } else if self.eat_keyword("NULL") {
            ColumnConstraintKind::Null
        } else if self.eat_keyword("UNIQUE") {
            self.parse_conflict_clause()?;
            ColumnConstraintKind::Unique
        } else if self.eat_keyword("CHECK") {
            self.expect_token(&Token::LParen)?;
            let expr = self.parse_expr()?;
            self.expect_token(&Token::RParen)?;
            ColumnConstraintKind::Check(expr)
        } else if self.eat_keyword("DEFAULT") {
            let expr = if self.eat_token(&Token::LParen) {
                let expr = self.parse_expr()?;
                self.expect_token(&Token::RParen)?;
                expr
            } else {
                self.parse_unary()?
            };
            ColumnConstraintKind::Default(expr)
        } else if self.eat_keyword("COLLATE") {
            ColumnConstraintKind::Collate(self.parse_ident()?)
        } else if self.is_keyword("REFERENCES") {
            ColumnConstraintKind::References(self.parse_foreign_key_clause()?)
        } else if name.is_some() {
            return self.unexpected("a column constraint");
        } else {
            return Ok(None);
        };

        Ok(Some(ColumnConstraint {
            name,
            kind,
            span: self.span_from(start),
        }))
    }

    fn parse_table_constraint(&mut self) -> PResult<TableConstraint> {
        let start = self.start();
        let name = if self.eat_keyword("CONSTRAINT") {
            Some(self.parse_ident()?)
        } else {
            None
        };

        let kind = if self.eat_keywords(&["PRIMARY", "KEY"]) {
            let columns = self.parse_indexed_columns()?;
            self.parse_conflict_clause()?;
            TableConstraintKind::PrimaryKey(columns)
        } else if self.eat_keyword("UNIQUE") {
            let columns = self.parse_indexed_columns()?;
            self.parse_conflict_clause()?;
            TableConstraintKind::Unique(columns)
        } else if self.eat_keyword("CHECK") {
            self.expect_token(&Token::LParen)?;
            let expr = self.parse_expr()?;
            self.expect_token(&Token::RParen)?;
            TableConstraintKind::Check(expr)
        } else if self.eat_keywords(&["FOREIGN", "KEY"]) {
            let columns = self.parse_name_list()?;
            let clause = self.parse_foreign_key_clause()?;
            TableConstraintKind::ForeignKey { columns, clause }
        } else {
            return self.unexpected("PRIMARY KEY, UNIQUE, CHECK or FOREIGN KEY");
        };

        Ok(TableConstraint {
            name,
            kind,
            span: self.span_from(start),
        })
    }

    /// `REFERENCES table [(cols)]` plus any actions and deferral clauses
    fn parse_foreign_key_clause(&mut self) -> PResult<ForeignKeyClause> {
        let start = self.start();
        self.expect_keyword("REFERENCES")?;
        let table = self.parse_qualified_name()?;
        let columns = if self.is_token(&Token::LParen) {
            self.parse_name_list()?
        } else {
            Vec::new()
        };

        loop {
            if self.eat_keyword("ON") {
                if !(self.eat_keyword("DELETE") || self.eat_keyword("UPDATE")) {
                    return self.unexpected("DELETE or UPDATE");
                }
                let action = if self.eat_keyword("SET") {
                    self.eat_keyword("NULL") || self.eat_keyword("DEFAULT")
                } else {
                    self.eat_keywords(&["NO", "ACTION"]) || self.eat_keyword("CASCADE") || self.eat_keyword("RESTRICT")
                };
                if !action {
                    return self.unexpected("a foreign key action");
                }
            } else if self.eat_keyword("MATCH") {
                self.parse_ident()?;
            } else if self.eat_keywords(&["NOT", "DEFERRABLE"]) || self.eat_keyword("DEFERRABLE") {
                if self.eat_keyword("INITIALLY") && !(self.eat_keyword("DEFERRED") || self.eat_keyword("IMMEDIATE")) {
                    return self.unexpected("DEFERRED or IMMEDIATE");
                }
            } else {
                break;
            }
        }

        Ok(ForeignKeyClause {
            table,
            columns,
            span: self.span_from(start),
        })
    }

    /// `ON CONFLICT <resolution>` is accepted and dropped
    fn parse_conflict_clause(&mut self) -> PResult<()> {
        if self.eat_keywords(&["ON", "CONFLICT"]) && self.parse_conflict_action().is_none() {
            return self.unexpected("a conflict resolution");
        }
        Ok(())
    }

    fn parse_conflict_action(&mut self) -> Option<ConflictAction> {
        let action = [
            ("ROLLBACK", ConflictAction::Rollback),
            ("ABORT", ConflictAction::Abort),
            ("REPLACE", ConflictAction::Replace),
            ("FAIL", ConflictAction::Fail),
            ("IGNORE", ConflictAction::Ignore),
        ]
        .into_iter()
        .find(|(kw, _)| self.is_keyword(kw))
        .map(|(_, action)| action)?;
        self.advance();
        Some(action)
    }

    fn parse_sort_order(&mut self) -> Option<SortOrder> {
        if self.eat_keyword("ASC") {
            Some(SortOrder::Asc)
        } else if self.eat_keyword("DESC") {
            Some(SortOrder::Desc)
        } else {
            None
        }
    }

    fn parse_indexed_columns(&mut self) -> PResult<Vec<IndexedColumn>> {
        self.expect_token(&Token::LParen)?;
        let mut columns = Vec::new();
        loop {
            let name = self.parse_ident()?;
            let collate = if self.eat_keyword("COLLATE") {
                Some(self.parse_ident()?)
            } else {
                None
            };
            let order = self.parse_sort_order();
            columns.push(IndexedColumn { name, collate, order });
            if !self.eat_token(&Token::Comma) {
                break;
            }
        }
        self.expect_token(&Token::RParen)?;
        Ok(columns)
    }

    // ---- CREATE VIEW / INDEX / TRIGGER ----

    fn parse_create_view(&mut self, start: usize) -> PResult<CreateView> {
        self.parse_if_not_exists();
        let name = self.parse_qualified_name()?;
        let columns = if self.is_token(&Token::LParen) {
            self.parse_name_list()?
        } else {
            Vec::new()
        };
        self.expect_keyword("AS")?;
        let select = self.parse_select_stmt()?;

        Ok(CreateView {
            name,
            columns,
            select,
            span: self.span_from(start),
        })
    }

    fn parse_create_index(&mut self, start: usize, unique: bool) -> PResult<CreateIndex> {
        self.parse_if_not_exists();
        let name = self.parse_qualified_name()?;
        self.expect_keyword("ON")?;
        let table = self.parse_name()?;
        let columns = self.parse_indexed_columns()?;
        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(CreateIndex {
            name,
            unique,
            table,
            columns,
            where_clause,
            span: self.span_from(start),
        })
    }

    fn parse_create_trigger(&mut self, start: usize) -> PResult<CreateTrigger> {
        self.parse_if_not_exists();
        let name = self.parse_qualified_name()?;

        let timing = if self.eat_keyword("BEFORE") {
            Some(TriggerTiming::Before)
        } else if self.eat_keyword("AFTER") {
            Some(TriggerTiming::After)
        } else if self.eat_keywords(&["INSTEAD", "OF"]) {
            Some(TriggerTiming::InsteadOf)
        } else {
            None
        };

        let event = if self.eat_keyword("DELETE") {
            TriggerEvent::Delete
        } else if self.eat_keyword("INSERT") {
            TriggerEvent::Insert
        } else if self.eat_keyword("UPDATE") {
            let mut columns = Vec::new();
            if self.eat_keyword("OF") {
                columns.push(self.parse_ident()?);
                while self.eat_token(&Token::Comma) {
                    columns.push(self.parse_ident()?);
                }
            }
            TriggerEvent::Update { columns }
        } else {
            return self.unexpected("DELETE, INSERT or UPDATE");
        };

        self.expect_keyword("ON")?;
        let table = self.parse_name()?;
        self.eat_keywords(&["FOR", "EACH", "ROW"]);
        let when = if self.eat_keyword("WHEN") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        self.expect_keyword("BEGIN")?;
        let mut body = Vec::new();
        while !self.is_keyword("END") {
            let stmt_start = self.start();
            let kind = self.parse_query_statement()?;
            body.push(SqlStmt {
                label: None,
                kind,
                span: self.span_from(stmt_start),
                id: self.next_id(),
            });
            self.expect_token(&Token::SemiColon)?;
        }
        self.expect_keyword("END")?;
        if body.is_empty() {
            return self.error("Trigger body must contain at least one statement");
        }

        Ok(CreateTrigger {
            name,
            timing,
            event,
            table,
            when,
            body,
            span: self.span_from(start),
        })
    }

    // ---- SELECT ----

    pub(crate) fn parse_with_clause(&mut self) -> PResult<WithClause> {
        let start = self.start();
        self.expect_keyword("WITH")?;
        let recursive = self.eat_keyword("RECURSIVE");

        let mut tables = Vec::new();
        loop {
            let cte_start = self.start();
            let name = self.parse_name()?;
            let columns = if self.is_token(&Token::LParen) {
                self.parse_name_list()?
            } else {
                Vec::new()
            };
            self.expect_keyword("AS")?;
            self.eat_keywords(&["NOT", "MATERIALIZED"]);
            self.eat_keyword("MATERIALIZED");
            self.expect_token(&Token::LParen)?;
            let select = self.parse_select_stmt()?;
            self.expect_token(&Token::RParen)?;
            tables.push(CommonTable {
                name,
                columns,
                select,
                span: self.span_from(cte_start),
            });
            if !self.eat_token(&Token::Comma) {
                break;
            }
        }

        Ok(WithClause {
            recursive,
            tables,
            span: self.span_from(start),
        })
    }

    /// `[WITH ...] core (op core)* [ORDER BY ...] [LIMIT ...]`
    pub(crate) fn parse_select_stmt(&mut self) -> PResult<SelectStmt> {
        let start = self.start();
        let with = if self.is_keyword("WITH") {
            Some(self.parse_with_clause()?)
        } else {
            None
        };
        self.parse_select_body(start, with)
    }

    fn parse_select_body(&mut self, start: usize, with: Option<WithClause>) -> PResult<SelectStmt> {
        let first = self.parse_select_core()?;

        let mut compounds = Vec::new();
        loop {
            let operator = if self.eat_keywords(&["UNION", "ALL"]) {
                CompoundOperator::UnionAll
            } else if self.eat_keyword("UNION") {
                CompoundOperator::Union
            } else if self.eat_keyword("INTERSECT") {
                CompoundOperator::Intersect
            } else if self.eat_keyword("EXCEPT") {
                CompoundOperator::Except
            } else {
                break;
            };
            compounds.push((operator, self.parse_select_core()?));
        }

        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;

        Ok(SelectStmt {
            with,
            first,
            compounds,
            order_by,
            limit,
            span: self.span_from(start),
            id: self.next_id(),
        })
    }

    fn parse_select_core(&mut self) -> PResult<SelectCore> {
        let start = self.start();
        if self.eat_keyword("VALUES") {
            let mut rows = Vec::new();
            loop {
                self.expect_token(&Token::LParen)?;
                rows.push(self.parse_expr_list()?);
                self.expect_token(&Token::RParen)?;
                if !self.eat_token(&Token::Comma) {
                    break;
                }
            }
            return Ok(SelectCore::Values(ValuesClause {
                rows,
                span: self.span_from(start),
                id: self.next_id(),
            }));
        }

        self.expect_keyword("SELECT")?;
        let distinct = self.eat_keyword("DISTINCT");
        if !distinct {
            self.eat_keyword("ALL");
        }

        let mut columns = vec![self.parse_result_column()?];
        while self.eat_token(&Token::Comma) {
            columns.push(self.parse_result_column()?);
        }

        let from = if self.eat_keyword("FROM") {
            Some(self.parse_from_clause()?)
        } else {
            None
        };
        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let mut group_by = Vec::new();
        let mut having = None;
        if self.eat_keywords(&["GROUP", "BY"]) {
            group_by = self.parse_expr_list()?;
            if self.eat_keyword("HAVING") {
                having = Some(self.parse_expr()?);
            }
        }

        Ok(SelectCore::Select(SelectClause {
            distinct,
            columns,
            from,
            where_clause,
            group_by,
            having,
            span: self.span_from(start),
            id: self.next_id(),
        }))
    }

    fn parse_result_column(&mut self) -> PResult<ResultColumn> {
        if self.is_token(&Token::Mul) {
            let span = self.advance().span;
            return Ok(ResultColumn::Star(span));
        }
        if matches!(self.peek().token, Token::Word(_))
            && matches!(self.peek_at(1).token, Token::Period)
            && matches!(self.peek_at(2).token, Token::Mul)
        {
            let table = self.parse_ident()?;
            self.advance();
            self.advance();
            return Ok(ResultColumn::TableStar(table));
        }

        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;
        Ok(ResultColumn::Expr { expr, alias })
    }

    fn parse_from_clause(&mut self) -> PResult<FromClause> {
        let join = self.parse_join_clause()?;
        Ok(if join.joins.is_empty() {
            FromClause::Join(join)
        } else if join.joins.iter().all(|j| j.operator.kind == JoinKind::Comma && j.constraint.is_none()) {
            let mut tables = vec![join.first];
            tables.extend(join.joins.into_iter().map(|j| j.table));
            FromClause::List(tables)
        } else {
            FromClause::Join(join)
        })
    }

    fn parse_join_clause(&mut self) -> PResult<JoinClause> {
        let start = self.start();
        let first = self.parse_table_or_subquery()?;
        let mut joins = Vec::new();

        while let Some(operator) = self.parse_join_operator()? {
            let join_start = self.prev_end();
            let table = self.parse_table_or_subquery()?;
            let constraint = if self.eat_keyword("ON") {
                Some(JoinConstraint::On(self.parse_expr()?))
            } else if self.eat_keyword("USING") {
                Some(JoinConstraint::Using(self.parse_name_list()?))
            } else {
                None
            };
            joins.push(Join {
                operator,
                table,
                constraint,
                span: self.span_from(join_start),
            });
        }

        Ok(JoinClause {
            first,
            joins,
            span: self.span_from(start),
        })
    }

    fn parse_join_operator(&mut self) -> PResult<Option<JoinOperator>> {
        if self.eat_token(&Token::Comma) {
            return Ok(Some(JoinOperator {
                natural: false,
                kind: JoinKind::Comma,
            }));
        }

        let checkpoint = self.pos;
        let natural = self.eat_keyword("NATURAL");
        let kind = if self.eat_keyword("LEFT") {
            self.eat_keyword("OUTER");
            JoinKind::Left
        } else if self.eat_keyword("RIGHT") {
            self.eat_keyword("OUTER");
            JoinKind::Right
        } else if self.eat_keyword("FULL") {
            self.eat_keyword("OUTER");
            JoinKind::Full
        } else if self.eat_keyword("INNER") {
            JoinKind::Inner
        } else if self.eat_keyword("CROSS") {
            JoinKind::Cross
        } else {
            JoinKind::Inner
        };

        if self.eat_keyword("JOIN") {
            Ok(Some(JoinOperator { natural, kind }))
        } else if self.pos != checkpoint {
            self.unexpected("JOIN")
        } else {
            Ok(None)
        }
    }

    fn parse_table_or_subquery(&mut self) -> PResult<TableOrSubquery> {
        let start = self.start();

        let source = if self.eat_token(&Token::LParen) {
            let source = if self.is_any_keyword(&["SELECT", "VALUES", "WITH"]) {
                TableSource::Subquery(Box::new(self.parse_select_stmt()?))
            } else {
                match self.parse_from_clause()? {
                    FromClause::List(tables) => TableSource::Nested(tables),
                    FromClause::Join(join) if join.joins.is_empty() => TableSource::Nested(vec![join.first]),
                    FromClause::Join(join) => TableSource::Join(Box::new(join)),
                }
            };
            self.expect_token(&Token::RParen)?;
            source
        } else {
            TableSource::Table(self.parse_qualified_name()?)
        };

        let alias = self.parse_optional_alias()?;
        if self.eat_keywords(&["INDEXED", "BY"]) {
            self.parse_ident()?;
        } else {
            self.eat_keywords(&["NOT", "INDEXED"]);
        }

        Ok(TableOrSubquery {
            source,
            alias,
            span: self.span_from(start),
        })
    }

    pub(crate) fn parse_order_by(&mut self) -> PResult<Vec<OrderingTerm>> {
        let mut terms = Vec::new();
        if self.eat_keywords(&["ORDER", "BY"]) {
            loop {
                let expr = self.parse_expr()?;
                let order = self.parse_sort_order();
                let _ = self.eat_keywords(&["NULLS", "FIRST"]) || self.eat_keywords(&["NULLS", "LAST"]);
                terms.push(OrderingTerm { expr, order });
                if !self.eat_token(&Token::Comma) {
                    break;
                }
            }
        }
        Ok(terms)
    }

    /// `LIMIT a [OFFSET b]` or `LIMIT b, a`
    pub(crate) fn parse_limit(&mut self) -> PResult<Option<Limit>> {
        if !self.eat_keyword("LIMIT") {
            return Ok(None);
        }
        let first = self.parse_expr()?;
        if self.eat_keyword("OFFSET") {
            let offset = self.parse_expr()?;
            Ok(Some(Limit {
                limit: first,
                offset: Some(offset),
            }))
        } else if self.eat_token(&Token::Comma) {
            let limit = self.parse_expr()?;
            Ok(Some(Limit {
                limit,
                offset: Some(first),
            }))
        } else {
            Ok(Some(Limit {
                limit: first,
                offset: None,
            }))
        }
    }

    // ---- INSERT / UPDATE / DELETE ----

    fn parse_insert(&mut self, start: usize, with: Option<WithClause>) -> PResult<InsertStmt> {
        let or_action = if self.eat_keyword("REPLACE") {
            Some(ConflictAction::Replace)
        } else {
            self.expect_keyword("INSERT")?;
            if self.eat_keyword("OR") {
                match self.parse_conflict_action() {
                    Some(action) => Some(action),
                    None => return self.unexpected("a conflict resolution"),
                }
            } else {
                None
            }
        };
        self.expect_keyword("INTO")?;
        let table = self.parse_qualified_name()?;
        let alias = if self.eat_keyword("AS") {
            Some(self.parse_ident()?)
        } else {
            None
        };
        let columns = if self.is_token(&Token::LParen) {
            self.parse_name_list()?
        } else {
            Vec::new()
        };

        let source = if self.eat_keywords(&["DEFAULT", "VALUES"]) {
            InsertSource::DefaultValues
        } else {
            InsertSource::Select(Box::new(self.parse_select_stmt()?))
        };

        Ok(InsertStmt {
            with,
            or_action,
            table,
            alias,
            columns,
            source,
            span: self.span_from(start),
        })
    }

    fn parse_update(&mut self, start: usize, with: Option<WithClause>) -> PResult<UpdateStmt> {
        self.expect_keyword("UPDATE")?;
        let or_action = if self.eat_keyword("OR") {
            match self.parse_conflict_action() {
                Some(action) => Some(action),
                None => return self.unexpected("a conflict resolution"),
            }
        } else {
            None
        };
        let table = self.parse_qualified_name()?;
        let alias = if self.eat_keyword("AS") {
            Some(self.parse_ident()?)
        } else {
            None
        };

        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.parse_ident()?;
            if !(self.eat_token(&Token::Eq) || self.eat_token(&Token::DoubleEq)) {
                return self.unexpected("'='");
            }
            let value = self.parse_expr()?;
            assignments.push(Assignment { column, value });
            if !self.eat_token(&Token::Comma) {
                break;
            }
        }

        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;

        Ok(UpdateStmt {
            with,
            or_action,
            table,
            alias,
            assignments,
            where_clause,
            order_by,
            limit,
            span: self.span_from(start),
        })
    }

    fn parse_delete(&mut self, start: usize, with: Option<WithClause>) -> PResult<DeleteStmt> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.parse_qualified_name()?;
        let alias = if self.eat_keyword("AS") {
            Some(self.parse_ident()?)
        } else {
            None
        };
        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;

        Ok(DeleteStmt {
            with,
            table,
            alias,
            where_clause,
            order_by,
            limit,
            span: self.span_from(start),
        })
    }
}

fn is_constraint_start(word: &str) -> bool {
    ["CONSTRAINT", "PRIMARY", "NOT", "NULL", "UNIQUE", "CHECK", "DEFAULT", "COLLATE", "REFERENCES"]
        .iter()
        .any(|kw| kw.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use crate::parser::SqlParser;
    use crate::tree::*;

    fn parse_one(sql: &str) -> StmtKind {
        let mut file = SqlParser::new().parse(sql, None).unwrap();
        assert_eq!(file.statements.len(), 1, "expected exactly one statement");
        file.statements.remove(0).kind
    }

    #[test]
    fn create_table_with_constraints() {
        let StmtKind::CreateTable(table) = parse_one(
            "CREATE TABLE IF NOT EXISTS player (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                team_id INTEGER REFERENCES team(id) ON DELETE CASCADE,
                tags TEXT AS java.util.List<String>,
                score REAL DEFAULT 0.0,
                UNIQUE (name, team_id),
                FOREIGN KEY (team_id) REFERENCES team
            )",
        ) else {
            panic!("not a create table");
        };

        assert_eq!(table.name.value, "player");
        let names: Vec<_> = table.columns.iter().map(|c| c.name.value.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "team_id", "tags", "score"]);
        assert!(table.columns[0].is_primary_key());
        assert!(table.columns[1].is_not_null());
        assert!(table.columns[1].is_unique());
        assert_eq!(
            table.columns[3].type_name.as_ref().unwrap().adapter.as_deref(),
            Some("java.util.List<String>")
        );
        assert_eq!(table.constraints.len(), 2);
    }

    #[test]
    fn select_with_joins_and_compound() {
        let StmtKind::Select(select) = parse_one(
            "WITH recent AS (SELECT * FROM t WHERE x > 1)
             SELECT a.x, b.y AS why FROM a LEFT JOIN b ON a.id = b.id, recent
             UNION ALL SELECT 1, 2
             ORDER BY 1 LIMIT 10 OFFSET ?",
        ) else {
            panic!("not a select");
        };

        assert_eq!(select.with.as_ref().unwrap().tables.len(), 1);
        assert_eq!(select.compounds.len(), 1);
        assert_eq!(select.order_by.len(), 1);
        assert!(select.limit.as_ref().unwrap().offset.is_some());

        let SelectCore::Select(core) = &select.first else {
            panic!("first core should be a select");
        };
        let Some(FromClause::Join(join)) = &core.from else {
            panic!("expected a join clause");
        };
        assert_eq!(join.joins.len(), 2);
        assert_eq!(join.joins[0].operator.kind, JoinKind::Left);
        assert_eq!(join.joins[1].operator.kind, JoinKind::Comma);
    }

    #[test]
    fn comma_list_without_joins() {
        let StmtKind::Select(select) = parse_one("SELECT * FROM a, b AS c") else {
            panic!("not a select");
        };
        let SelectCore::Select(core) = &select.first else {
            panic!("first core should be a select");
        };
        let Some(FromClause::List(tables)) = &core.from else {
            panic!("expected a table list");
        };
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].alias.as_ref().unwrap().value, "c");
    }

    #[test]
    fn trigger_with_body() {
        let StmtKind::CreateTrigger(trigger) = parse_one(
            "CREATE TRIGGER log_update AFTER UPDATE OF name ON player
             FOR EACH ROW WHEN new.name <> old.name
             BEGIN
               INSERT INTO log (message) VALUES (new.name);
               DELETE FROM cache WHERE id = old.id;
             END",
        ) else {
            panic!("not a trigger");
        };

        assert_eq!(trigger.body.len(), 2);
        assert!(matches!(&trigger.event, TriggerEvent::Update { columns } if columns.len() == 1));
        assert!(trigger.when.is_some());
    }

    #[test]
    fn insert_update_delete() {
        assert!(matches!(
            parse_one("INSERT OR REPLACE INTO t (a, b) VALUES (?, ?), (?, ?)"),
            StmtKind::Insert(InsertStmt { or_action: Some(ConflictAction::Replace), .. })
        ));
        assert!(matches!(
            parse_one("UPDATE t SET a = 1, b = :b WHERE id = ?"),
            StmtKind::Update(UpdateStmt { ref assignments, .. }) if assignments.len() == 2
        ));
        assert!(matches!(parse_one("DELETE FROM t WHERE id IN ?"), StmtKind::Delete(_)));
    }

    #[test]
    fn view_and_index() {
        assert!(matches!(
            parse_one("CREATE VIEW v (a, b) AS SELECT x, y FROM t"),
            StmtKind::CreateView(ref view) if view.columns.len() == 2
        ));
        assert!(matches!(
            parse_one("CREATE UNIQUE INDEX idx ON t (a, b DESC) WHERE a IS NOT NULL"),
            StmtKind::CreateIndex(ref index) if index.unique && index.where_clause.is_some()
        ));
    }
}
