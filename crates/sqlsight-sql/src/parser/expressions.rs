//! Expression grammar, lowest precedence first:
//! `OR`, `AND`, `NOT`, equality and pattern operators, comparison,
//! bitwise, additive, multiplicative, `||`, unary, `COLLATE`.

use sqlparser::tokenizer::{Token, Word};

use super::{PResult, Parser};
use crate::tree::*;

impl<'s> Parser<'s> {
    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    /// `expr (, expr)*`
    pub(crate) fn parse_expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat_token(&Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.to(right.span);
        self.expr(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }

    fn expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            kind,
            span,
            id: self.next_id(),
        }
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = self.binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not()?;
            left = self.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.is_keyword("NOT") && !self.is_keyword_at(1, "EXISTS") {
            let start = self.start();
            self.advance();
            let expr = self.parse_not()?;
            let span = self.span_from(start);
            return Ok(self.expr(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                },
                span,
            ));
        }
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let start = left.span.start;

            if self.eat_token(&Token::Eq) || self.eat_token(&Token::DoubleEq) {
                let right = self.parse_comparison()?;
                left = self.binary(BinaryOp::Eq, left, right);
                continue;
            }
            if self.eat_token(&Token::Neq) {
                let right = self.parse_comparison()?;
                left = self.binary(BinaryOp::NotEq, left, right);
                continue;
            }

            if self.eat_keyword("IS") {
                let not = self.eat_keyword("NOT");
                self.eat_keywords(&["DISTINCT", "FROM"]);
                let right = self.parse_comparison()?;
                let span = self.span_from(start);
                left = self.expr(
                    ExprKind::Is {
                        left: Box::new(left),
                        not,
                        right: Box::new(right),
                    },
                    span,
                );
                continue;
            }

            if self.eat_keyword("ISNULL") || self.eat_keyword("NOTNULL") || self.eat_keywords(&["NOT", "NULL"]) {
                let not = !self.is_prev_keyword("ISNULL");
                let span = self.span_from(start);
                left = self.expr(ExprKind::Null { expr: Box::new(left), not }, span);
                continue;
            }

            let offset = usize::from(self.is_keyword("NOT"));
            let not = offset == 1;

            if self.is_keyword_at(offset, "IN") {
                self.advance();
                if not {
                    self.advance();
                }
                let target = self.parse_in_target()?;
                let span = self.span_from(start);
                left = self.expr(
                    ExprKind::In {
                        expr: Box::new(left),
                        not,
                        target,
                    },
                    span,
                );
                continue;
            }

            let like = [
                ("LIKE", LikeOp::Like),
                ("GLOB", LikeOp::Glob),
                ("REGEXP", LikeOp::Regexp),
                ("MATCH", LikeOp::Match),
            ]
            .into_iter()
            .find(|(kw, _)| self.is_keyword_at(offset, kw))
            .map(|(_, op)| op);
            if let Some(op) = like {
                self.advance();
                if not {
                    self.advance();
                }
                let pattern = self.parse_comparison()?;
                let escape = if self.eat_keyword("ESCAPE") {
                    Some(Box::new(self.parse_comparison()?))
                } else {
                    None
                };
                let span = self.span_from(start);
                left = self.expr(
                    ExprKind::Like {
                        expr: Box::new(left),
                        not,
                        op,
                        pattern: Box::new(pattern),
                        escape,
                    },
                    span,
                );
                continue;
            }

            if self.is_keyword_at(offset, "BETWEEN") {
                self.advance();
                if not {
                    self.advance();
                }
                let low = self.parse_comparison()?;
                self.expect_keyword("AND")?;
                let high = self.parse_comparison()?;
                let span = self.span_from(start);
                left = self.expr(
                    ExprKind::Between {
                        expr: Box::new(left),
                        not,
                        low: Box::new(low),
                        high: Box::new(high),
                    },
                    span,
                );
                continue;
            }

            return Ok(left);
        }
    }

    fn is_prev_keyword(&self, kw: &str) -> bool {
        self.pos > 0
            && matches!(&self.tokens[self.pos - 1].token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(kw))
    }

    fn parse_in_target(&mut self) -> PResult<InTarget> {
        if self.eat_token(&Token::LParen) {
            let target = if self.is_any_keyword(&["SELECT", "VALUES", "WITH"]) {
                InTarget::Select(Box::new(self.parse_select_stmt()?))
            } else if self.is_token(&Token::RParen) {
                InTarget::List(Vec::new())
            } else {
                InTarget::List(self.parse_expr_list()?)
            };
            self.expect_token(&Token::RParen)?;
            return Ok(target);
        }

        if self.is_bind_parameter() {
            return Ok(InTarget::Bind(Box::new(self.parse_primary()?)));
        }

        Ok(InTarget::Table(self.parse_qualified_name()?))
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitwise()?;
        loop {
            let op = match self.peek().token {
                Token::Lt => BinaryOp::Lt,
                Token::LtEq => BinaryOp::LtEq,
                Token::Gt => BinaryOp::Gt,
                Token::GtEq => BinaryOp::GtEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_bitwise()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_bitwise(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().token {
                Token::Ampersand => BinaryOp::BitAnd,
                Token::Pipe => BinaryOp::BitOr,
                Token::ShiftLeft => BinaryOp::ShiftLeft,
                Token::ShiftRight => BinaryOp::ShiftRight,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_concat()?;
        loop {
            let op = match self.peek().token {
                Token::Mul => BinaryOp::Multiply,
                Token::Div => BinaryOp::Divide,
                Token::Mod => BinaryOp::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_concat()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_concat(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.eat_token(&Token::StringConcat) {
            let right = self.parse_unary()?;
            left = self.binary(BinaryOp::Concat, left, right);
        }
        Ok(left)
    }

    pub(crate) fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek().token {
            Token::Minus => UnaryOp::Minus,
            Token::Plus => UnaryOp::Plus,
            Token::Tilde => UnaryOp::BitNot,
            _ => return self.parse_collate(),
        };
        let start = self.start();
        self.advance();
        let expr = self.parse_unary()?;
        let span = self.span_from(start);
        Ok(self.expr(ExprKind::Unary { op, expr: Box::new(expr) }, span))
    }

    fn parse_collate(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.eat_keyword("COLLATE") {
            let collation = self.parse_ident()?;
            let span = expr.span.to(collation.span);
            expr = self.expr(
                ExprKind::Collate {
                    expr: Box::new(expr),
                    collation,
                },
                span,
            );
        }
        Ok(expr)
    }

    /// Whether the next tokens form a bind parameter
    fn is_bind_parameter(&self) -> bool {
        match &self.peek().token {
            Token::Placeholder(_) => true,
            Token::Colon | Token::AtSign => {
                matches!(self.peek_at(1).token, Token::Word(_)) && self.peek_at(1).span.start == self.peek().span.end
            }
            Token::Word(w) => w.quote_style.is_none() && (w.value.starts_with('@') || w.value.starts_with('$')),
            _ => false,
        }
    }

    fn parse_bind_parameter(&mut self) -> PResult<Expr> {
        let start = self.start();
        let parameter = match self.advance().token {
            Token::Placeholder(text) | Token::Word(Word { value: text, .. }) => placeholder(&text),
            Token::Colon => Some(BindParameter::Named {
                prefix: ':',
                name: self.parse_ident()?.value,
            }),
            Token::AtSign => Some(BindParameter::Named {
                prefix: '@',
                name: self.parse_ident()?.value,
            }),
            _ => return self.error("Expected a bind parameter"),
        };
        let span = self.span_from(start);
        let Some(parameter) = parameter else {
            return Err(super::SyntaxError {
                message: format!("Bind parameter index must be between 1 and {}", MAX_BIND_INDEX),
                span,
            });
        };
        Ok(self.expr(ExprKind::BindParameter(parameter), span))
    }

    pub(crate) fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.start();

        if self.is_bind_parameter() {
            return self.parse_bind_parameter();
        }

        let kind = match self.peek().token.clone() {
            Token::Number(number, _) => {
                self.advance();
                let hex = number.starts_with("0x") || number.starts_with("0X");
                if !hex && number.contains(['.', 'e', 'E']) {
                    ExprKind::Literal(Literal::Real(number))
                } else {
                    ExprKind::Literal(Literal::Integer(number))
                }
            }
            Token::SingleQuotedString(value) => {
                self.advance();
                ExprKind::Literal(Literal::String(value))
            }
            Token::HexStringLiteral(value) => {
                let tok = self.advance();
                // `0x1F` is a hex integer, `X'1F'` a blob
                let text = self.text(tok.span);
                if text.starts_with("0x") || text.starts_with("0X") {
                    ExprKind::Literal(Literal::Integer(text.to_string()))
                } else {
                    ExprKind::Literal(Literal::Blob(value))
                }
            }
            Token::LParen => {
                self.advance();
                let kind = if self.is_any_keyword(&["SELECT", "VALUES", "WITH"]) {
                    ExprKind::Subquery(Box::new(self.parse_select_stmt()?))
                } else {
                    let inner = self.parse_expr()?;
                    if self.is_token(&Token::Comma) {
                        return self.error("Row values are not supported");
                    }
                    ExprKind::Nested(Box::new(inner))
                };
                self.expect_token(&Token::RParen)?;
                kind
            }
            Token::Word(w) if w.quote_style.is_none() => {
                let upper = w.value.to_ascii_uppercase();
                match upper.as_str() {
                    "NULL" => {
                        self.advance();
                        ExprKind::Literal(Literal::Null)
                    }
                    "TRUE" | "FALSE" if !matches!(self.peek_at(1).token, Token::Period) => {
                        self.advance();
                        let value = if upper == "TRUE" { "1" } else { "0" };
                        ExprKind::Literal(Literal::Integer(value.to_string()))
                    }
                    "CURRENT_TIME" => {
                        self.advance();
                        ExprKind::Literal(Literal::CurrentTime)
                    }
                    "CURRENT_DATE" => {
                        self.advance();
                        ExprKind::Literal(Literal::CurrentDate)
                    }
                    "CURRENT_TIMESTAMP" => {
                        self.advance();
                        ExprKind::Literal(Literal::CurrentTimestamp)
                    }
                    "CAST" if matches!(self.peek_at(1).token, Token::LParen) => self.parse_cast()?,
                    "CASE" => self.parse_case()?,
                    "EXISTS" | "NOT" => {
                        let not = self.eat_keyword("NOT");
                        self.expect_keyword("EXISTS")?;
                        self.expect_token(&Token::LParen)?;
                        let select = self.parse_select_stmt()?;
                        self.expect_token(&Token::RParen)?;
                        ExprKind::Exists {
                            not,
                            select: Box::new(select),
                        }
                    }
                    "RAISE" if matches!(self.peek_at(1).token, Token::LParen) => self.parse_raise()?,
                    _ => self.parse_name_expr()?,
                }
            }
            Token::Word(_) | Token::DoubleQuotedString(_) => self.parse_name_expr()?,
            _ => return self.unexpected("an expression"),
        };

        let span = self.span_from(start);
        Ok(self.expr(kind, span))
    }

    /// Function call, `table.column` or `column`
    fn parse_name_expr(&mut self) -> PResult<ExprKind> {
        if !self.is_identifier() {
            return self.unexpected("an expression");
        }
        let first = self.parse_ident()?;

        if self.eat_token(&Token::LParen) {
            let distinct = self.eat_keyword("DISTINCT");
            let args = if self.eat_token(&Token::Mul) {
                FunctionArgs::Star
            } else if self.is_token(&Token::RParen) {
                FunctionArgs::List(Vec::new())
            } else {
                FunctionArgs::List(self.parse_expr_list()?)
            };
            self.expect_token(&Token::RParen)?;
            return Ok(ExprKind::Function {
                name: first,
                distinct,
                args,
            });
        }

        if !self.eat_token(&Token::Period) {
            return Ok(ExprKind::Column {
                table: None,
                column: first,
            });
        }
        let second = self.parse_ident()?;
        if !self.eat_token(&Token::Period) {
            return Ok(ExprKind::Column {
                table: Some(first),
                column: second,
            });
        }
        // schema.table.column
        let column = self.parse_ident()?;
        Ok(ExprKind::Column {
            table: Some(second),
            column,
        })
    }

    fn parse_cast(&mut self) -> PResult<ExprKind> {
        self.expect_keyword("CAST")?;
        self.expect_token(&Token::LParen)?;
        let expr = self.parse_expr()?;
        self.expect_keyword("AS")?;
        let Some(type_name) = self.parse_type_name(false)? else {
            return self.unexpected("a type name");
        };
        self.expect_token(&Token::RParen)?;
        Ok(ExprKind::Cast {
            expr: Box::new(expr),
            type_name,
        })
    }

    fn parse_case(&mut self) -> PResult<ExprKind> {
        self.expect_keyword("CASE")?;
        let operand = if self.is_keyword("WHEN") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut branches = Vec::new();
        while self.eat_keyword("WHEN") {
            let when = self.parse_expr()?;
            self.expect_keyword("THEN")?;
            let then = self.parse_expr()?;
            branches.push((when, then));
        }
        if branches.is_empty() {
            return self.unexpected("WHEN");
        }

        let else_expr = if self.eat_keyword("ELSE") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;

        Ok(ExprKind::Case {
            operand,
            branches,
            else_expr,
        })
    }

    fn parse_raise(&mut self) -> PResult<ExprKind> {
        self.expect_keyword("RAISE")?;
        self.expect_token(&Token::LParen)?;
        let action = if self.eat_keyword("IGNORE") {
            RaiseAction::Ignore
        } else if self.eat_keyword("ROLLBACK") {
            RaiseAction::Rollback
        } else if self.eat_keyword("ABORT") {
            RaiseAction::Abort
        } else if self.eat_keyword("FAIL") {
            RaiseAction::Fail
        } else {
            return self.unexpected("IGNORE, ROLLBACK, ABORT or FAIL");
        };

        let message = if action != RaiseAction::Ignore {
            self.expect_token(&Token::Comma)?;
            match self.advance().token {
                Token::SingleQuotedString(message) => Some(message),
                _ => return self.error("Expected an error message"),
            }
        } else {
            None
        };
        self.expect_token(&Token::RParen)?;

        Ok(ExprKind::Raise { action, message })
    }
}

/// Largest `?N` SQLite accepts
const MAX_BIND_INDEX: u32 = 32766;

/// `?`, `?N`, `$name`, `:name` or `@name` as written; `None` for an index
/// outside `1..=MAX_BIND_INDEX`
fn placeholder(text: &str) -> Option<BindParameter> {
    let mut chars = text.chars();
    match chars.next() {
        Some('?') if text.len() == 1 => Some(BindParameter::Anonymous),
        Some('?') => chars
            .as_str()
            .parse::<u32>()
            .ok()
            .filter(|index| (1..=MAX_BIND_INDEX).contains(index))
            .map(BindParameter::Indexed),
        Some(prefix) => Some(BindParameter::Named {
            prefix,
            name: chars.as_str().to_string(),
        }),
        None => Some(BindParameter::Anonymous),
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::SqlParser;
    use crate::tree::*;

    fn where_clause(sql: &str) -> Expr {
        let file = SqlParser::new()
            .parse(&format!("SELECT * FROM t WHERE {}", sql), None)
            .unwrap();
        let StmtKind::Select(select) = &file.statements[0].kind else {
            panic!("not a select");
        };
        let SelectCore::Select(core) = &select.first else {
            panic!("not a select core");
        };
        core.where_clause.clone().unwrap()
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = where_clause("a = 1 OR b = 2 AND c = 3");
        let ExprKind::Binary { op: BinaryOp::Or, right, .. } = expr.kind else {
            panic!("expected OR at the top");
        };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn between_consumes_its_and() {
        let expr = where_clause("a BETWEEN ? AND ? AND b NOT IN (1, 2)");
        let ExprKind::Binary { op: BinaryOp::And, left, right } = expr.kind else {
            panic!("expected AND at the top");
        };
        assert!(matches!(left.kind, ExprKind::Between { not: false, .. }));
        assert!(matches!(right.kind, ExprKind::In { not: true, target: InTarget::List(ref items), .. } if items.len() == 2));
    }

    #[test]
    fn bind_parameter_forms() {
        let expr = where_clause("a = ? AND b = ?3 AND c = :name AND d = @other AND e = $third");
        let mut params = Vec::new();
        expr.walk(&mut |e| {
            if let ExprKind::BindParameter(p) = &e.kind {
                params.push(p.clone());
            }
        });
        assert_eq!(
            params,
            vec![
                BindParameter::Anonymous,
                BindParameter::Indexed(3),
                BindParameter::Named { prefix: ':', name: "name".to_string() },
                BindParameter::Named { prefix: '@', name: "other".to_string() },
                BindParameter::Named { prefix: '$', name: "third".to_string() },
            ]
        );
    }

    #[test]
    fn bind_index_out_of_range_is_a_syntax_error() {
        for sql in [
            "SELECT * FROM t WHERE a = ?0",
            "SELECT * FROM t WHERE a = ?32767",
            "SELECT * FROM t WHERE a = ?4294967297",
        ] {
            let error = SqlParser::new().parse(sql, None).unwrap_err();
            assert!(error.message.contains("between 1 and 32766"), "{}: {}", sql, error.message);
        }
        let ExprKind::Binary { right, .. } = where_clause("a = ?32766").kind else {
            panic!("expected a comparison");
        };
        assert!(matches!(right.kind, ExprKind::BindParameter(BindParameter::Indexed(32766))));
    }

    #[test]
    fn in_bind_parameter() {
        let expr = where_clause("id IN ?");
        assert!(matches!(expr.kind, ExprKind::In { target: InTarget::Bind(_), .. }));
    }

    #[test]
    fn literals_and_special_forms() {
        assert!(matches!(where_clause("1.5").kind, ExprKind::Literal(Literal::Real(_))));
        assert!(matches!(where_clause("0x1F").kind, ExprKind::Literal(Literal::Integer(_))));
        assert!(matches!(where_clause("X'00'").kind, ExprKind::Literal(Literal::Blob(_))));
        assert!(matches!(where_clause("CAST(a AS TEXT)").kind, ExprKind::Cast { .. }));
        assert!(matches!(where_clause("CASE WHEN a THEN 1 ELSE 2 END").kind, ExprKind::Case { .. }));
        assert!(matches!(where_clause("NOT EXISTS (SELECT 1)").kind, ExprKind::Exists { not: true, .. }));
        assert!(matches!(where_clause("a IS NOT NULL").kind, ExprKind::Is { not: true, .. }));
        assert!(matches!(where_clause("a NOTNULL").kind, ExprKind::Null { not: true, .. }));
        assert!(matches!(where_clause("a ISNULL").kind, ExprKind::Null { not: false, .. }));
        assert!(matches!(where_clause("name NOT LIKE 'x%' ESCAPE '!'").kind, ExprKind::Like { not: true, .. }));
    }

    #[test]
    fn expression_spans_cover_source() {
        let sql = "SELECT a + b * 2 FROM t";
        let file = SqlParser::new().parse(sql, None).unwrap();
        let StmtKind::Select(select) = &file.statements[0].kind else {
            panic!("not a select");
        };
        let SelectCore::Select(core) = &select.first else {
            panic!("not a select core");
        };
        let ResultColumn::Expr { expr, .. } = &core.columns[0] else {
            panic!("not an expression column");
        };
        assert_eq!(expr.span.slice(sql), "a + b * 2");
    }
}
