use super::Parser;
use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::ScriptError;
use crate::lexer::Token;

/// An expression with the height of its tree.
type Measured = (Expr, usize);

impl<'a> Parser<'a> {
    // -- Expression parsing --------------------------------------

    pub(super) fn parse_expr(&mut self) -> Result<Expr, ScriptError> {
        self.parse_nested().map(|(expr, _)| expr)
    }

    /// Every re-entry into the expression grammar counts one level.
    fn parse_nested(&mut self) -> Result<Measured, ScriptError> {
        self.nest()?;
        let expr = self.parse_or_expr();
        self.unnest();
        expr
    }

    fn parse_or_expr(&mut self) -> Result<Measured, ScriptError> {
        let mut left = self.parse_and_expr()?;
        while self.peek() == &Token::OrOr || self.is_word("or") {
            let line = self.cur_line();
            self.advance();
            let right = self.parse_and_expr()?;
            left = self.binary(BinaryOp::Or, left, right, line)?;
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Measured, ScriptError> {
        let mut left = self.parse_not_expr()?;
        while self.peek() == &Token::AndAnd || self.is_word("and") {
            let line = self.cur_line();
            self.advance();
            let right = self.parse_not_expr()?;
            left = self.binary(BinaryOp::And, left, right, line)?;
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Measured, ScriptError> {
        if self.peek() == &Token::Bang || self.is_word("not") {
            let line = self.cur_line();
            self.advance();
            self.nest()?;
            let operand = self.parse_not_expr();
            self.unnest();
            return self.unary(UnaryOp::Not, operand?, line);
        }
        self.parse_compare_expr()
    }

    fn parse_compare_expr(&mut self) -> Result<Measured, ScriptError> {
        let left = self.parse_additive_expr()?;
        let op = match self.peek() {
            Token::Eq => BinaryOp::Eq,
            Token::Neq => BinaryOp::Neq,
            Token::Lt => BinaryOp::Lt,
            Token::Lte => BinaryOp::Lte,
            Token::Gt => BinaryOp::Gt,
            Token::Gte => BinaryOp::Gte,
            Token::Word(w) if w == "in" => BinaryOp::In,
            _ => return Ok(left),
        };
        let line = self.cur_line();
        self.advance();
        let right = self.parse_additive_expr()?;
        // Comparisons do not chain: `a < b < c` is rejected.
        if matches!(
            self.peek(),
            Token::Eq | Token::Neq | Token::Lt | Token::Lte | Token::Gt | Token::Gte
        ) {
            return Err(self.err("comparison operators cannot be chained"));
        }
        self.binary(op, left, right, line)
    }

    fn parse_additive_expr(&mut self) -> Result<Measured, ScriptError> {
        let mut left = self.parse_multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            let line = self.cur_line();
            self.advance();
            let right = self.parse_multiplicative_expr()?;
            left = self.binary(op, left, right, line)?;
        }
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Measured, ScriptError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            let line = self.cur_line();
            self.advance();
            let right = self.parse_unary_expr()?;
            left = self.binary(op, left, right, line)?;
        }
    }

    fn parse_unary_expr(&mut self) -> Result<Measured, ScriptError> {
        if self.peek() == &Token::Minus {
            let line = self.cur_line();
            self.advance();
            self.nest()?;
            let operand = self.parse_unary_expr();
            self.unnest();
            return self.unary(UnaryOp::Neg, operand?, line);
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Result<Measured, ScriptError> {
        let (mut expr, mut height) = self.parse_primary_expr()?;
        loop {
            let line = self.cur_line();
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let (args, tallest) = self.parse_comma_list(Token::RParen, ")")?;
                    height = self.fits(1 + height.max(tallest), line)?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        line,
                    );
                }
                Token::Dot => {
                    self.advance();
                    let name = self.take_member_name()?;
                    height = self.fits(1 + height, line)?;
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        line,
                    );
                }
                Token::LBracket => {
                    self.advance();
                    let (index, index_height) = self.parse_nested()?;
                    self.expect(Token::RBracket, "]")?;
                    height = self.fits(1 + height.max(index_height), line)?;
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        line,
                    );
                }
                _ => return Ok((expr, height)),
            }
        }
    }

    /// Member names may be any word, keywords included (`x.in` is still a
    /// member read); the validator decides whether it is allowed.
    fn take_member_name(&mut self) -> Result<String, ScriptError> {
        if let Token::Word(w) = self.peek().clone() {
            self.advance();
            Ok(w)
        } else {
            Err(self.err(format!(
                "expected member name after '.', got {:?}",
                self.peek()
            )))
        }
    }

    /// Items up to `close`, with the height of the tallest one.
    fn parse_comma_list(
        &mut self,
        close: Token,
        shown: &str,
    ) -> Result<(Vec<Expr>, usize), ScriptError> {
        let mut items = Vec::new();
        let mut tallest = 0;
        while self.peek() != &close {
            let (item, height) = self.parse_nested()?;
            items.push(item);
            tallest = tallest.max(height);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(close, shown)?;
        Ok((items, tallest))
    }

    fn parse_primary_expr(&mut self) -> Result<Measured, ScriptError> {
        let line = self.cur_line();
        let kind = match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                ExprKind::Int(n)
            }
            Token::Float(f) => {
                self.advance();
                ExprKind::Float(f)
            }
            Token::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Token::Word(w) if w == "true" => {
                self.advance();
                ExprKind::Bool(true)
            }
            Token::Word(w) if w == "false" => {
                self.advance();
                ExprKind::Bool(false)
            }
            Token::Word(w) if w == "null" => {
                self.advance();
                ExprKind::Null
            }
            Token::Word(_) => ExprKind::Name(self.take_name()?),
            Token::LParen => {
                self.advance();
                let inner = self.parse_nested()?;
                self.expect(Token::RParen, ")")?;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance();
                let (items, tallest) = self.parse_comma_list(Token::RBracket, "]")?;
                let height = self.fits(1 + tallest, line)?;
                return Ok((Expr::new(ExprKind::List(items), line), height));
            }
            Token::LBrace => {
                self.advance();
                let (entries, tallest) = self.parse_map_entries()?;
                let height = self.fits(1 + tallest, line)?;
                return Ok((Expr::new(ExprKind::Map(entries), line), height));
            }
            other => return Err(self.err(format!("expected expression, got {:?}", other))),
        };
        Ok((Expr::new(kind, line), 1))
    }

    fn parse_map_entries(&mut self) -> Result<(Vec<(String, Expr)>, usize), ScriptError> {
        let mut entries = Vec::new();
        let mut tallest = 0;
        while self.peek() != &Token::RBrace {
            let key = match self.peek().clone() {
                Token::Str(s) => {
                    self.advance();
                    s
                }
                other => {
                    return Err(self.err(format!(
                        "map keys must be string literals, got {:?}",
                        other
                    )))
                }
            };
            self.expect(Token::Colon, ":")?;
            let (value, height) = self.parse_nested()?;
            entries.push((key, value));
            tallest = tallest.max(height);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace, "}")?;
        Ok((entries, tallest))
    }

    fn unary(&self, op: UnaryOp, operand: Measured, line: u32) -> Result<Measured, ScriptError> {
        let (operand, height) = operand;
        let height = self.fits(1 + height, line)?;
        let expr = Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            line,
        );
        Ok((expr, height))
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: Measured,
        right: Measured,
        line: u32,
    ) -> Result<Measured, ScriptError> {
        let ((left, left_height), (right, right_height)) = (left, right);
        let height = self.fits(1 + left_height.max(right_height), line)?;
        let expr = Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            line,
        );
        Ok((expr, height))
    }
}
