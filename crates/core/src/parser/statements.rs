use super::Parser;
use crate::ast::{AssignTarget, ExprKind, ImportItem, Stmt, StmtKind};
use crate::error::ScriptError;
use crate::lexer::Token;

impl<'a> Parser<'a> {
    pub(super) fn parse_stmt(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.cur_line();
        let kind = match self.peek().clone() {
            Token::Word(w) => match w.as_str() {
                "import" => self.parse_import()?,
                "from" => self.parse_from_import()?,
                "let" => self.parse_let()?,
                "if" => self.parse_if()?,
                "while" => {
                    self.advance();
                    let cond = self.parse_expr()?;
                    let body = self.parse_block()?;
                    StmtKind::While { cond, body }
                }
                "for" => {
                    self.advance();
                    let var = self.take_name()?;
                    self.expect_word("in")?;
                    let iterable = self.parse_expr()?;
                    let body = self.parse_block()?;
                    StmtKind::For {
                        var,
                        iterable,
                        body,
                    }
                }
                "break" => {
                    self.advance();
                    self.expect(Token::Semi, ";")?;
                    StmtKind::Break
                }
                "continue" => {
                    self.advance();
                    self.expect(Token::Semi, ";")?;
                    StmtKind::Continue
                }
                "return" => {
                    self.advance();
                    let value = if self.peek() == &Token::Semi {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect(Token::Semi, ";")?;
                    StmtKind::Return(value)
                }
                _ => self.parse_expr_or_assign()?,
            },
            _ => self.parse_expr_or_assign()?,
        };
        Ok(Stmt { kind, line })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.nest()?;
        let body = self.parse_block_body();
        self.unnest();
        body
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(Token::LBrace, "{")?;
        let mut body = Vec::new();
        while self.peek() != &Token::RBrace {
            if self.peek() == &Token::Eof {
                return Err(self.err("unterminated block, expected '}'"));
            }
            body.push(self.parse_stmt()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_dotted_name(&mut self) -> Result<String, ScriptError> {
        let mut name = self.take_name()?;
        while self.peek() == &Token::Dot {
            self.advance();
            name.push('.');
            name.push_str(&self.take_name()?);
        }
        Ok(name)
    }

    fn parse_import(&mut self) -> Result<StmtKind, ScriptError> {
        self.expect_word("import")?;
        let mut items = Vec::new();
        loop {
            let module = self.parse_dotted_name()?;
            let alias = if self.is_word("as") {
                self.advance();
                Some(self.take_name()?)
            } else {
                None
            };
            items.push(ImportItem { module, alias });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::Semi, ";")?;
        Ok(StmtKind::Import(items))
    }

    fn parse_from_import(&mut self) -> Result<StmtKind, ScriptError> {
        self.expect_word("from")?;
        let module = self.parse_dotted_name()?;
        self.expect_word("import")?;
        let mut names = Vec::new();
        loop {
            if self.eat(&Token::Star) {
                names.push("*".to_string());
            } else {
                names.push(self.take_name()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::Semi, ";")?;
        Ok(StmtKind::FromImport { module, names })
    }

    fn parse_let(&mut self) -> Result<StmtKind, ScriptError> {
        self.expect_word("let")?;
        let name = self.take_name()?;
        self.expect(Token::Assign, "=")?;
        let value = self.parse_expr()?;
        self.expect(Token::Semi, ";")?;
        Ok(StmtKind::Let { name, value })
    }

    fn parse_if(&mut self) -> Result<StmtKind, ScriptError> {
        self.expect_word("if")?;
        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let else_body = if self.is_word("else") {
            self.advance();
            if self.is_word("if") {
                let line = self.cur_line();
                self.nest()?;
                let nested = self.parse_if();
                self.unnest();
                Some(vec![Stmt { kind: nested?, line }])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_expr_or_assign(&mut self) -> Result<StmtKind, ScriptError> {
        let expr = self.parse_expr()?;
        if self.peek() == &Token::Assign {
            let line = self.cur_line();
            self.advance();
            let target = match expr.kind {
                ExprKind::Name(name) => AssignTarget::Name(name),
                ExprKind::Index { object, index } => match object.kind {
                    ExprKind::Name(name) => AssignTarget::Index {
                        name,
                        index: *index,
                    },
                    _ => {
                        return Err(ScriptError::parse(
                            line,
                            "only `name[index]` can be assigned through an index",
                        ))
                    }
                },
                _ => {
                    return Err(ScriptError::parse(
                        line,
                        "invalid assignment target",
                    ))
                }
            };
            let value = self.parse_expr()?;
            self.expect(Token::Semi, ";")?;
            return Ok(StmtKind::Assign { target, value });
        }
        self.expect(Token::Semi, ";")?;
        Ok(StmtKind::Expr(expr))
    }
}
