//! Recursive-descent parser from tokens to the script AST.
//!
//! No name resolution happens here; that is the validator's job. Anything
//! the grammar does not know is a parse error, which the validator turns
//! into a `syntax` rejection.
use crate::ast::Script;
use crate::error::ScriptError;
use crate::lexer::{self, Spanned, Token};

mod expressions;
mod statements;

/// Words that can never be used as names.
pub const KEYWORDS: &[&str] = &[
    "import", "from", "as", "let", "if", "else", "while", "for", "in", "return", "break",
    "continue", "true", "false", "null", "and", "or", "not",
];

/// Deepest nesting of blocks and sub-expressions a script may use. Counts
/// both parser recursion and the height of the expression trees it builds,
/// so every later walk over the AST stays shallow too.
pub const MAX_NESTING: usize = 128;

/// Lex and parse a complete script.
pub fn parse(src: &str) -> Result<Script, ScriptError> {
    let tokens = lexer::lex(src)?;
    parse_tokens(&tokens)
}

pub fn parse_tokens(tokens: &[Spanned]) -> Result<Script, ScriptError> {
    let mut parser = Parser::new(tokens);
    parser.parse_script()
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned]) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn cur_line(&self) -> u32 {
        self.cur().line
    }

    fn advance(&mut self) -> &Spanned {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> ScriptError {
        ScriptError::parse(self.cur_line(), msg)
    }

    fn nest(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.err(format!("nested more than {} levels deep", MAX_NESTING)));
        }
        self.depth += 1;
        Ok(())
    }

    fn unnest(&mut self) {
        self.depth -= 1;
    }

    /// Reject an expression node of `height` that would take the tree past
    /// the nesting limit at the current depth.
    fn fits(&self, height: usize, line: u32) -> Result<usize, ScriptError> {
        if self.depth + height > MAX_NESTING {
            return Err(ScriptError::parse(
                line,
                format!("expression nested more than {} levels deep", MAX_NESTING),
            ));
        }
        Ok(height)
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self.peek(), Token::Word(x) if x == w)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, shown: &str) -> Result<(), ScriptError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got {:?}", shown, self.peek())))
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<u32, ScriptError> {
        let line = self.cur_line();
        if self.is_word(expected) {
            self.advance();
            Ok(line)
        } else {
            Err(self.err(format!("expected '{}', got {:?}", expected, self.peek())))
        }
    }

    /// A non-keyword identifier.
    fn take_name(&mut self) -> Result<String, ScriptError> {
        if let Token::Word(w) = self.peek().clone() {
            if KEYWORDS.contains(&w.as_str()) {
                return Err(self.err(format!("'{}' is a keyword and cannot be used as a name", w)));
            }
            self.advance();
            Ok(w)
        } else {
            Err(self.err(format!("expected identifier, got {:?}", self.peek())))
        }
    }

    fn parse_script(&mut self) -> Result<Script, ScriptError> {
        let mut body = Vec::new();
        while self.peek() != &Token::Eof {
            body.push(self.parse_stmt()?);
        }
        Ok(Script { body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn parse_ok(src: &str) -> Script {
        parse(src).unwrap_or_else(|e| panic!("parse failed: {}", e))
    }

    #[test]
    fn parses_imports_in_every_form() {
        let script = parse_ok(
            "import db;\nimport frame as f, db as d;\nimport os.path;\nfrom os import system, getenv;",
        );
        assert_eq!(script.body.len(), 4);
        match &script.body[1].kind {
            StmtKind::Import(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].binding(), "f");
                assert_eq!(items[1].module, "db");
            }
            other => panic!("expected import, got {:?}", other),
        }
        match &script.body[2].kind {
            StmtKind::Import(items) => {
                assert_eq!(items[0].module, "os.path");
                assert_eq!(items[0].binding(), "os");
            }
            other => panic!("expected import, got {:?}", other),
        }
        match &script.body[3].kind {
            StmtKind::FromImport { module, names } => {
                assert_eq!(module, "os");
                assert_eq!(names, &vec!["system".to_string(), "getenv".to_string()]);
            }
            other => panic!("expected from-import, got {:?}", other),
        }
        assert_eq!(script.body[3].line, 4);
    }

    #[test]
    fn method_chain_is_nested_calls() {
        let script = parse_ok("import db;\nreturn db.table(\"sales\").sum(\"amount\");");
        let StmtKind::Return(Some(expr)) = &script.body[1].kind else {
            panic!("expected return");
        };
        let ExprKind::Call { callee, args } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        let ExprKind::Member { object, name } = &callee.kind else {
            panic!("expected member callee");
        };
        assert_eq!(name, "sum");
        assert!(matches!(object.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn precedence_multiplication_binds_tighter() {
        let script = parse_ok("let x = 1 + 2 * 3;");
        let StmtKind::Let { value, .. } = &script.body[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Binary { op, right, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn control_flow_blocks() {
        let script = parse_ok(
            r#"
let total = 0;
for r in [1, 2, 3] {
    if r > 1 { total = total + r; } else if r == 1 { continue; } else { break; }
}
while false { }
return total;
"#,
        );
        assert_eq!(script.body.len(), 4);
        assert!(matches!(script.body[1].kind, StmtKind::For { .. }));
        assert!(matches!(script.body[2].kind, StmtKind::While { .. }));
    }

    #[test]
    fn map_literal_and_index_assignment() {
        let script = parse_ok("let m = {\"a\": 1, 'b': 2};\nm[\"c\"] = 3;");
        assert!(matches!(
            &script.body[1].kind,
            StmtKind::Assign {
                target: AssignTarget::Index { .. },
                ..
            }
        ));
    }

    #[test]
    fn missing_semicolon_is_an_error() {
        let err = parse("let x = 1\nlet y = 2;").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn keyword_as_name_is_an_error() {
        assert!(parse("let return = 1;").is_err());
    }

    #[test]
    fn python_function_definition_does_not_parse() {
        assert!(parse("def generate_report(db_path):\n    return 1").is_err());
    }

    #[test]
    fn assignment_to_call_is_an_error() {
        assert!(parse("f() = 1;").is_err());
    }

    #[test]
    fn moderate_nesting_parses() {
        let depth = MAX_NESTING / 2;
        let src = format!("return {}1{};", "(".repeat(depth), ")".repeat(depth));
        parse_ok(&src);
        let chain = vec!["1"; MAX_NESTING / 2].join(" + ");
        parse_ok(&format!("let x = {};", chain));
    }

    #[test]
    fn deep_parentheses_are_an_error() {
        let depth = 100_000;
        let src = format!("return {}1{};", "(".repeat(depth), ")".repeat(depth));
        let err = parse(&src).unwrap_err();
        assert!(err.message.contains("levels deep"), "{}", err);
    }

    #[test]
    fn long_operator_chains_are_an_error() {
        let chain = vec!["1"; 200_000].join(" + ");
        let err = parse(&format!("let x = {};", chain)).unwrap_err();
        assert!(err.message.contains("levels deep"), "{}", err);

        let members = format!("return x{};", ".y".repeat(200_000));
        assert!(parse(&members).is_err());
    }

    #[test]
    fn deep_prefix_operators_and_blocks_are_errors() {
        assert!(parse(&format!("return {}1;", "-".repeat(100_000))).is_err());
        assert!(parse(&format!("return {}true;", "not ".repeat(100_000))).is_err());
        assert!(parse(&format!("return {}1{};", "[".repeat(100_000), "]".repeat(100_000))).is_err());

        let depth = 50_000;
        let blocks = format!("{}{}", "if true { ".repeat(depth), "} ".repeat(depth));
        assert!(parse(&blocks).is_err());
        let chain = format!("if true {{ }}{}", " else if true { }".repeat(depth));
        assert!(parse(&chain).is_err());
    }
}
