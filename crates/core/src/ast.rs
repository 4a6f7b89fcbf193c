//! Syntax tree for report scripts.
//!
//! Produced by the parser, walked by the static validator and by the
//! interpreter in `sift-eval`. Every statement and expression carries the
//! line it starts on so verdicts and runtime errors can point at source.

// ──────────────────────────────────────────────
// Script
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub body: Vec<Stmt>,
}

// ──────────────────────────────────────────────
// Statements
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

/// One `module [as alias]` entry of an `import` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    /// Dotted module path exactly as written, e.g. `os.path`.
    pub module: String,
    pub alias: Option<String>,
}

impl ImportItem {
    /// The name this import binds in the script's scope.
    pub fn binding(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.module.split('.').next().unwrap_or(&self.module),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    /// `name[index] = value`
    Index { name: String, index: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// import a [as b], c
    Import(Vec<ImportItem>),
    /// from module import a, b
    FromImport { module: String, names: Vec<String> },
    Let { name: String, value: Expr },
    Assign { target: AssignTarget, value: Expr },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    For {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Expr(Expr),
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::In => "in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Int(i64),
    /// Decimal literal text, parsed exactly by the interpreter.
    Float(String),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    /// `{"key": value, ...}` with string-literal keys.
    Map(Vec<(String, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `object.name` read without a call.
    Member {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// `callee(args)`; a method call is a `Call` whose callee is a `Member`.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32) -> Self {
        Expr { kind, line }
    }
}
