//! Tree-walking evaluator for report scripts.
//!
//! The interpreter's only reach outside itself is the [`DataSource`] it is
//! given and the capability modules in [`crate::capability`]. There are no
//! ambient names: a script that was never validated still cannot import
//! anything but `db` and `frame`, call anything but the builtins, or
//! invoke a method outside the value-method table.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use sift_core::ast::{AssignTarget, BinaryOp, Expr, ExprKind, Script, Stmt, StmtKind, UnaryOp};

use crate::builtins;
use crate::capability::{DataSource, Module};
use crate::error::{Fault, FaultResult, RuntimeError};
use crate::methods;
use crate::numeric;
use crate::value::Value;

/// `print` output beyond this many lines is dropped.
pub const MAX_CONSOLE_LINES: usize = 1000;

/// What a name is bound to.
#[derive(Debug, Clone)]
enum Slot {
    Value(Value),
    Module(Module),
    /// `from db import query` binds `query` to `db.query`.
    Member(Module, String),
}

/// How a statement list finished.
enum Flow {
    Normal,
    Break(u32),
    Continue(u32),
    Return(Value),
}

pub struct Interpreter<'s> {
    source: &'s dyn DataSource,
    scopes: Vec<HashMap<String, Slot>>,
    console: Vec<String>,
    console_dropped: usize,
}

impl<'s> Interpreter<'s> {
    pub fn new(source: &'s dyn DataSource) -> Self {
        Interpreter {
            source,
            scopes: vec![HashMap::new()],
            console: Vec::new(),
            console_dropped: 0,
        }
    }

    /// Lines printed so far, with a marker if some were dropped.
    pub fn console(&self) -> Vec<String> {
        let mut lines = self.console.clone();
        if self.console_dropped > 0 {
            lines.push(format!("... {} more line(s) not shown", self.console_dropped));
        }
        lines
    }

    /// Run `script` to its `return` and yield the returned value.
    pub fn run(&mut self, script: &Script) -> Result<Value, RuntimeError> {
        let last_line = script.body.last().map(|s| s.line).unwrap_or(1);
        match self.exec_stmts(&script.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Break(line) => Err(Fault::Unsupported("'break' outside a loop".into()).at(line)),
            Flow::Continue(line) => {
                Err(Fault::Unsupported("'continue' outside a loop".into()).at(line))
            }
            Flow::Normal => Err(Fault::NoReturn.at(last_line)),
        }
    }

    // ── scopes ──────────────────────────────────

    fn declare(&mut self, name: &str, slot: Slot) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
    }

    fn lookup(&self, name: &str) -> Option<&Slot> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn assign(&mut self, name: &str, value: Value) -> FaultResult<()> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                return match slot {
                    Slot::Value(current) => {
                        *current = value;
                        Ok(())
                    }
                    _ => Err(Fault::Type(format!("cannot assign to capability '{}'", name))),
                };
            }
        }
        Err(Fault::Name(format!(
            "'{}' is not declared; use 'let {} = ...' first",
            name, name
        )))
    }

    fn value_of(&self, name: &str) -> FaultResult<Value> {
        match self.lookup(name) {
            Some(Slot::Value(v)) => Ok(v.clone()),
            Some(Slot::Module(m)) => Err(Fault::Type(format!(
                "module '{}' cannot be used as a value",
                m.name()
            ))),
            Some(Slot::Member(m, member)) => Err(Fault::Type(format!(
                "'{}.{}' cannot be used as a value",
                m.name(),
                member
            ))),
            None if builtins::is_builtin(name) => Err(Fault::Type(format!(
                "builtin '{}' cannot be used as a value",
                name
            ))),
            None => Err(Fault::Name(format!("'{}' is not defined", name))),
        }
    }

    // ── statements ──────────────────────────────

    fn exec_block(&mut self, body: &[Stmt]) -> Result<Flow, RuntimeError> {
        self.scopes.push(HashMap::new());
        let flow = self.exec_stmts(body);
        self.scopes.pop();
        flow
    }

    fn exec_stmts(&mut self, body: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Import(items) => {
                for item in items {
                    let module = Module::resolve(&item.module).ok_or_else(|| {
                        Fault::Name(format!("no module named '{}'", item.module)).at(line)
                    })?;
                    self.declare(item.binding(), Slot::Module(module));
                }
            }
            StmtKind::FromImport { module, names } => {
                let resolved = Module::resolve(module)
                    .ok_or_else(|| Fault::Name(format!("no module named '{}'", module)).at(line))?;
                for name in names {
                    if !resolved.has_member(name) {
                        return Err(Fault::Name(format!(
                            "module '{}' has no member '{}'",
                            module, name
                        ))
                        .at(line));
                    }
                    self.declare(name, Slot::Member(resolved, name.clone()));
                }
            }
            StmtKind::Let { name, value } => {
                let value = self.eval(value)?;
                self.declare(name, Slot::Value(value));
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                match target {
                    AssignTarget::Name(name) => self.assign(name, value).map_err(|f| f.at(line))?,
                    AssignTarget::Index { name, index } => {
                        let container = self.value_of(name).map_err(|f| f.at(line))?;
                        let key = self.eval(index)?;
                        methods::set_index(&container, &key, value).map_err(|f| f.at(line))?;
                    }
                }
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(cond)?.truthy() {
                    return self.exec_block(then_body);
                } else if let Some(body) = else_body {
                    return self.exec_block(body);
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body)? {
                        Flow::Break(_) => break,
                        Flow::Continue(_) | Flow::Normal => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StmtKind::For {
                var,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable)?;
                let items = iterate(&iterable).map_err(|f| f.at(line))?;
                for item in items {
                    self.scopes.push(HashMap::from([(var.clone(), Slot::Value(item))]));
                    let flow = self.exec_block(body);
                    self.scopes.pop();
                    match flow? {
                        Flow::Break(_) => break,
                        Flow::Continue(_) | Flow::Normal => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break(line)),
            StmtKind::Continue => return Ok(Flow::Continue(line)),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    // ── expressions ─────────────────────────────

    fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        let line = expr.line;
        let at = |f: Fault| f.at(line);
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(text) => Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .map(Value::Decimal)
                .map_err(|_| at(Fault::Arithmetic(format!("'{}' is not a representable number", text)))),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Name(name) => self.value_of(name).map_err(at),
            ExprKind::List(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(values))
            }
            ExprKind::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    pairs.push((key.clone(), self.eval(value)?));
                }
                Ok(methods::map_of(pairs))
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => numeric::negate(&value).map_err(at),
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                }
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, line),
            ExprKind::Member { object, name } => Err(at(Fault::Unsupported(format!(
                "reading '.{}' without calling it{}",
                name,
                match &object.kind {
                    ExprKind::Name(n) => format!(" on '{}'", n),
                    _ => String::new(),
                }
            )))),
            ExprKind::Index { object, index } => {
                let target = self.eval(object)?;
                let key = self.eval(index)?;
                methods::index(&target, &key).map_err(at)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, line),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        line: u32,
    ) -> Result<Value, RuntimeError> {
        match op {
            BinaryOp::And => {
                if !self.eval(left)?.truthy() {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval(right)?.truthy()));
            }
            BinaryOp::Or => {
                if self.eval(left)?.truthy() {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval(right)?.truthy()));
            }
            _ => {}
        }
        let l = self.eval(left)?;
        let r = self.eval(right)?;
        let result = match op {
            BinaryOp::Eq => Ok(Value::Bool(l.equals(&r))),
            BinaryOp::Neq => Ok(Value::Bool(!l.equals(&r))),
            BinaryOp::Lt => l.compare(&r).map(|o| Value::Bool(o.is_lt())),
            BinaryOp::Lte => l.compare(&r).map(|o| Value::Bool(o.is_le())),
            BinaryOp::Gt => l.compare(&r).map(|o| Value::Bool(o.is_gt())),
            BinaryOp::Gte => l.compare(&r).map(|o| Value::Bool(o.is_ge())),
            BinaryOp::In => contains(&r, &l).map(Value::Bool),
            _ => numeric::arithmetic(op, &l, &r),
        };
        result.map_err(|f| f.at(line))
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], line: u32) -> Result<Value, RuntimeError> {
        let at = |f: Fault| f.at(line);
        match &callee.kind {
            ExprKind::Name(name) => match self.lookup(name).cloned() {
                Some(Slot::Member(module, member)) => {
                    let args = self.eval_args(args)?;
                    module.call(&member, args, self.source).map_err(at)
                }
                Some(Slot::Module(module)) => Err(at(Fault::Type(format!(
                    "module '{}' is not callable",
                    module.name()
                )))),
                Some(Slot::Value(v)) => Err(at(Fault::Type(format!(
                    "'{}' is a {}, not a function",
                    name,
                    v.type_name()
                )))),
                None if builtins::is_builtin(name) => {
                    let args = self.eval_args(args)?;
                    let mut printed = Vec::new();
                    let out = builtins::call(name, args, &mut printed).map_err(at)?;
                    self.capture(printed);
                    Ok(out)
                }
                None => Err(at(Fault::Name(format!("no function named '{}'", name)))),
            },
            ExprKind::Member { object, name } => {
                if let ExprKind::Name(module_name) = &object.kind {
                    if let Some(Slot::Module(module)) = self.lookup(module_name).cloned() {
                        let args = self.eval_args(args)?;
                        return module.call(name, args, self.source).map_err(at);
                    }
                }
                let receiver = self.eval(object)?;
                let args = self.eval_args(args)?;
                methods::call(&receiver, name, args).map_err(at)
            }
            _ => Err(at(Fault::Unsupported(
                "only named functions and methods can be called".to_string(),
            ))),
        }
    }

    fn capture(&mut self, lines: Vec<String>) {
        for line in lines {
            if self.console.len() < MAX_CONSOLE_LINES {
                self.console.push(line);
            } else {
                self.console_dropped += 1;
            }
        }
    }
}

/// The items a `for` loop visits. Lists are snapshotted first, so
/// appending inside the loop does not extend it.
fn iterate(value: &Value) -> FaultResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Map(map) => Ok(map.borrow().keys().cloned().map(Value::Str).collect()),
        Value::Frame(frame) => Ok(frame.row_maps()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(Fault::Type(format!("cannot iterate over a {}", other.type_name()))),
    }
}

/// `needle in haystack`.
fn contains(haystack: &Value, needle: &Value) -> FaultResult<bool> {
    match haystack {
        Value::List(items) => Ok(items.borrow().iter().any(|v| v.equals(needle))),
        Value::Map(map) => Ok(map.borrow().contains_key(needle.expect_str("map key")?)),
        Value::Str(s) => Ok(s.contains(needle.expect_str("substring")?)),
        Value::Frame(frame) => {
            let column = needle.expect_str("column name")?;
            Ok(frame.columns().iter().any(|c| c == column))
        }
        other => Err(Fault::Type(format!(
            "'in' needs a list, map, string or frame, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_storage::{Cell, ColumnDef, ColumnType, StoreError, TableData};

    /// `sales(region TEXT, amount INTEGER)` with three rows.
    struct Sales;

    impl DataSource for Sales {
        fn tables(&self) -> Result<Vec<String>, StoreError> {
            Ok(vec!["sales".into()])
        }
        fn columns(&self, _table: &str) -> Result<Vec<ColumnDef>, StoreError> {
            Ok(vec![
                ColumnDef {
                    name: "region".into(),
                    ty: ColumnType::Text,
                },
                ColumnDef {
                    name: "amount".into(),
                    ty: ColumnType::Integer,
                },
            ])
        }
        fn table(&self, table: &str) -> Result<TableData, StoreError> {
            if table != "sales" {
                return Err(StoreError::UnknownTable(table.into()));
            }
            let row = |r: &str, a: i64| vec![Cell::Text(r.into()), Cell::Integer(a)];
            Ok(TableData {
                columns: vec!["region".into(), "amount".into()],
                rows: vec![row("north", 10), row("south", 20), row("north", 5)],
            })
        }
        fn query(&self, sql: &str, _params: &[Cell]) -> Result<TableData, StoreError> {
            if sql.trim_start().to_ascii_uppercase().starts_with("DELETE") {
                return Err(StoreError::WriteViolation("DELETE".into()));
            }
            self.table("sales")
        }
    }

    fn run(src: &str) -> Result<Value, RuntimeError> {
        let script = sift_core::parse(src).expect("parse");
        Interpreter::new(&Sales).run(&script)
    }

    fn shown(src: &str) -> String {
        run(src).expect("run").to_string()
    }

    #[test]
    fn aggregate_over_the_store() {
        assert_eq!(shown("import db;\nreturn db.table(\"sales\").sum(\"amount\");"), "35");
    }

    #[test]
    fn from_import_binds_members() {
        assert_eq!(
            shown("from db import table;\nlet t = table(\"sales\");\nreturn t.count();"),
            "3"
        );
    }

    #[test]
    fn group_by_and_loops() {
        let src = r#"
import db;
let totals = db.table("sales").group_by("region").sum("amount");
let out = [];
for row in totals.rows() {
    out.append(row["region"] + "=" + str(row["amount"]));
}
return out;
"#;
        assert_eq!(shown(src), "[\"north=15\", \"south=20\"]");
    }

    #[test]
    fn while_break_continue_and_scoping() {
        let src = r#"
let i = 0;
let total = 0;
while true {
    i = i + 1;
    if i > 5 { break; }
    if i % 2 == 0 { continue; }
    let odd = i;
    total = total + odd;
}
return total;
"#;
        assert_eq!(shown(src), "9");
        let err = run("if true { let x = 1; }\nreturn x;").unwrap_err();
        assert!(matches!(err.fault, Fault::Name(_)));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn missing_return_is_an_error() {
        let err = run("let x = 1;\nlet y = 2;").unwrap_err();
        assert_eq!(err.fault, Fault::NoReturn);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn bad_column_reports_line() {
        let err = run("import db;\nlet t = db.table(\"sales\");\nreturn t.sum(\"price\");").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.fault, Fault::Column(_)));
    }

    #[test]
    fn unvalidated_scripts_still_have_no_ambient_names() {
        let err = run("import os;\nreturn 1;").unwrap_err();
        assert_eq!(err.fault, Fault::Name("no module named 'os'".into()));
        let err = run("return open(\"x\");").unwrap_err();
        assert!(matches!(err.fault, Fault::Name(_)));
        let err = run("import db;\nlet t = db.table(\"sales\");\nt.to_csv(\"out.csv\");\nreturn 1;")
            .unwrap_err();
        assert_eq!(err.fault, Fault::Name("frame has no method 'to_csv'".into()));
        let err = run("import db;\nlet h = db;\nreturn 1;").unwrap_err();
        assert!(matches!(err.fault, Fault::Type(_)));
    }

    #[test]
    fn write_attempts_surface_as_runtime_errors() {
        let err = run("import db;\nreturn db.query(\"DELETE FROM sales\");").unwrap_err();
        assert!(matches!(err.fault, Fault::WriteViolation(_)));
    }

    #[test]
    fn overflow_is_checked() {
        let err = run("let x = 9223372036854775807;\nreturn x + 1;").unwrap_err();
        assert!(matches!(err.fault, Fault::Arithmetic(_)));
    }

    #[test]
    fn print_is_captured() {
        let script = sift_core::parse("print(\"a\", 1);\nprint([1, \"b\"]);\nreturn null;").expect("parse");
        let mut interp = Interpreter::new(&Sales);
        assert!(interp.run(&script).expect("run").is_null());
        assert_eq!(interp.console(), vec!["a 1", "[1, \"b\"]"]);
    }

    #[test]
    fn console_is_bounded() {
        let script =
            sift_core::parse("for i in range(1005) { print(i); }\nreturn 0;").expect("parse");
        let mut interp = Interpreter::new(&Sales);
        interp.run(&script).expect("run");
        let console = interp.console();
        assert_eq!(console.len(), MAX_CONSOLE_LINES + 1);
        assert_eq!(console[MAX_CONSOLE_LINES], "... 5 more line(s) not shown");
    }

    #[test]
    fn index_assignment_and_membership() {
        let src = r#"
let m = {"a": 1};
m["b"] = 2;
let xs = [1, 2, 3];
xs[0] = 10;
return [("b" in m), (10 in xs), xs[0], not ("z" in m)];
"#;
        assert_eq!(shown(src), "[true, true, 10, true]");
    }

    #[test]
    fn decimal_literals_are_exact() {
        assert_eq!(shown("return 0.1 + 0.2 == 0.3;"), "true");
        assert_eq!(shown("return round(2.675, 2);"), "2.68");
    }
}
