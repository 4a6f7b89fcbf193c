//! The host capability table: the `db` and `frame` modules.
//!
//! Scripts reach data only through a [`DataSource`]. The production
//! implementation is `sift_storage::QueryHandle`, which is read-only by
//! construction; tests substitute in-memory sources.

use sift_storage::{ColumnDef, QueryHandle, StoreError, TableData};

use crate::error::{Fault, FaultResult};
use crate::frame::Frame;
use crate::value::{Map, Value};

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Read access to the store, as seen by a script.
pub trait DataSource {
    fn tables(&self) -> Result<Vec<String>, StoreError>;
    fn columns(&self, table: &str) -> Result<Vec<ColumnDef>, StoreError>;
    fn table(&self, table: &str) -> Result<TableData, StoreError>;
    fn query(&self, sql: &str, params: &[sift_storage::Cell]) -> Result<TableData, StoreError>;
}

impl DataSource for QueryHandle {
    fn tables(&self) -> Result<Vec<String>, StoreError> {
        QueryHandle::tables(self)
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnDef>, StoreError> {
        QueryHandle::columns(self, table)
    }

    fn table(&self, table: &str) -> Result<TableData, StoreError> {
        QueryHandle::table(self, table)
    }

    fn query(&self, sql: &str, params: &[sift_storage::Cell]) -> Result<TableData, StoreError> {
        QueryHandle::query(self, sql, params)
    }
}

// ──────────────────────────────────────────────
// Modules
// ──────────────────────────────────────────────

/// A capability module a script has imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Db,
    Frame,
}

impl Module {
    pub fn resolve(path: &str) -> Option<Module> {
        match path {
            "db" => Some(Module::Db),
            "frame" => Some(Module::Frame),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Module::Db => sift_core::policy::DB.name,
            Module::Frame => sift_core::policy::FRAME.name,
        }
    }

    pub fn has_member(self, member: &str) -> bool {
        let cap = match self {
            Module::Db => &sift_core::policy::DB,
            Module::Frame => &sift_core::policy::FRAME,
        };
        cap.members.contains(&member)
    }

    pub fn call(self, member: &str, args: Vec<Value>, source: &dyn DataSource) -> FaultResult<Value> {
        match self {
            Module::Db => call_db(member, args, source),
            Module::Frame => call_frame(member, args),
        }
    }
}

fn arity(module: Module, member: &str, args: &[Value], min: usize, max: usize) -> FaultResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(Fault::Type(format!(
            "{}.{}() takes {} argument(s), got {}",
            module.name(),
            member,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn call_db(member: &str, args: Vec<Value>, source: &dyn DataSource) -> FaultResult<Value> {
    let module = Module::Db;
    match member {
        "tables" => {
            arity(module, member, &args, 0, 0)?;
            let tables = source.tables()?;
            Ok(Value::list(tables.into_iter().map(Value::Str).collect()))
        }
        "columns" => {
            arity(module, member, &args, 1, 1)?;
            let table = args[0].expect_str("table name")?;
            let columns = source
                .columns(table)?
                .into_iter()
                .map(|c| {
                    Value::map(Map::from_iter([
                        ("name".to_string(), Value::Str(c.name)),
                        ("type".to_string(), Value::str(c.ty.as_str())),
                    ]))
                })
                .collect();
            Ok(Value::list(columns))
        }
        "table" => {
            arity(module, member, &args, 1, 1)?;
            let table = args[0].expect_str("table name")?;
            Ok(Value::frame(Frame::from_table(source.table(table)?)))
        }
        "query" => {
            arity(module, member, &args, 1, 2)?;
            let sql = args[0].expect_str("query text")?;
            let params = match args.get(1) {
                None => Vec::new(),
                Some(Value::List(items)) => items
                    .borrow()
                    .iter()
                    .map(Value::to_cell)
                    .collect::<FaultResult<Vec<_>>>()?,
                Some(other) => {
                    return Err(Fault::Type(format!(
                        "db.query() parameters must be a list, got {}",
                        other.type_name()
                    )))
                }
            };
            tracing::debug!(sql, params = params.len(), "script query");
            Ok(Value::frame(Frame::from_table(source.query(sql, &params)?)))
        }
        other => Err(Fault::Name(format!("module 'db' has no member '{}'", other))),
    }
}

fn call_frame(member: &str, args: Vec<Value>) -> FaultResult<Value> {
    let module = Module::Frame;
    match member {
        "from_rows" => {
            arity(module, member, &args, 1, 1)?;
            let Value::List(items) = &args[0] else {
                return Err(Fault::ty("frame.from_rows() needs a list of maps"));
            };
            let items = items.borrow();
            Ok(Value::frame(Frame::from_maps(&items)?))
        }
        "new" => {
            arity(module, member, &args, 2, 2)?;
            let columns = string_list(&args[0], "frame.new() columns")?;
            let Value::List(rows) = &args[1] else {
                return Err(Fault::ty("frame.new() rows must be a list of lists"));
            };
            let rows = rows
                .borrow()
                .iter()
                .map(|row| match row {
                    Value::List(cells) => Ok(cells.borrow().clone()),
                    other => Err(Fault::Type(format!(
                        "frame.new() rows must be lists, found a {}",
                        other.type_name()
                    ))),
                })
                .collect::<FaultResult<Vec<_>>>()?;
            Ok(Value::frame(Frame::new(columns, rows)?))
        }
        "concat" => {
            arity(module, member, &args, 2, 2)?;
            match (&args[0], &args[1]) {
                (Value::Frame(a), Value::Frame(b)) => Ok(Value::frame(a.concat(b))),
                (a, b) => Err(Fault::Type(format!(
                    "frame.concat() needs two frames, got {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
        other => Err(Fault::Name(format!("module 'frame' has no member '{}'", other))),
    }
}

/// A string or a list of strings, as column arguments accept.
pub(crate) fn string_list(value: &Value, what: &str) -> FaultResult<Vec<String>> {
    match value {
        Value::Str(s) => Ok(vec![s.clone()]),
        Value::List(items) => items
            .borrow()
            .iter()
            .map(|v| v.expect_str(what).map(str::to_string))
            .collect(),
        other => Err(Fault::Type(format!(
            "{} must be a string or a list of strings, got {}",
            what,
            other.type_name()
        ))),
    }
}
