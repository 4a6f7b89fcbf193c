//! Value methods: `receiver.name(args)`.
//!
//! Only the names in `sift_core::policy::VALUE_METHODS` exist. Anything
//! else, including export-style names like `to_csv`, is a name error at
//! runtime whatever the validator decided.

use std::rc::Rc;

use crate::builtins;
use crate::capability::string_list;
use crate::error::{Fault, FaultResult};
use crate::frame::{Aggregate, Frame, Grouped, JoinKind};
use crate::numeric;
use crate::value::{Map, Value};

fn no_method(receiver: &Value, name: &str) -> Fault {
    Fault::Name(format!("{} has no method '{}'", receiver.type_name(), name))
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> FaultResult<()> {
    if args.len() < min || args.len() > max {
        return Err(Fault::Type(format!(
            ".{}() takes {} argument(s), got {}",
            name,
            if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            },
            args.len()
        )));
    }
    Ok(())
}

pub fn call(receiver: &Value, name: &str, args: Vec<Value>) -> FaultResult<Value> {
    if !sift_core::policy::VALUE_METHODS.contains(&name) {
        return Err(no_method(receiver, name));
    }
    match receiver {
        Value::Frame(frame) => frame_method(frame, receiver, name, args),
        Value::Grouped(grouped) => grouped_method(grouped, receiver, name, args),
        Value::List(_) => list_method(receiver, name, args),
        Value::Map(_) => map_method(receiver, name, args),
        Value::Str(s) => str_method(s, receiver, name, args),
        other => Err(no_method(other, name)),
    }
}

// ──────────────────────────────────────────────
// Frames
// ──────────────────────────────────────────────

fn frame_method(frame: &Rc<Frame>, receiver: &Value, name: &str, args: Vec<Value>) -> FaultResult<Value> {
    match name {
        "rows" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(frame.row_maps()))
        }
        "columns" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(frame.columns().iter().cloned().map(Value::Str).collect()))
        }
        "count" | "len" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Int(frame.len() as i64))
        }
        "column" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::list(frame.column(args[0].expect_str("column name")?)?))
        }
        "select" => {
            if args.is_empty() {
                return Err(Fault::ty(".select() needs at least one column"));
            }
            let columns = if args.len() == 1 {
                string_list(&args[0], "select() columns")?
            } else {
                args.iter()
                    .map(|a| a.expect_str("select() column").map(str::to_string))
                    .collect::<FaultResult<Vec<_>>>()?
            };
            Ok(Value::frame(frame.select(&columns)?))
        }
        "where" => {
            arity(name, &args, 2, 3)?;
            let column = args[0].expect_str("where() column")?;
            let (op, value) = match args.len() {
                2 => ("==", &args[1]),
                _ => (args[1].expect_str("where() comparison")?, &args[2]),
            };
            Ok(Value::frame(frame.filter(column, op, value)?))
        }
        "sort" => {
            arity(name, &args, 1, 2)?;
            let columns = string_list(&args[0], "sort() columns")?;
            let descending = args.get(1).is_some_and(Value::truthy);
            Ok(Value::frame(frame.sort(&columns, descending)?))
        }
        "head" => {
            arity(name, &args, 0, 1)?;
            let n = match args.first() {
                Some(v) => v.expect_int("head() count")?,
                None => 5,
            };
            Ok(Value::frame(frame.head(n.max(0) as usize)))
        }
        "group_by" => {
            if args.is_empty() {
                return Err(Fault::ty(".group_by() needs at least one column"));
            }
            let keys = if args.len() == 1 {
                string_list(&args[0], "group_by() columns")?
            } else {
                args.iter()
                    .map(|a| a.expect_str("group_by() column").map(str::to_string))
                    .collect::<FaultResult<Vec<_>>>()?
            };
            Ok(Value::Grouped(Rc::new(frame.group_by(&keys)?)))
        }
        "sum" | "mean" | "min" | "max" => {
            arity(name, &args, 1, 1)?;
            let agg = Aggregate::from_method(name).ok_or_else(|| no_method(receiver, name))?;
            frame.aggregate(args[0].expect_str("column name")?, agg)
        }
        "distinct" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(col) => Ok(Value::list(frame.distinct_values(col.expect_str("column name")?)?)),
                None => Ok(Value::frame(frame.distinct_rows())),
            }
        }
        "with_column" => {
            arity(name, &args, 2, 2)?;
            Ok(Value::frame(
                frame.with_column(args[0].expect_str("column name")?, &args[1])?,
            ))
        }
        "rename" => {
            arity(name, &args, 2, 2)?;
            Ok(Value::frame(frame.rename(
                args[0].expect_str("old column name")?,
                args[1].expect_str("new column name")?,
            )?))
        }
        "join" => {
            arity(name, &args, 2, 3)?;
            let Value::Frame(other) = &args[0] else {
                return Err(Fault::Type(format!(
                    ".join() needs a frame, got {}",
                    args[0].type_name()
                )));
            };
            let on = args[1].expect_str("join() column")?;
            let kind = match args.get(2).map(|v| v.expect_str("join() kind")).transpose()? {
                None | Some("inner") => JoinKind::Inner,
                Some("left") => JoinKind::Left,
                Some(other) => {
                    return Err(Fault::Type(format!(
                        "unknown join kind '{}' (use \"inner\" or \"left\")",
                        other
                    )))
                }
            };
            Ok(Value::frame(frame.join(other, on, kind)?))
        }
        "contains" => {
            arity(name, &args, 1, 1)?;
            let column = args[0].expect_str("column name")?;
            Ok(Value::Bool(frame.columns().iter().any(|c| c == column)))
        }
        _ => Err(no_method(receiver, name)),
    }
}

fn grouped_method(
    grouped: &Rc<Grouped>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> FaultResult<Value> {
    match name {
        "count" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::frame(grouped.count()))
        }
        "len" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Int(grouped.len() as i64))
        }
        "sum" | "mean" | "min" | "max" => {
            arity(name, &args, 1, 1)?;
            let agg = Aggregate::from_method(name).ok_or_else(|| no_method(receiver, name))?;
            Ok(Value::frame(
                grouped.aggregate(args[0].expect_str("column name")?, agg)?,
            ))
        }
        _ => Err(no_method(receiver, name)),
    }
}

// ──────────────────────────────────────────────
// Lists, maps, strings
// ──────────────────────────────────────────────

fn list_method(receiver: &Value, name: &str, args: Vec<Value>) -> FaultResult<Value> {
    let Value::List(items) = receiver else {
        return Err(no_method(receiver, name));
    };
    match name {
        "len" | "count" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Int(items.borrow().len() as i64))
        }
        "contains" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(items.borrow().iter().any(|v| v.equals(&args[0]))))
        }
        "append" => {
            arity(name, &args, 1, 1)?;
            let value = args.into_iter().next().unwrap_or(Value::Null);
            items.borrow_mut().push(value);
            Ok(Value::Null)
        }
        "get" => {
            arity(name, &args, 1, 2)?;
            let items = items.borrow();
            let index = args[0].expect_int("list index")?;
            Ok(resolve_index(index, items.len())
                .map(|i| items[i].clone())
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
        }
        "set" => {
            arity(name, &args, 2, 2)?;
            let index = args[0].expect_int("list index")?;
            set_list_item(receiver, index, args[1].clone())?;
            Ok(Value::Null)
        }
        "sum" => {
            arity(name, &args, 0, 0)?;
            numeric::sum(items.borrow().iter())
        }
        "mean" => {
            arity(name, &args, 0, 0)?;
            numeric::mean(items.borrow().iter())
        }
        "min" | "max" => {
            arity(name, &args, 0, 0)?;
            numeric::extreme(items.borrow().iter(), name == "max")
        }
        "distinct" => {
            arity(name, &args, 0, 0)?;
            let mut seen = std::collections::HashSet::new();
            Ok(Value::list(
                items
                    .borrow()
                    .iter()
                    .filter(|v| seen.insert(v.key()))
                    .cloned()
                    .collect(),
            ))
        }
        "sort" => {
            arity(name, &args, 0, 1)?;
            let mut sorted = items.borrow().clone();
            sorted.sort_by(Value::sort_cmp);
            if args.first().is_some_and(Value::truthy) {
                sorted.reverse();
            }
            Ok(Value::list(sorted))
        }
        "head" => {
            arity(name, &args, 0, 1)?;
            let n = match args.first() {
                Some(v) => v.expect_int("head() count")?.max(0) as usize,
                None => 5,
            };
            Ok(Value::list(items.borrow().iter().take(n).cloned().collect()))
        }
        _ => Err(no_method(receiver, name)),
    }
}

fn map_method(receiver: &Value, name: &str, args: Vec<Value>) -> FaultResult<Value> {
    let Value::Map(map) = receiver else {
        return Err(no_method(receiver, name));
    };
    match name {
        "len" | "count" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Int(map.borrow().len() as i64))
        }
        "contains" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(map.borrow().contains_key(args[0].expect_str("map key")?)))
        }
        "get" => {
            arity(name, &args, 1, 2)?;
            let key = args[0].expect_str("map key")?;
            Ok(map
                .borrow()
                .get(key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
        }
        "set" => {
            arity(name, &args, 2, 2)?;
            let key = args[0].expect_str("map key")?.to_string();
            map.borrow_mut().insert(key, args[1].clone());
            Ok(Value::Null)
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(map.borrow().keys().cloned().map(Value::Str).collect()))
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(map.borrow().iter().map(|(_, v)| v.clone()).collect()))
        }
        _ => Err(no_method(receiver, name)),
    }
}

fn str_method(s: &str, receiver: &Value, name: &str, args: Vec<Value>) -> FaultResult<Value> {
    let text_arg = |i: usize, what: &str| -> FaultResult<String> {
        args[i].expect_str(what).map(str::to_string)
    };
    match name {
        "len" => {
            arity(name, &args, 0, 0)?;
            builtins::length(receiver).map(|n| Value::Int(n as i64))
        }
        "lower" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::str(s.to_lowercase()))
        }
        "upper" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::str(s.to_uppercase()))
        }
        "strip" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::str(s.trim()))
        }
        "contains" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(s.contains(text_arg(0, "substring")?.as_str())))
        }
        "starts_with" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(s.starts_with(text_arg(0, "prefix")?.as_str())))
        }
        "ends_with" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(s.ends_with(text_arg(0, "suffix")?.as_str())))
        }
        "replace" => {
            arity(name, &args, 2, 2)?;
            let from = text_arg(0, "pattern")?;
            if from.is_empty() {
                return Err(Fault::ty(".replace() pattern must not be empty"));
            }
            Ok(Value::str(s.replace(&from, &text_arg(1, "replacement")?)))
        }
        "split" => {
            arity(name, &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None => s.split_whitespace().map(Value::str).collect(),
                Some(_) => {
                    let sep = text_arg(0, "separator")?;
                    if sep.is_empty() {
                        return Err(Fault::ty(".split() separator must not be empty"));
                    }
                    s.split(sep.as_str()).map(Value::str).collect()
                }
            };
            Ok(Value::list(parts))
        }
        _ => Err(no_method(receiver, name)),
    }
}

// ──────────────────────────────────────────────
// Indexing
// ──────────────────────────────────────────────

/// Python-style index: negative counts from the end.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

/// `target[index]` for lists, maps, strings and frames (a column).
pub fn index(target: &Value, index: &Value) -> FaultResult<Value> {
    match target {
        Value::List(items) => {
            let items = items.borrow();
            let i = index.expect_int("list index")?;
            resolve_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| Fault::Index(format!("list index {} out of range (len {})", i, items.len())))
        }
        Value::Map(map) => {
            let key = index.expect_str("map key")?;
            map.borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| Fault::Index(format!("no key '{}'", key)))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = index.expect_int("string index")?;
            resolve_index(i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| Fault::Index(format!("string index {} out of range", i)))
        }
        Value::Frame(frame) => Ok(Value::list(frame.column(index.expect_str("column name")?)?)),
        other => Err(Fault::Type(format!("a {} cannot be indexed", other.type_name()))),
    }
}

/// `target[index] = value` for lists and maps.
pub fn set_index(target: &Value, index: &Value, value: Value) -> FaultResult<()> {
    match target {
        Value::List(_) => set_list_item(target, index.expect_int("list index")?, value),
        Value::Map(map) => {
            let key = index.expect_str("map key")?.to_string();
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(Fault::Type(format!(
            "a {} does not support item assignment",
            other.type_name()
        ))),
    }
}

fn set_list_item(target: &Value, index: i64, value: Value) -> FaultResult<()> {
    let Value::List(items) = target else {
        return Err(Fault::Type(format!("a {} is not a list", target.type_name())));
    };
    let mut items = items.borrow_mut();
    let len = items.len();
    let i = resolve_index(index, len)
        .ok_or_else(|| Fault::Index(format!("list index {} out of range (len {})", index, len)))?;
    items[i] = value;
    Ok(())
}

/// Build a map value from key/value pairs.
pub fn map_of(entries: Vec<(String, Value)>) -> Value {
    Value::map(entries.into_iter().collect::<Map>())
}
