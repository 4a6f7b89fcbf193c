//! Builtin functions callable by bare name.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{Fault, FaultResult};
use crate::numeric;
use crate::value::Value;

/// Longest list `range` may build.
pub const MAX_RANGE: i64 = 1_000_000;

pub fn is_builtin(name: &str) -> bool {
    sift_core::policy::BUILTIN_FUNCTIONS.contains(&name)
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> FaultResult<()> {
    if args.len() < min || args.len() > max {
        return Err(Fault::Type(format!(
            "{}() takes {} argument(s), got {}",
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

/// Call builtin `name`. `print` writes to `console`.
pub fn call(name: &str, args: Vec<Value>, console: &mut Vec<String>) -> FaultResult<Value> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            length(&args[0]).map(|n| Value::Int(n as i64))
        }
        "str" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "int" => {
            arity(name, &args, 1, 1)?;
            to_int(&args[0])
        }
        "float" => {
            arity(name, &args, 1, 1)?;
            to_decimal(&args[0])
        }
        "round" => {
            arity(name, &args, 1, 2)?;
            let places = match args.get(1) {
                Some(p) => Some(p.expect_int("round() places")?),
                None => None,
            };
            numeric::round(&args[0], places)
        }
        "abs" => {
            arity(name, &args, 1, 1)?;
            numeric::abs(&args[0])
        }
        "min" | "max" => {
            let largest = name == "max";
            let values = spread(name, args)?;
            if values.is_empty() {
                return Err(Fault::Type(format!("{}() of an empty sequence", name)));
            }
            numeric::extreme(&values, largest)
        }
        "sum" => {
            arity(name, &args, 1, 1)?;
            let Value::List(items) = &args[0] else {
                return Err(Fault::Type(format!(
                    "sum() needs a list, got {}",
                    args[0].type_name()
                )));
            };
            let items = items.borrow();
            numeric::sum(items.iter())
        }
        "range" => {
            arity(name, &args, 1, 3)?;
            range(&args)
        }
        "keys" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Map(map) => Ok(Value::list(
                    map.borrow().keys().cloned().map(Value::Str).collect(),
                )),
                other => Err(Fault::Type(format!("keys() needs a map, got {}", other.type_name()))),
            }
        }
        "sorted" => {
            arity(name, &args, 1, 2)?;
            let descending = args.get(1).is_some_and(Value::truthy);
            let mut items = match &args[0] {
                Value::List(items) => items.borrow().clone(),
                Value::Map(map) => map.borrow().keys().cloned().map(Value::Str).collect(),
                other => {
                    return Err(Fault::Type(format!(
                        "sorted() needs a list, got {}",
                        other.type_name()
                    )))
                }
            };
            items.sort_by(Value::sort_cmp);
            if descending {
                items.reverse();
            }
            Ok(Value::list(items))
        }
        "print" => {
            let line = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
            console.push(line);
            Ok(Value::Null)
        }
        other => Err(Fault::Name(format!("no function named '{}'", other))),
    }
}

pub(crate) fn length(value: &Value) -> FaultResult<usize> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.borrow().len()),
        Value::Map(map) => Ok(map.borrow().len()),
        Value::Frame(frame) => Ok(frame.len()),
        Value::Grouped(grouped) => Ok(grouped.len()),
        other => Err(Fault::Type(format!("{} has no length", other.type_name()))),
    }
}

/// `min(list)` or `min(a, b, ...)`.
fn spread(name: &str, args: Vec<Value>) -> FaultResult<Vec<Value>> {
    match args.as_slice() {
        [] => Err(Fault::Type(format!("{}() needs at least one argument", name))),
        [Value::List(items)] => Ok(items.borrow().clone()),
        _ => Ok(args),
    }
}

fn to_int(value: &Value) -> FaultResult<Value> {
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Decimal(d) => Value::Decimal(d.trunc()).expect_int("int()").map(Value::Int),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Fault::Type(format!("int() cannot parse '{}'", s))),
        other => Err(Fault::Type(format!("int() cannot convert a {}", other.type_name()))),
    }
}

fn to_decimal(value: &Value) -> FaultResult<Value> {
    match value {
        Value::Int(n) => Ok(Value::Decimal(Decimal::from(*n))),
        Value::Decimal(d) => Ok(Value::Decimal(*d)),
        Value::Str(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .map(Value::Decimal)
                .map_err(|_| Fault::Type(format!("float() cannot parse '{}'", s)))
        }
        other => Err(Fault::Type(format!("float() cannot convert a {}", other.type_name()))),
    }
}

fn range(args: &[Value]) -> FaultResult<Value> {
    let ints = args
        .iter()
        .map(|a| a.expect_int("range() argument"))
        .collect::<FaultResult<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(Fault::ty("range() takes 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(Fault::Arithmetic("range() step must not be zero".to_string()));
    }
    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        (span - 1) / step.saturating_abs() + 1
    };
    if count > MAX_RANGE {
        return Err(Fault::Limit(format!(
            "range() would build {} items (limit {})",
            count, MAX_RANGE
        )));
    }
    let mut items = Vec::with_capacity(count as usize);
    let mut n = start;
    for _ in 0..count {
        items.push(Value::Int(n));
        n = n.saturating_add(step);
    }
    Ok(Value::list(items))
}
