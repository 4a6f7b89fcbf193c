//! Runtime values.
//!
//! Numbers are `i64` or exact `rust_decimal::Decimal`; there is no binary
//! floating point anywhere in evaluation. Lists and maps are shared and
//! mutable (`append`, `set` and index assignment change them in place),
//! frames are immutable and every frame operation returns a new one.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sift_storage::Cell;

use crate::error::{Fault, FaultResult};
use crate::frame::{Frame, Grouped};

pub type Shared<T> = Rc<RefCell<T>>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Str(String),
    List(Shared<Vec<Value>>),
    Map(Shared<Map>),
    Frame(Rc<Frame>),
    Grouped(Rc<Grouped>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(map: Map) -> Value {
        Value::Map(Rc::new(RefCell::new(map)))
    }

    pub fn frame(frame: Frame) -> Value {
        Value::Frame(Rc::new(frame))
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Decimal(_) => "decimal",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Frame(_) => "frame",
            Value::Grouped(_) => "grouped frame",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Decimal(d) => !d.is_zero(),
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Map(map) => !map.borrow().is_empty(),
            Value::Frame(frame) => frame.len() > 0,
            Value::Grouped(grouped) => grouped.len() > 0,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view, promoting integers.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int(n) => Some(Decimal::from(*n)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn expect_int(&self, what: &str) -> FaultResult<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Decimal(d) if d.fract().is_zero() => d
                .to_i64()
                .ok_or_else(|| Fault::Arithmetic(format!("{} is out of integer range", d))),
            other => Err(Fault::Type(format!(
                "{} must be an integer, got {}",
                what,
                other.type_name()
            ))),
        }
    }

    pub fn expect_str(&self, what: &str) -> FaultResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(Fault::Type(format!(
                "{} must be a string, got {}",
                what,
                other.type_name()
            ))),
        }
    }

    /// Structural equality. Integers and decimals compare by value.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => a.borrow().equals(&b.borrow()),
            (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b) || a.equals(b),
            (Value::Grouped(a), Value::Grouped(b)) => Rc::ptr_eq(a, b),
            _ => match (self.as_decimal(), other.as_decimal()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`: numbers with numbers, strings with
    /// strings, bools with bools. Anything else is a type error.
    pub fn compare(&self, other: &Value) -> FaultResult<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            _ => match (self.as_decimal(), other.as_decimal()) {
                (Some(a), Some(b)) => Ok(a.cmp(&b)),
                _ => Err(Fault::Type(format!(
                    "cannot compare {} with {}",
                    self.type_name(),
                    other.type_name()
                ))),
            },
        }
    }

    /// Total order used for sorting mixed data: null, bools, numbers,
    /// strings, then everything else in encounter order.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Decimal(_) => 2,
                Value::Str(_) => 3,
                _ => 4,
            }
        }
        match rank(self).cmp(&rank(other)) {
            Ordering::Equal => self.compare(other).unwrap_or(Ordering::Equal),
            unequal => unequal,
        }
    }

    /// Canonical text for grouping and de-duplication. Equal values give
    /// equal keys.
    pub fn key(&self) -> String {
        match self {
            Value::Null => "z".to_string(),
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(_) | Value::Decimal(_) => match self.as_decimal() {
                Some(d) => format!("n:{}", d.normalize()),
                None => String::new(),
            },
            Value::Str(s) => format!("s:{}:{}", s.len(), s),
            Value::List(items) => {
                let inner: Vec<String> = items.borrow().iter().map(Value::key).collect();
                format!("l:[{}]", inner.join(","))
            }
            other => format!("o:{}", other),
        }
    }

    pub fn from_cell(cell: Cell) -> Value {
        match cell {
            Cell::Null => Value::Null,
            Cell::Integer(n) => Value::Int(n),
            Cell::Real(d) => Value::Decimal(d),
            Cell::Text(s) => Value::Str(s),
        }
    }

    /// Convert to a query parameter.
    pub fn to_cell(&self) -> FaultResult<Cell> {
        match self {
            Value::Null => Ok(Cell::Null),
            Value::Bool(b) => Ok(Cell::Integer(i64::from(*b))),
            Value::Int(n) => Ok(Cell::Integer(*n)),
            Value::Decimal(d) => Ok(Cell::Real(*d)),
            Value::Str(s) => Ok(Cell::Text(s.clone())),
            other => Err(Fault::Type(format!(
                "a {} cannot be a query parameter",
                other.type_name()
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Decimal(d) => Cell::Real(*d).to_json(),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.borrow().iter().map(Value::to_json).collect())
            }
            Value::Map(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map.borrow().iter() {
                    out.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(out)
            }
            Value::Frame(frame) => serde_json::json!({
                "columns": frame.columns(),
                "rows": frame
                    .rows()
                    .iter()
                    .map(|row| row.iter().map(Value::to_json).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
            }),
            Value::Grouped(grouped) => serde_json::json!({
                "grouped_by": grouped.keys(),
                "groups": grouped.len(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d.normalize()),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_nested(f, item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: ", k)?;
                    write_nested(f, v)?;
                }
                write!(f, "}}")
            }
            Value::Frame(frame) => write!(
                f,
                "<frame {} rows x {} columns>",
                frame.len(),
                frame.columns().len()
            ),
            Value::Grouped(grouped) => write!(
                f,
                "<grouped frame by {} ({} groups)>",
                grouped.keys().join(", "),
                grouped.len()
            ),
        }
    }
}

/// Strings inside containers are quoted.
fn write_nested(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Str(s) => write!(f, "{:?}", s),
        other => write!(f, "{}", other),
    }
}

// ──────────────────────────────────────────────
// Map
// ──────────────────────────────────────────────

/// String-keyed map that keeps insertion order, so rows built from maps
/// keep the column order the script wrote.
#[derive(Debug, Clone, Default)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Map {
    pub fn new() -> Self {
        Map::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    fn equals(&self, other: &Map) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| v.equals(o)))
    }
}

impl FromIterator<(String, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).expect("decimal"))
    }

    #[test]
    fn ints_and_decimals_compare_by_value() {
        assert!(Value::Int(2).equals(&dec("2.00")));
        assert_eq!(Value::Int(2).key(), dec("2.0").key());
        assert_eq!(Value::Int(1).compare(&dec("1.5")), Ok(Ordering::Less));
        assert!(Value::Int(1).compare(&Value::str("1")).is_err());
    }

    #[test]
    fn sort_order_is_total() {
        let mut values = vec![Value::str("b"), Value::Int(3), Value::Null, dec("1.5"), Value::Bool(true)];
        values.sort_by(Value::sort_cmp);
        let shown: Vec<String> = values.iter().map(Value::to_string).collect();
        assert_eq!(shown, vec!["null", "true", "1.5", "3", "b"]);
    }

    #[test]
    fn lists_are_shared() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = a.clone();
        if let Value::List(items) = &b {
            items.borrow_mut().push(Value::Int(2));
        }
        assert_eq!(a.to_string(), "[1, 2]");
    }

    #[test]
    fn maps_keep_insertion_order() {
        let map: Map = [("b", 1), ("a", 2), ("b", 3)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::Int(v)))
            .collect();
        assert_eq!(Value::map(map).to_string(), "{\"b\": 3, \"a\": 2}");
    }

    #[test]
    fn json_rendering() {
        let map: Map = [("n".to_string(), dec("2.50")), ("s".to_string(), Value::Null)]
            .into_iter()
            .collect();
        assert_eq!(
            Value::list(vec![Value::map(map), Value::Bool(false)]).to_json(),
            serde_json::json!([{"n": 2.5, "s": null}, false])
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::str("").truthy());
        assert!(!dec("0.0").truthy());
        assert!(Value::list(vec![Value::Null]).truthy());
    }
}
