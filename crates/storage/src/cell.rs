//! Typed cell values as they move between source files, the hasher and
//! SQLite.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Declared type of a stored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTEGER" => Ok(ColumnType::Integer),
            "REAL" => Ok(ColumnType::Real),
            "TEXT" => Ok(ColumnType::Text),
            other => Err(format!("unknown column type '{}'", other)),
        }
    }
}

/// One field value. `Real` keeps exact decimal digits in memory; SQLite
/// stores it as a double.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(Decimal),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Parse raw text from a source file. Empty (after trimming) is null.
    pub fn parse(raw: &str, ty: ColumnType) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Null;
        }
        match ty {
            ColumnType::Integer => trimmed
                .parse::<i64>()
                .map(Cell::Integer)
                .unwrap_or_else(|_| Cell::Text(trimmed.to_string())),
            ColumnType::Real => parse_decimal(trimmed)
                .map(Cell::Real)
                .unwrap_or_else(|| Cell::Text(trimmed.to_string())),
            ColumnType::Text => Cell::Text(trimmed.to_string()),
        }
    }

    /// Convert to the stored type of a column. The stored type always wins,
    /// so the same source value lands as the same cell whatever type a
    /// particular file inferred: integral decimals and numeric text are
    /// re-read under INTEGER and REAL, and only values that do not fit a
    /// numeric column are kept as text.
    pub fn coerce(self, target: ColumnType) -> Cell {
        match (self, target) {
            (Cell::Null, _) => Cell::Null,
            (Cell::Integer(n), ColumnType::Integer) => Cell::Integer(n),
            (Cell::Integer(n), ColumnType::Real) => Cell::Real(Decimal::from(n)),
            (Cell::Integer(n), ColumnType::Text) => Cell::Text(n.to_string()),
            (Cell::Real(d), ColumnType::Real) => Cell::Real(d),
            (Cell::Real(d), ColumnType::Integer) => match integral(d) {
                Some(n) => Cell::Integer(n),
                None => Cell::Text(d.to_string()),
            },
            // Unnormalised, so `2.50` reads back as the digits the file held.
            (Cell::Real(d), ColumnType::Text) => Cell::Text(d.to_string()),
            (Cell::Text(s), ColumnType::Text) => Cell::Text(s),
            (Cell::Text(s), numeric) => match Cell::parse(&s, numeric) {
                Cell::Null => Cell::Text(s),
                cell => cell,
            },
        }
    }

    /// Canonical textual rendering.
    pub fn render(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Integer(n) => n.to_string(),
            Cell::Real(d) => d.normalize().to_string(),
            Cell::Text(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null => serde_json::Value::Null,
            Cell::Integer(n) => serde_json::Value::from(*n),
            Cell::Real(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(d.to_string())),
            Cell::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// `d` as an `i64` when it has no fractional part and fits.
fn integral(d: Decimal) -> Option<i64> {
    if d.fract().is_zero() {
        d.to_i64()
    } else {
        None
    }
}

pub(crate) fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::from(rusqlite::types::Null),
            Cell::Integer(n) => ToSqlOutput::from(*n),
            Cell::Real(d) => ToSqlOutput::from(d.to_f64().unwrap_or(f64::NAN)),
            Cell::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for Cell {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(n) => Cell::Integer(n),
            ValueRef::Real(f) => Cell::Real(
                Decimal::from_f64(f)
                    .ok_or_else(|| FromSqlError::Other(format!("non-finite real {}", f).into()))?,
            ),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Text(hex::encode(b)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cells_are_null() {
        assert_eq!(Cell::parse("  ", ColumnType::Integer), Cell::Null);
        assert_eq!(Cell::parse("", ColumnType::Text), Cell::Null);
    }

    #[test]
    fn integers_promote_under_real_columns() {
        let cell = Cell::parse("10", ColumnType::Integer).coerce(ColumnType::Real);
        assert_eq!(cell, Cell::Real(Decimal::from(10)));
    }

    #[test]
    fn mismatches_fall_back_to_text() {
        let real = Cell::Real(Decimal::from_str("2.50").expect("decimal"));
        assert_eq!(real.clone().coerce(ColumnType::Integer), Cell::Text("2.50".into()));
        assert_eq!(real.coerce(ColumnType::Text), Cell::Text("2.50".into()));
        assert_eq!(
            Cell::Text("abc".into()).coerce(ColumnType::Real),
            Cell::Text("abc".into())
        );
        assert_eq!(Cell::Integer(7).coerce(ColumnType::Text), Cell::Text("7".into()));
    }

    #[test]
    fn same_source_value_coerces_alike_under_any_inference() {
        // "20" read by a file that inferred INTEGER, REAL or TEXT.
        let as_int = Cell::parse("20", ColumnType::Integer);
        let as_real = Cell::parse("20", ColumnType::Real);
        let as_text = Cell::parse("20", ColumnType::Text);
        for target in [ColumnType::Integer, ColumnType::Real, ColumnType::Text] {
            let expected = as_int.clone().coerce(target);
            assert_eq!(as_real.clone().coerce(target), expected, "{target}");
            assert_eq!(as_text.clone().coerce(target), expected, "{target}");
        }
        assert_eq!(as_real.coerce(ColumnType::Integer), Cell::Integer(20));
    }

    #[test]
    fn numeric_text_is_reread_under_numeric_columns() {
        assert_eq!(Cell::Text(" 42 ".into()).coerce(ColumnType::Integer), Cell::Integer(42));
        assert_eq!(
            Cell::Text("1.25".into()).coerce(ColumnType::Real),
            Cell::Real(Decimal::from_str("1.25").expect("decimal"))
        );
        assert_eq!(
            Cell::Text("1.25".into()).coerce(ColumnType::Integer),
            Cell::Text("1.25".into())
        );
        assert_eq!(
            Cell::Text("N/A".into()).coerce(ColumnType::Integer),
            Cell::Text("N/A".into())
        );
    }

    #[test]
    fn out_of_range_decimals_stay_text() {
        let huge = Decimal::from_str("99999999999999999999").expect("decimal");
        assert_eq!(
            Cell::Real(huge).coerce(ColumnType::Integer),
            Cell::Text("99999999999999999999".into())
        );
    }

    #[test]
    fn column_type_round_trips_through_its_name() {
        for ty in [ColumnType::Integer, ColumnType::Real, ColumnType::Text] {
            assert_eq!(ty.as_str().parse::<ColumnType>(), Ok(ty));
        }
    }
}
