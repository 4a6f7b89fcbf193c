//! The tabular-data library exposed to scripts as `frame` values.
//!
//! A [`Frame`] is an immutable table of named columns; every operation
//! returns a new frame. [`Grouped`] is the result of `group_by` and only
//! supports aggregation back into a frame.

use std::collections::HashMap;

use sift_storage::TableData;

use crate::error::{Fault, FaultResult};
use crate::numeric;
use crate::value::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Which aggregate a grouped or whole-frame reduction computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Mean,
    Min,
    Max,
}

impl Aggregate {
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Aggregate::Sum),
            "mean" => Some(Aggregate::Mean),
            "min" => Some(Aggregate::Min),
            "max" => Some(Aggregate::Max),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Mean => "mean",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        }
    }

    pub fn apply<'a>(self, values: impl IntoIterator<Item = &'a Value>) -> FaultResult<Value> {
        match self {
            Aggregate::Sum => numeric::sum(values),
            Aggregate::Mean => numeric::mean(values),
            Aggregate::Min => numeric::extreme(values, false),
            Aggregate::Max => numeric::extreme(values, true),
        }
    }
}

/// How `join` treats left rows without a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl Frame {
    /// Build a frame, checking every row has one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> FaultResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(Fault::Column(format!("duplicate column '{}'", c)));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Fault::Column(format!(
                    "row {} has {} values but the frame has {} columns",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Frame { columns, rows })
    }

    pub fn from_table(data: TableData) -> Self {
        Frame {
            columns: data.columns,
            rows: data
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(Value::from_cell).collect())
                .collect(),
        }
    }

    /// Build a frame from a list of maps. Columns appear in first-seen
    /// order; keys missing from a row are null.
    pub fn from_maps(items: &[Value]) -> FaultResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        for item in items {
            let Value::Map(map) = item else {
                return Err(Fault::Type(format!(
                    "from_rows needs a list of maps, found a {}",
                    item.type_name()
                )));
            };
            for key in map.borrow().keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = items
            .iter()
            .filter_map(|item| match item {
                Value::Map(map) => {
                    let map = map.borrow();
                    Some(
                        columns
                            .iter()
                            .map(|c| map.get(c).cloned().unwrap_or(Value::Null))
                            .collect(),
                    )
                }
                _ => None,
            })
            .collect();
        Ok(Frame { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn equals(&self, other: &Frame) -> bool {
        self.columns == other.columns
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(&other.rows)
                .all(|(a, b)| a.iter().zip(b).all(|(x, y)| x.equals(y)))
    }

    fn index_of(&self, column: &str) -> FaultResult<usize> {
        self.columns.iter().position(|c| c == column).ok_or_else(|| {
            Fault::Column(format!(
                "no column '{}' (columns: {})",
                column,
                self.columns.join(", ")
            ))
        })
    }

    /// Rows as maps, in order.
    pub fn row_maps(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                Value::map(
                    self.columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect::<Map>(),
                )
            })
            .collect()
    }

    pub fn column(&self, column: &str) -> FaultResult<Vec<Value>> {
        let i = self.index_of(column)?;
        Ok(self.rows.iter().map(|row| row[i].clone()).collect())
    }

    pub fn select(&self, columns: &[String]) -> FaultResult<Frame> {
        let indices = columns
            .iter()
            .map(|c| self.index_of(c))
            .collect::<FaultResult<Vec<_>>>()?;
        Frame::new(
            columns.to_vec(),
            self.rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        )
    }

    /// Keep rows where `column <op> value`. Ordering comparisons against
    /// a null or an incomparable cell are false rather than errors.
    pub fn filter(&self, column: &str, op: &str, value: &Value) -> FaultResult<Frame> {
        let i = self.index_of(column)?;
        let test: Box<dyn Fn(&Value) -> bool + '_> = match op {
            "==" => Box::new(|cell: &Value| cell.equals(value)),
            "!=" => Box::new(|cell: &Value| !cell.equals(value)),
            "<" | "<=" | ">" | ">=" => {
                let op = op.to_string();
                Box::new(move |cell: &Value| match cell.compare(value) {
                    Ok(ord) => match op.as_str() {
                        "<" => ord.is_lt(),
                        "<=" => ord.is_le(),
                        ">" => ord.is_gt(),
                        _ => ord.is_ge(),
                    },
                    Err(_) => false,
                })
            }
            "in" => {
                let Value::List(options) = value else {
                    return Err(Fault::ty("where(column, \"in\", value) needs a list"));
                };
                let options = options.borrow().clone();
                Box::new(move |cell: &Value| options.iter().any(|o| o.equals(cell)))
            }
            "contains" => {
                let needle = value.expect_str("contains value")?.to_string();
                Box::new(move |cell: &Value| matches!(cell, Value::Str(s) if s.contains(&needle)))
            }
            other => {
                return Err(Fault::Type(format!(
                    "unknown comparison '{}' (use ==, !=, <, <=, >, >=, in, contains)",
                    other
                )))
            }
        };
        Ok(Frame {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| test(&row[i])).cloned().collect(),
        })
    }

    /// Stable sort on one or more columns.
    pub fn sort(&self, columns: &[String], descending: bool) -> FaultResult<Frame> {
        let indices = columns
            .iter()
            .map(|c| self.index_of(c))
            .collect::<FaultResult<Vec<_>>>()?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            let ord = indices
                .iter()
                .map(|&i| a[i].sort_cmp(&b[i]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(Frame {
            columns: self.columns.clone(),
            rows,
        })
    }

    pub fn head(&self, n: usize) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn aggregate(&self, column: &str, agg: Aggregate) -> FaultResult<Value> {
        let i = self.index_of(column)?;
        agg.apply(self.rows.iter().map(|row| &row[i]))
    }

    /// Distinct values of one column, in first-seen order.
    pub fn distinct_values(&self, column: &str) -> FaultResult<Vec<Value>> {
        let i = self.index_of(column)?;
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .rows
            .iter()
            .filter(|row| seen.insert(row[i].key()))
            .map(|row| row[i].clone())
            .collect())
    }

    /// The frame without duplicate rows.
    pub fn distinct_rows(&self) -> Frame {
        let mut seen = std::collections::HashSet::new();
        Frame {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| seen.insert(row_key(row)))
                .cloned()
                .collect(),
        }
    }

    /// Add or replace a column. A list must have one value per row; any
    /// other value fills every row.
    pub fn with_column(&self, name: &str, values: &Value) -> FaultResult<Frame> {
        let fill: Vec<Value> = match values {
            Value::List(items) => {
                let items = items.borrow();
                if items.len() != self.rows.len() {
                    return Err(Fault::Column(format!(
                        "with_column got {} values for {} rows",
                        items.len(),
                        self.rows.len()
                    )));
                }
                items.clone()
            }
            scalar => vec![scalar.clone(); self.rows.len()],
        };
        let mut columns = self.columns.clone();
        let mut rows = self.rows.clone();
        match self.columns.iter().position(|c| c == name) {
            Some(i) => {
                for (row, v) in rows.iter_mut().zip(fill) {
                    row[i] = v;
                }
            }
            None => {
                columns.push(name.to_string());
                for (row, v) in rows.iter_mut().zip(fill) {
                    row.push(v);
                }
            }
        }
        Ok(Frame { columns, rows })
    }

    pub fn rename(&self, from: &str, to: &str) -> FaultResult<Frame> {
        let i = self.index_of(from)?;
        if from != to && self.columns.iter().any(|c| c == to) {
            return Err(Fault::Column(format!("column '{}' already exists", to)));
        }
        let mut columns = self.columns.clone();
        columns[i] = to.to_string();
        Ok(Frame {
            columns,
            rows: self.rows.clone(),
        })
    }

    /// Join on a column both frames share. Right-hand columns that clash
    /// with left-hand ones get a `_right` suffix.
    pub fn join(&self, other: &Frame, on: &str, kind: JoinKind) -> FaultResult<Frame> {
        let li = self.index_of(on)?;
        let ri = other.index_of(on)?;
        let right_cols: Vec<usize> = (0..other.columns.len()).filter(|&i| i != ri).collect();

        let mut columns = self.columns.clone();
        for &i in &right_cols {
            let name = &other.columns[i];
            let mut unique = name.clone();
            while columns.contains(&unique) {
                unique = format!("{}_right", unique);
            }
            columns.push(unique);
        }

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (n, row) in other.rows.iter().enumerate() {
            if !row[ri].is_null() {
                index.entry(row[ri].key()).or_default().push(n);
            }
        }

        let mut rows = Vec::new();
        for left in &self.rows {
            let matches = if left[li].is_null() {
                None
            } else {
                index.get(&left[li].key())
            };
            match matches {
                Some(found) => {
                    for &n in found {
                        let mut row = left.clone();
                        row.extend(right_cols.iter().map(|&i| other.rows[n][i].clone()));
                        rows.push(row);
                    }
                }
                None if kind == JoinKind::Left => {
                    let mut row = left.clone();
                    row.extend(right_cols.iter().map(|_| Value::Null));
                    rows.push(row);
                }
                None => {}
            }
        }
        Ok(Frame { columns, rows })
    }

    /// Stack two frames. Columns are the union in first-seen order.
    pub fn concat(&self, other: &Frame) -> Frame {
        let mut columns = self.columns.clone();
        for c in &other.columns {
            if !columns.contains(c) {
                columns.push(c.clone());
            }
        }
        let project = |frame: &Frame| -> Vec<Vec<Value>> {
            let map: Vec<Option<usize>> = columns
                .iter()
                .map(|c| frame.columns.iter().position(|fc| fc == c))
                .collect();
            frame
                .rows
                .iter()
                .map(|row| {
                    map.iter()
                        .map(|i| i.map(|i| row[i].clone()).unwrap_or(Value::Null))
                        .collect()
                })
                .collect()
        };
        let mut rows = project(self);
        rows.extend(project(other));
        Frame { columns, rows }
    }

    pub fn group_by(&self, keys: &[String]) -> FaultResult<Grouped> {
        let indices = keys
            .iter()
            .map(|c| self.index_of(c))
            .collect::<FaultResult<Vec<_>>>()?;
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<Vec<Value>>)> = Vec::new();
        for row in &self.rows {
            let key_values: Vec<Value> = indices.iter().map(|&i| row[i].clone()).collect();
            let key = row_key(&key_values);
            let slot = *positions.entry(key).or_insert_with(|| {
                groups.push((key_values, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(row.clone());
        }
        Ok(Grouped {
            keys: keys.to_vec(),
            columns: self.columns.clone(),
            groups,
        })
    }
}

fn row_key(values: &[Value]) -> String {
    values.iter().map(Value::key).collect::<Vec<_>>().join("\u{1f}")
}

// ──────────────────────────────────────────────
// Grouped
// ──────────────────────────────────────────────

/// Rows partitioned by key columns, in first-seen key order.
#[derive(Debug, Clone)]
pub struct Grouped {
    keys: Vec<String>,
    columns: Vec<String>,
    groups: Vec<(Vec<Value>, Vec<Vec<Value>>)>,
}

impl Grouped {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One row per group: the key columns plus `count`.
    pub fn count(&self) -> Frame {
        let mut columns = self.keys.clone();
        columns.push("count".to_string());
        let rows = self
            .groups
            .iter()
            .map(|(key, rows)| {
                let mut out = key.clone();
                out.push(Value::Int(rows.len() as i64));
                out
            })
            .collect();
        Frame { columns, rows }
    }

    /// One row per group: the key columns plus `column` aggregated.
    pub fn aggregate(&self, column: &str, agg: Aggregate) -> FaultResult<Frame> {
        let i = self.columns.iter().position(|c| c == column).ok_or_else(|| {
            Fault::Column(format!(
                "no column '{}' (columns: {})",
                column,
                self.columns.join(", ")
            ))
        })?;
        let mut columns = self.keys.clone();
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        } else {
            columns.push(format!("{}_{}", column, agg.name()));
        }
        let mut rows = Vec::with_capacity(self.groups.len());
        for (key, members) in &self.groups {
            let mut out = key.clone();
            out.push(agg.apply(members.iter().map(|row| &row[i]))?);
            rows.push(out);
        }
        Ok(Frame { columns, rows })
    }
}
