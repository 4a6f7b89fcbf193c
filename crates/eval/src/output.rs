//! The serialisable result of a script run.

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::value::Value;

/// What a report returned: a table, or a single JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportResult {
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
        /// Rows the script produced before truncation.
        total_rows: usize,
        truncated: bool,
    },
    Scalar {
        value: serde_json::Value,
    },
}

impl ReportResult {
    /// Convert a returned value, keeping at most `max_rows` table rows.
    /// Frames and grouped frames become tables; everything else is a
    /// scalar.
    pub fn from_value(value: &Value, max_rows: usize) -> Self {
        let frame = match value {
            Value::Frame(frame) => frame.as_ref().clone(),
            Value::Grouped(grouped) => grouped.count(),
            other => {
                return ReportResult::Scalar {
                    value: other.to_json(),
                }
            }
        };
        let total_rows = frame.len();
        ReportResult::Table {
            columns: frame.columns().to_vec(),
            rows: frame
                .rows()
                .iter()
                .take(max_rows)
                .map(|row| row.iter().map(Value::to_json).collect())
                .collect(),
            total_rows,
            truncated: total_rows > max_rows,
        }
    }
}

/// A completed run: the result plus whatever the script printed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptOutput {
    pub result: ReportResult,
    #[serde(default)]
    pub console: Vec<String>,
}

/// A failed run: the error plus whatever the script printed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{error}")]
pub struct ScriptFailure {
    pub error: RuntimeError,
    #[serde(default)]
    pub console: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn tables_are_truncated() {
        let rows = (0..5).map(|n| vec![Value::Int(n)]).collect();
        let frame = Frame::new(vec!["n".into()], rows).expect("frame");
        let result = ReportResult::from_value(&Value::frame(frame), 2);
        assert_eq!(
            serde_json::to_value(&result).expect("json"),
            serde_json::json!({
                "kind": "table",
                "columns": ["n"],
                "rows": [[0], [1]],
                "total_rows": 5,
                "truncated": true,
            })
        );
    }

    #[test]
    fn scalars_pass_through() {
        let result = ReportResult::from_value(&Value::Int(35), 10);
        assert_eq!(
            result,
            ReportResult::Scalar {
                value: serde_json::json!(35)
            }
        );
    }
}
