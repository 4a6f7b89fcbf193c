//! Wire types exchanged with the worker process: one JSON request on its
//! stdin, one JSON response on its stdout.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sift_core::{Policy, Violation};
use sift_eval::{RuntimeError, ScriptOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub script: String,
    /// Store file the worker opens read-only.
    pub store: PathBuf,
    /// The worker re-validates with this policy before running anything.
    pub policy: Policy,
    pub max_result_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResponse {
    Completed {
        output: ScriptOutput,
    },
    Rejected {
        violation: Violation,
    },
    Failed {
        message: String,
        /// Set when the script itself raised the error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RuntimeError>,
        #[serde(default)]
        console: Vec<String>,
    },
}

impl WorkerResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        WorkerResponse::Failed {
            message: message.into(),
            error: None,
            console: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_response_shape() {
        let json = serde_json::to_value(WorkerResponse::failed("boom")).expect("json");
        assert_eq!(
            json,
            serde_json::json!({"status": "failed", "message": "boom", "console": []})
        );
        let back: WorkerResponse = serde_json::from_value(json).expect("parse");
        assert_eq!(back, WorkerResponse::failed("boom"));
    }
}
