use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a dropped file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Ingested,
    Archived,
    Failed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Ingested => "ingested",
            FileStatus::Archived => "archived",
            FileStatus::Failed => "failed",
        }
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "ingested" => Ok(FileStatus::Ingested),
            "archived" => Ok(FileStatus::Archived),
            "failed" => Ok(FileStatus::Failed),
            other => Err(format!("unknown file status '{}'", other)),
        }
    }
}

/// A row of `data_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFile {
    pub id: i64,
    /// Path relative to the drop location, `/`-separated.
    pub path: String,
    pub table: String,
    pub content_hash: String,
    /// RFC 3339 timestamp string.
    pub detected_at: String,
    /// RFC 3339 timestamp string. None until the rows are committed.
    pub ingested_at: Option<String>,
    pub row_count: Option<i64>,
    pub status: FileStatus,
    pub archived_to: Option<String>,
    /// Failure reason for `failed` files.
    pub detail: Option<String>,
}

/// One file that could not be ingested during a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub file: String,
    pub reason: String,
}

/// Result of one ingestion pass over the drop location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub files_processed: usize,
    pub rows_inserted: usize,
    pub rows_skipped: usize,
    pub failures: Vec<IngestFailure>,
}

/// A saved report. Rows are never updated: saving under an existing name
/// adds the next version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub id: i64,
    pub name: String,
    pub version: i64,
    pub prompt: String,
    pub script_text: String,
    /// RFC 3339 timestamp string.
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionOutcome {
    Success,
    ValidationRejected,
    RuntimeError,
    Timeout,
}

impl ExecutionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionOutcome::Success => "success",
            ExecutionOutcome::ValidationRejected => "validation-rejected",
            ExecutionOutcome::RuntimeError => "runtime-error",
            ExecutionOutcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionOutcome::Success),
            "validation-rejected" => Ok(ExecutionOutcome::ValidationRejected),
            "runtime-error" => Ok(ExecutionOutcome::RuntimeError),
            "timeout" => Ok(ExecutionOutcome::Timeout),
            other => Err(format!("unknown execution outcome '{}'", other)),
        }
    }
}

/// An entry of the append-only execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub report_id: Option<i64>,
    /// RFC 3339 timestamp string.
    pub started_at: String,
    pub duration_ms: i64,
    pub outcome: ExecutionOutcome,
    /// Result JSON on success, otherwise the error message.
    pub detail: String,
}

/// An execution record not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExecution {
    pub report_id: Option<i64>,
    pub started_at: String,
    pub duration_ms: i64,
    pub outcome: ExecutionOutcome,
    pub detail: String,
}
