use std::path::PathBuf;

/// All errors returned by the sift store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A statement tried to modify the store through a read-only handle.
    /// Callers treat this exactly like any other script runtime error.
    #[error("write refused by read-only store: {0}")]
    WriteViolation(String),

    /// A script query named a store-internal table directly.
    #[error("access refused: {0}")]
    Restricted(String),

    /// The source file could not be parsed into rows.
    #[error("malformed input {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// A table name that was never created by ingestion.
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    /// A report id with no stored report.
    #[error("report {0} not found")]
    ReportNotFound(i64),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other SQLite failure (connection, constraint, syntax, ...).
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Map SQLite's own read-only refusals onto [`StoreError::WriteViolation`]
    /// and authorizer denials onto [`StoreError::Restricted`].
    pub(crate) fn from_readonly(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ReadOnly =>
            {
                StoreError::WriteViolation(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::AuthorizationForStatementDenied =>
            {
                StoreError::Restricted(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => StoreError::Sql(err),
        }
    }
}
