use serde::{Deserialize, Serialize};
use sift_storage::StoreError;

/// What went wrong while a script ran, without the location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Fault {
    #[error("type error: {0}")]
    Type(String),
    #[error("name error: {0}")]
    Name(String),
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("column error: {0}")]
    Column(String),
    #[error("query failed: {0}")]
    Store(String),
    /// The store refused a mutation. Reported like any other runtime error.
    #[error("write refused by the read-only store: {0}")]
    WriteViolation(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("limit exceeded: {0}")]
    Limit(String),
    #[error("script ended without a return statement")]
    NoReturn,
}

impl Fault {
    pub fn at(self, line: u32) -> RuntimeError {
        RuntimeError { line, fault: self }
    }

    pub(crate) fn ty(message: impl Into<String>) -> Self {
        Fault::Type(message.into())
    }
}

impl From<StoreError> for Fault {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::WriteViolation(msg) => Fault::WriteViolation(msg),
            StoreError::UnknownTable(table) => Fault::Name(format!("no table named '{}'", table)),
            other => Fault::Store(other.to_string()),
        }
    }
}

/// A script failed while running. Carries the line of the statement or
/// expression that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("line {line}: {fault}")]
pub struct RuntimeError {
    pub line: u32,
    pub fault: Fault,
}

/// Shorthand for results inside the interpreter before a line is attached.
pub type FaultResult<T> = Result<T, Fault>;
