use std::path::PathBuf;

use sift_core::PolicyError;
use sift_storage::StoreError;

/// Failures of the workbench itself, as opposed to outcomes of a script.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("could not read settings '{path}': {source}")]
    SettingsIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings '{path}': {reason}")]
    Settings { path: PathBuf, reason: String },
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not start worker '{program}': {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
}
