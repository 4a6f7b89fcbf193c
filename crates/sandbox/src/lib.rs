//! sift-sandbox: runs pasted scripts without trusting them.
//!
//! A script is first vetted by the static validator. If accepted it is
//! handed to a fresh worker process (the [`worker`] module, started as
//! `sift-worker` or `sift worker`) over a JSON [`channel`]. The worker has
//! an empty environment and a read-only store handle. The [`supervisor`]
//! kills it when the deadline passes.
//!
//! [`Workbench`] bundles this with ingestion and the report catalog behind
//! the operations a front end needs.

pub mod channel;
pub mod error;
pub mod prompt;
pub mod settings;
pub mod supervisor;
pub mod worker;
pub mod workbench;

pub use channel::{WorkerRequest, WorkerResponse};
pub use error::SandboxError;
pub use settings::Settings;
pub use supervisor::{RunOutcome, Supervisor, WorkerCommand};
pub use workbench::Workbench;
