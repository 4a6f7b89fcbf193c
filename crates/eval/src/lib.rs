//! sift-eval: the capability-restricted interpreter for report scripts.
//!
//! A parsed [`sift_core::Script`] runs against a [`DataSource`] (in
//! production the read-only `sift_storage::QueryHandle`). The script sees
//! exactly the host capability table: the `db` and `frame` modules, the
//! builtin functions and the value methods. Nothing else is reachable.
//!
//! This crate does no isolation of its own; `sift-sandbox` runs it in a
//! separate worker process under a deadline.

pub mod builtins;
pub mod capability;
pub mod error;
pub mod frame;
pub mod interpreter;
pub mod methods;
pub mod numeric;
pub mod output;
pub mod value;

pub use capability::DataSource;
pub use error::{Fault, RuntimeError};
pub use frame::Frame;
pub use interpreter::Interpreter;
pub use output::{ReportResult, ScriptFailure, ScriptOutput};
pub use value::Value;

use sift_core::Script;

/// Run `script` and shape its return value for the caller.
///
/// Tables are cut to `max_rows`. On failure the console lines printed
/// before the error are returned alongside it.
pub fn execute(
    script: &Script,
    source: &dyn DataSource,
    max_rows: usize,
) -> Result<ScriptOutput, ScriptFailure> {
    let mut interpreter = Interpreter::new(source);
    match interpreter.run(script) {
        Ok(value) => {
            let result = ReportResult::from_value(&value, max_rows);
            tracing::debug!(
                kind = match &result {
                    ReportResult::Table { .. } => "table",
                    ReportResult::Scalar { .. } => "scalar",
                },
                "script finished"
            );
            Ok(ScriptOutput {
                result,
                console: interpreter.console(),
            })
        }
        Err(e) => {
            tracing::debug!(error = %e, "script failed");
            Err(ScriptFailure {
                error: e,
                console: interpreter.console(),
            })
        }
    }
}
