//! The worker side of the channel. Runs inside the isolated process.

use std::io::{Read, Write};

use sift_core::Verdict;
use sift_storage::QueryHandle;

use crate::channel::{WorkerRequest, WorkerResponse};

/// Handle one request. Never panics on bad input; every failure becomes a
/// [`WorkerResponse::Failed`].
pub fn handle(request: &WorkerRequest) -> WorkerResponse {
    if let Verdict::Rejected(violation) = sift_core::validate(&request.script, &request.policy) {
        return WorkerResponse::Rejected { violation };
    }
    let script = match sift_core::parse(&request.script) {
        Ok(script) => script,
        Err(e) => return WorkerResponse::failed(e.to_string()),
    };
    let handle = match QueryHandle::open(&request.store) {
        Ok(handle) => handle,
        Err(e) => return WorkerResponse::failed(format!("could not open store: {}", e)),
    };
    match sift_eval::execute(&script, &handle, request.max_result_rows) {
        Ok(output) => WorkerResponse::Completed { output },
        Err(failure) => WorkerResponse::Failed {
            message: failure.error.to_string(),
            error: Some(failure.error),
            console: failure.console,
        },
    }
}

/// Read one request from `input`, write one response to `output`.
pub fn serve<R: Read, W: Write>(mut input: R, mut output: W) -> std::io::Result<()> {
    let mut raw = String::new();
    input.read_to_string(&mut raw)?;
    let response = match serde_json::from_str::<WorkerRequest>(&raw) {
        Ok(request) => handle(&request),
        Err(e) => WorkerResponse::failed(format!("malformed worker request: {}", e)),
    };
    serde_json::to_writer(&mut output, &response)?;
    output.flush()
}

/// Entry point shared by the `sift-worker` binary and `sift worker`.
pub fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .init();
    match serve(std::io::stdin().lock(), std::io::stdout().lock()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "worker i/o failed");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::{Policy, Rule};

    fn request(script: &str, store: &std::path::Path) -> WorkerRequest {
        WorkerRequest {
            script: script.to_string(),
            store: store.to_path_buf(),
            policy: Policy::default(),
            max_result_rows: 10,
        }
    }

    #[test]
    fn rejects_before_touching_the_store() {
        let missing = std::path::Path::new("/nonexistent/sift.db");
        let response = handle(&request("import os;\nreturn 1;", missing));
        let WorkerResponse::Rejected { violation } = response else {
            panic!("expected rejection, got {response:?}");
        };
        assert_eq!(violation.rule, Rule::DisallowedImport);
    }

    #[test]
    fn missing_store_fails() {
        let missing = std::path::Path::new("/nonexistent/sift.db");
        let response = handle(&request("return 1;", missing));
        assert!(matches!(response, WorkerResponse::Failed { error: None, .. }));
    }

    #[test]
    fn serve_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("sift.db");
        sift_storage::Store::open(&store).expect("store");
        let input = serde_json::to_vec(&request("return 1 + 2;", &store)).expect("json");
        let mut out = Vec::new();
        serve(input.as_slice(), &mut out).expect("serve");
        let response: WorkerResponse = serde_json::from_slice(&out).expect("response");
        let WorkerResponse::Completed { output } = response else {
            panic!("expected completion, got {response:?}");
        };
        assert_eq!(
            output.result,
            sift_eval::ReportResult::Scalar {
                value: serde_json::json!(3)
            }
        );
    }

    #[test]
    fn garbage_input_is_a_failure_response() {
        let mut out = Vec::new();
        serve(&b"not json"[..], &mut out).expect("serve");
        let response: WorkerResponse = serde_json::from_slice(&out).expect("response");
        assert!(matches!(response, WorkerResponse::Failed { .. }));
    }
}
