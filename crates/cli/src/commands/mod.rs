pub(crate) mod ingest;
pub(crate) mod inspect;
pub(crate) mod reports;
pub(crate) mod run;
pub(crate) mod validate;

use std::path::Path;
use std::process;

use crate::{exit, report_error, OutputFormat};

/// Read a script file or exit.
pub(crate) fn read_script(path: &Path, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(exit::ERROR);
        }
    }
}

/// Unwrap a workbench result or report it and exit.
pub(crate) fn or_exit<T>(
    result: Result<T, sift_sandbox::SandboxError>,
    output: OutputFormat,
    quiet: bool,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(exit::ERROR);
        }
    }
}
