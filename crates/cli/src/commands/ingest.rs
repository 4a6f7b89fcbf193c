use sift_sandbox::Workbench;

use super::or_exit;
use crate::{print_json, OutputFormat};

pub(crate) fn cmd_ingest(mut bench: Workbench, output: OutputFormat, quiet: bool) {
    let summary = or_exit(bench.ingest(), output, quiet);
    match output {
        OutputFormat::Json => print_json(&summary, output, quiet),
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "{} file(s) processed, {} row(s) inserted, {} duplicate(s) skipped",
                    summary.files_processed, summary.rows_inserted, summary.rows_skipped
                );
            }
            // Per-file failures leave the file pending; they are not fatal.
            for failure in &summary.failures {
                eprintln!("failed: {}: {}", failure.file, failure.reason);
            }
        }
    }
}
