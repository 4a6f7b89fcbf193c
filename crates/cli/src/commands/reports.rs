use std::path::Path;
use std::process;

use sift_core::Verdict;
use sift_sandbox::Workbench;

use super::{or_exit, read_script};
use crate::{exit, print_json, report_error, OutputFormat};

pub(crate) fn cmd_reports(bench: &Workbench, name: Option<&str>, output: OutputFormat, quiet: bool) {
    let reports = match name {
        Some(name) => or_exit(bench.report_versions(name), output, quiet),
        None => or_exit(bench.list_reports(), output, quiet),
    };
    match output {
        OutputFormat::Json => print_json(&reports, output, quiet),
        OutputFormat::Text => {
            if reports.is_empty() && !quiet {
                println!("no saved reports");
            }
            for r in &reports {
                println!("{}\t{}\tv{}\t{}", r.id, r.name, r.version, r.created_at);
            }
        }
    }
}

/// Scripts are vetted before they are saved; a rejected script is not
/// stored.
pub(crate) fn cmd_save_report(
    mut bench: Workbench,
    name: &str,
    prompt: &str,
    script_path: &Path,
    output: OutputFormat,
    quiet: bool,
) {
    if name.trim().is_empty() {
        report_error("error: report name must not be empty", output, quiet);
        process::exit(exit::ERROR);
    }
    let script = read_script(script_path, output, quiet);
    if let Verdict::Rejected(violation) = bench.validate(&script) {
        report_error(&format!("rejected: {}", violation), output, quiet);
        process::exit(exit::REJECTED);
    }
    let report = or_exit(bench.save_report(name.trim(), prompt, &script), output, quiet);
    match output {
        OutputFormat::Json => print_json(&report, output, quiet),
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "saved report '{}' version {} (id {})",
                    report.name, report.version, report.id
                );
            }
        }
    }
}
