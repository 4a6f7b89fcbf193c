use std::path::Path;
use std::process;

use sift_core::Verdict;
use sift_sandbox::Settings;

use super::read_script;
use crate::{exit, print_json, report_error, OutputFormat};

pub(crate) fn cmd_validate(file: &Path, settings: &Settings, output: OutputFormat, quiet: bool) {
    let policy = match settings.policy() {
        Ok(policy) => policy,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(exit::ERROR);
        }
    };
    let source = read_script(file, output, quiet);
    let verdict = sift_core::validate(&source, &policy);
    match output {
        OutputFormat::Json => print_json(&verdict, output, quiet),
        OutputFormat::Text => match &verdict {
            Verdict::Accepted => {
                if !quiet {
                    println!("accepted: {}", file.display());
                }
            }
            Verdict::Rejected(violation) => {
                report_error(&format!("rejected: {}", violation), output, quiet);
            }
        },
    }
    if let Verdict::Rejected(_) = verdict {
        process::exit(exit::REJECTED);
    }
}
