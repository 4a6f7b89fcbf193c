use std::path::Path;
use std::process;

use sift_eval::ReportResult;
use sift_sandbox::{RunOutcome, Workbench};

use super::{or_exit, read_script};
use crate::{exit, print_json, report_error, OutputFormat};

pub(crate) fn cmd_run(
    bench: &Workbench,
    file: Option<&Path>,
    report: Option<i64>,
    output: OutputFormat,
    quiet: bool,
) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("error: could not start runtime: {}", e), output, quiet);
            process::exit(exit::ERROR);
        }
    };
    let outcome = match (file, report) {
        (Some(file), report) => {
            let script = read_script(file, output, quiet);
            or_exit(rt.block_on(bench.run(report, &script)), output, quiet)
        }
        (None, Some(id)) => or_exit(rt.block_on(bench.run_report(id)), output, quiet),
        (None, None) => {
            report_error("error: give a script file or --report ID", output, quiet);
            process::exit(exit::ERROR);
        }
    };

    if output == OutputFormat::Json {
        print_json(&outcome, output, quiet);
    }
    match outcome {
        RunOutcome::Completed { output: result } => {
            if output == OutputFormat::Text {
                for line in &result.console {
                    println!("{}", line);
                }
                print_result(&result.result);
            }
        }
        RunOutcome::Rejected { violation } => {
            if output == OutputFormat::Text {
                report_error(&format!("rejected: {}", violation), output, quiet);
            }
            process::exit(exit::REJECTED);
        }
        RunOutcome::Failed { message, console } => {
            if output == OutputFormat::Text {
                for line in &console {
                    println!("{}", line);
                }
                report_error(&format!("runtime error: {}", message), output, quiet);
            }
            process::exit(exit::RUNTIME_ERROR);
        }
        RunOutcome::TimedOut { after_ms, .. } => {
            if output == OutputFormat::Text {
                let msg = format!("timed out: worker killed after {} ms", after_ms);
                report_error(&msg, output, quiet);
            }
            process::exit(exit::TIMEOUT);
        }
    }
}

fn print_result(result: &ReportResult) {
    match result {
        ReportResult::Scalar { value } => println!("{}", cell(value)),
        ReportResult::Table {
            columns,
            rows,
            total_rows,
            truncated,
        } => {
            println!("{}", columns.join("\t"));
            for row in rows {
                println!("{}", row.iter().map(cell).collect::<Vec<_>>().join("\t"));
            }
            if *truncated {
                println!("({} of {} rows shown)", rows.len(), total_rows);
            }
        }
    }
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
