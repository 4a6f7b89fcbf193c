use sift_sandbox::Workbench;

use super::or_exit;
use crate::{print_json, OutputFormat};

pub(crate) fn cmd_schema(bench: &Workbench, table: Option<&str>, output: OutputFormat, quiet: bool) {
    let schemas = or_exit(bench.schema(table), output, quiet);
    match output {
        OutputFormat::Json => print_json(&schemas, output, quiet),
        OutputFormat::Text => {
            if schemas.is_empty() && !quiet {
                println!("no tables yet; run `sift ingest`");
            }
            for schema in &schemas {
                let rows = or_exit(
                    bench.store().row_count(&schema.table).map_err(Into::into),
                    output,
                    quiet,
                );
                println!("{} ({} rows)", schema.table, rows);
                for column in &schema.columns {
                    println!("  {}\t{}", column.name, column.ty);
                }
            }
        }
    }
}

pub(crate) fn cmd_history(
    bench: &Workbench,
    report: Option<i64>,
    limit: usize,
    output: OutputFormat,
    quiet: bool,
) {
    let records = or_exit(bench.history(report, limit), output, quiet);
    match output {
        OutputFormat::Json => print_json(&records, output, quiet),
        OutputFormat::Text => {
            for r in &records {
                let report = r.report_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{}\t{}\treport {}\t{}\t{} ms\t{}",
                    r.id, r.started_at, report, r.outcome, r.duration_ms, r.detail
                );
            }
        }
    }
}

pub(crate) fn cmd_prompt(
    bench: &Workbench,
    request: &str,
    table: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) {
    let text = or_exit(bench.prompt(request, table), output, quiet);
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({ "prompt": text }), output, quiet),
        OutputFormat::Text => print!("{}", text),
    }
}
