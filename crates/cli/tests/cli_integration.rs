//! CLI integration tests for every subcommand.
//!
//! Uses `assert_cmd` to spawn the `sift` binary inside a scratch directory
//! and checks exit codes, stdout and stderr. Without a `sift.toml` the
//! defaults apply: drops in `data-in/`, store at `data/sift.db`.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper: create a Command for the `sift` binary, rooted at `dir`.
fn sift(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("sift");
    cmd.current_dir(dir).env("RUST_LOG", "sift=warn");
    cmd
}

/// Scratch workspace with `sales.csv` already ingested into `records`.
fn ingested() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("data-in")).expect("drop dir");
    fs::write(
        dir.path().join("data-in/sales.csv"),
        "Name,Amount\nAlice,10\nBob,20\nCarol,30\n",
    )
    .expect("write");
    sift(dir.path()).arg("ingest").assert().success();
    dir
}

fn script(dir: &Path, name: &str, text: &str) -> String {
    fs::write(dir.join(name), text).expect("write script");
    name.to_string()
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().expect("tempdir");
    sift(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run pasted report scripts safely"));
}

#[test]
fn worker_is_hidden_from_help() {
    let dir = TempDir::new().expect("tempdir");
    sift(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("worker").not());
}

// ──────────────────────────────────────────────
// 2. Ingest
// ──────────────────────────────────────────────

#[test]
fn ingest_reports_counts_and_archives() {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("data-in")).expect("drop dir");
    fs::write(dir.path().join("data-in/a.csv"), "Name,Amount\nAlice,10\nBob,20\n").expect("a");
    fs::write(dir.path().join("data-in/b.csv"), "Name,Amount\nBob,20\nCarol,30\n").expect("b");
    sift(dir.path())
        .args(["--output", "json", "ingest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rows_inserted\": 3"))
        .stdout(predicate::str::contains("\"rows_skipped\": 1"));
    assert!(dir.path().join("data-archive/a.csv").exists());
    assert!(!dir.path().join("data-in/a.csv").exists());
}

#[test]
fn ingest_of_empty_drop_is_ok() {
    let dir = TempDir::new().expect("tempdir");
    sift(dir.path())
        .arg("ingest")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 file(s) processed"));
}

// ──────────────────────────────────────────────
// 3. Validate
// ──────────────────────────────────────────────

#[test]
fn validate_accepts_a_reading_script() {
    let dir = TempDir::new().expect("tempdir");
    let file = script(dir.path(), "ok.sift", "import db;\nreturn db.tables();\n");
    sift(dir.path())
        .args(["validate", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("accepted"));
}

#[test]
fn validate_rejects_import_os_with_exit_2() {
    let dir = TempDir::new().expect("tempdir");
    let file = script(dir.path(), "bad.sift", "import os;\nreturn 1;\n");
    sift(dir.path())
        .args(["validate", &file])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("disallowed-import"));
}

#[test]
fn validate_json_verdict() {
    let dir = TempDir::new().expect("tempdir");
    let file = script(dir.path(), "bad.sift", "let f = open(\"x\");\nreturn f;\n");
    let out = sift(dir.path())
        .args(["--output", "json", "validate", &file])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let verdict: serde_json::Value = serde_json::from_slice(&out).expect("json");
    assert_eq!(verdict["verdict"], "rejected");
    assert_eq!(verdict["rule"], "io-call");
}

#[test]
fn validate_missing_file_exits_1() {
    let dir = TempDir::new().expect("tempdir");
    sift(dir.path())
        .args(["validate", "nope.sift"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error reading file"));
}

// ──────────────────────────────────────────────
// 4. Run
// ──────────────────────────────────────────────

#[test]
fn run_prints_an_aggregate() {
    let dir = ingested();
    let file = script(
        dir.path(),
        "total.sift",
        "import db;\nreturn db.table(\"records\").sum(\"amount\");\n",
    );
    sift(dir.path())
        .args(["run", &file])
        .assert()
        .success()
        .stdout(predicate::str::diff("60\n"));
}

#[test]
fn run_prints_a_table_and_console() {
    let dir = ingested();
    let file = script(
        dir.path(),
        "table.sift",
        "import db;\nlet t = db.table(\"records\").sort([\"amount\"], true).head(2);\nprint(\"rows\", t.count());\nreturn t.select([\"name\", \"amount\"]);\n",
    );
    sift(dir.path())
        .args(["run", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("rows 2\nname\tamount\nCarol\t30\nBob\t20\n"));
}

#[test]
fn run_rejected_script_exits_2() {
    let dir = ingested();
    let file = script(dir.path(), "bad.sift", "from os import path;\nreturn 1;\n");
    sift(dir.path())
        .args(["run", &file])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("rejected"));
}

#[test]
fn run_runtime_error_exits_3() {
    let dir = ingested();
    let file = script(
        dir.path(),
        "bad.sift",
        "import db;\nreturn db.table(\"records\").sum(\"price\");\n",
    );
    sift(dir.path())
        .args(["run", &file])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("runtime error"))
        .stderr(predicate::str::contains("price"));
}

#[test]
fn run_timeout_exits_4() {
    let dir = ingested();
    fs::write(dir.path().join("sift.toml"), "[execution]\ntimeout_secs = 1\n").expect("config");
    let file = script(dir.path(), "loop.sift", "while true {\n}\nreturn 1;\n");
    sift(dir.path())
        .args(["run", &file])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("timed out"));
}

#[test]
fn run_json_outcome() {
    let dir = ingested();
    let file = script(dir.path(), "one.sift", "return 1 + 2;\n");
    let out = sift(dir.path())
        .args(["--output", "json", "run", &file])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let outcome: serde_json::Value = serde_json::from_slice(&out).expect("json");
    assert_eq!(outcome["outcome"], "completed");
    assert_eq!(outcome["output"]["result"]["kind"], "scalar");
    assert_eq!(outcome["output"]["result"]["value"], 3);
}

#[test]
fn run_without_script_or_report_exits_1() {
    let dir = TempDir::new().expect("tempdir");
    sift(dir.path()).arg("run").assert().code(1);
}

// ──────────────────────────────────────────────
// 5. Reports and history
// ──────────────────────────────────────────────

#[test]
fn saved_report_runs_by_id_and_is_logged() {
    let dir = ingested();
    let file = script(
        dir.path(),
        "total.sift",
        "import db;\nreturn db.table(\"records\").sum(\"amount\");\n",
    );
    sift(dir.path())
        .args(["save-report", "--name", "Total", "--prompt", "total amount", "--script", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved report 'Total' version 1 (id 1)"));
    sift(dir.path())
        .args(["save-report", "--name", "Total", "--script", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("version 2"));

    sift(dir.path())
        .arg("reports")
        .assert()
        .success()
        .stdout(predicate::str::contains("2\tTotal\tv2"));
    sift(dir.path())
        .args(["reports", "--name", "Total"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1").and(predicate::str::contains("v2")));

    sift(dir.path())
        .args(["run", "--report", "1"])
        .assert()
        .success()
        .stdout(predicate::str::diff("60\n"));
    sift(dir.path())
        .args(["history", "--report", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("success"));
}

#[test]
fn rejected_script_is_not_saved() {
    let dir = TempDir::new().expect("tempdir");
    let file = script(dir.path(), "bad.sift", "import os;\nreturn 1;\n");
    sift(dir.path())
        .args(["save-report", "--name", "Bad", "--script", &file])
        .assert()
        .code(2);
    sift(dir.path())
        .arg("reports")
        .assert()
        .success()
        .stdout(predicate::str::contains("no saved reports"));
}

#[test]
fn unknown_report_exits_1() {
    let dir = TempDir::new().expect("tempdir");
    sift(dir.path())
        .args(["run", "--report", "42"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("report 42 not found"));
}

// ──────────────────────────────────────────────
// 6. Schema and prompt
// ──────────────────────────────────────────────

#[test]
fn schema_lists_tables_and_columns() {
    let dir = ingested();
    sift(dir.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("records (3 rows)"))
        .stdout(predicate::str::contains("amount\tINTEGER"));
    sift(dir.path())
        .args(["schema", "missing"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown table"));
}

#[test]
fn prompt_includes_schema_and_request() {
    let dir = ingested();
    sift(dir.path())
        .args(["prompt", "--request", "total by name"])
        .assert()
        .success()
        .stdout(predicate::str::contains("records(name TEXT, amount INTEGER)"))
        .stdout(predicate::str::contains("total by name"));
}

// ──────────────────────────────────────────────
// 7. Configuration
// ──────────────────────────────────────────────

#[test]
fn invalid_config_exits_1() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("sift.toml"), "[policy]\nallowed_imports = [\"os\"]\n").expect("config");
    sift(dir.path())
        .arg("ingest")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid settings"));
}

#[test]
fn narrowed_policy_rejects_frame_import() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("sift.toml"), "[policy]\nallowed_imports = [\"db\"]\n").expect("config");
    let file = script(dir.path(), "f.sift", "import frame;\nreturn 1;\n");
    sift(dir.path())
        .args(["validate", &file])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("frame"));
}
