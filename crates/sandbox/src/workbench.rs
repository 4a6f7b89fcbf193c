//! The operations offered to a front end: ingest, validate, run, and the
//! report catalog.
//!
//! The workbench owns the only read-write [`Store`]. Scripts never see it:
//! they run in a worker process that opens the store file read-only.

use std::time::Instant;

use sift_core::{Policy, Verdict};
use sift_storage::{
    timestamp, ExecutionOutcome, ExecutionRecord, IngestSummary, NewExecution, ReportDefinition,
    SchemaDescriptor, Store,
};

use crate::channel::WorkerRequest;
use crate::error::SandboxError;
use crate::prompt;
use crate::settings::Settings;
use crate::supervisor::{RunOutcome, Supervisor, WorkerCommand};

pub struct Workbench {
    settings: Settings,
    store: Store,
    policy: Policy,
    supervisor: Supervisor,
}

impl Workbench {
    pub fn open(settings: Settings, worker: WorkerCommand) -> Result<Self, SandboxError> {
        let policy = settings.policy()?;
        let store = Store::open(&settings.paths.store)?;
        let supervisor = Supervisor::new(worker, settings.timeout());
        tracing::debug!(store = %settings.paths.store.display(), "workbench opened");
        Ok(Workbench {
            settings,
            store,
            policy,
            supervisor,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn ingest(&mut self) -> Result<IngestSummary, SandboxError> {
        let config = self.settings.ingest_config();
        Ok(self.store.ingest(&config)?)
    }

    pub fn validate(&self, script: &str) -> Verdict {
        let verdict = sift_core::validate(script, &self.policy);
        if let Verdict::Rejected(violation) = &verdict {
            tracing::info!(rule = %violation.rule, line = violation.line, "script rejected");
        }
        verdict
    }

    /// Validate and, if accepted, execute `script` in a fresh worker.
    ///
    /// Exactly one execution record is appended whatever the outcome. An
    /// error is returned only when that record cannot be written.
    pub async fn run(
        &self,
        report_id: Option<i64>,
        script: &str,
    ) -> Result<RunOutcome, SandboxError> {
        let started_at = timestamp();
        let clock = Instant::now();

        let outcome = match self.validate(script) {
            Verdict::Rejected(violation) => RunOutcome::Rejected { violation },
            Verdict::Accepted => {
                let request = WorkerRequest {
                    script: script.to_string(),
                    store: self.settings.paths.store.clone(),
                    policy: self.policy.clone(),
                    max_result_rows: self.settings.execution.max_result_rows,
                };
                self.supervisor.dispatch(&request).await
            }
        };

        let entry = NewExecution {
            report_id,
            started_at,
            duration_ms: i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX),
            outcome: log_outcome(&outcome),
            detail: detail(&outcome),
        };
        let execution_id = self.store.record_execution(&entry)?;
        tracing::info!(
            execution_id,
            report_id,
            outcome = %entry.outcome,
            duration_ms = entry.duration_ms,
            "run finished"
        );
        Ok(outcome)
    }

    /// Run the script saved under `report_id`.
    pub async fn run_report(&self, report_id: i64) -> Result<RunOutcome, SandboxError> {
        let report = self.store.report(report_id)?;
        self.run(Some(report.id), &report.script_text).await
    }

    pub fn save_report(
        &mut self,
        name: &str,
        prompt: &str,
        script: &str,
    ) -> Result<ReportDefinition, SandboxError> {
        Ok(self.store.save_report(name, prompt, script)?)
    }

    pub fn report(&self, id: i64) -> Result<ReportDefinition, SandboxError> {
        Ok(self.store.report(id)?)
    }

    pub fn list_reports(&self) -> Result<Vec<ReportDefinition>, SandboxError> {
        Ok(self.store.list_reports()?)
    }

    pub fn report_versions(&self, name: &str) -> Result<Vec<ReportDefinition>, SandboxError> {
        Ok(self.store.report_versions(name)?)
    }

    /// One table's schema, or all of them.
    pub fn schema(&self, table: Option<&str>) -> Result<Vec<SchemaDescriptor>, SandboxError> {
        match table {
            Some(table) => Ok(vec![self.store.schema(table)?]),
            None => Ok(self.store.schemas()?),
        }
    }

    pub fn history(
        &self,
        report_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, SandboxError> {
        Ok(self.store.history(report_id, limit)?)
    }

    /// Generator instructions for `request`, optionally limited to one table.
    pub fn prompt(&self, request: &str, table: Option<&str>) -> Result<String, SandboxError> {
        Ok(prompt::build(request, &self.schema(table)?))
    }
}

fn log_outcome(outcome: &RunOutcome) -> ExecutionOutcome {
    match outcome {
        RunOutcome::Completed { .. } => ExecutionOutcome::Success,
        RunOutcome::Rejected { .. } => ExecutionOutcome::ValidationRejected,
        RunOutcome::Failed { .. } => ExecutionOutcome::RuntimeError,
        RunOutcome::TimedOut { .. } => ExecutionOutcome::Timeout,
    }
}

fn detail(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { output } => {
            serde_json::to_string(&output.result).unwrap_or_else(|e| e.to_string())
        }
        RunOutcome::Rejected { violation } => violation.to_string(),
        RunOutcome::Failed { message, .. } => message.clone(),
        RunOutcome::TimedOut { after_ms, .. } => format!("terminated after {} ms", after_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::Rule;

    fn workbench(dir: &std::path::Path) -> Workbench {
        let settings = Settings::default().resolved(dir);
        Workbench::open(settings, WorkerCommand::new("/nonexistent/sift-worker")).expect("open")
    }

    #[tokio::test]
    async fn rejection_is_logged_without_spawning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bench = workbench(dir.path());
        let outcome = bench.run(None, "import os;\nreturn 1;").await.expect("run");
        let RunOutcome::Rejected { violation } = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert_eq!(violation.rule, Rule::DisallowedImport);

        let log = bench.history(None, 10).expect("history");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, ExecutionOutcome::ValidationRejected);
        assert!(log[0].detail.contains("disallowed-import"), "{}", log[0].detail);
    }

    #[tokio::test]
    async fn spawn_failure_is_a_logged_runtime_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut bench = workbench(dir.path());
        let report = bench.save_report("one", "", "return 1;").expect("save");
        let outcome = bench.run_report(report.id).await.expect("run");
        assert!(matches!(outcome, RunOutcome::Failed { .. }), "{outcome:?}");

        let log = bench.history(Some(report.id), 10).expect("history");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, ExecutionOutcome::RuntimeError);
    }

    #[tokio::test]
    async fn unknown_report_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bench = workbench(dir.path());
        assert!(matches!(
            bench.run_report(99).await,
            Err(SandboxError::Store(sift_storage::StoreError::ReportNotFound(99)))
        ));
    }

    #[test]
    fn schema_of_unknown_table_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bench = workbench(dir.path());
        assert!(bench.schema(None).expect("schemas").is_empty());
        assert!(bench.schema(Some("sales")).is_err());
        assert!(bench.prompt("x", None).expect("prompt").contains("(none yet"));
    }
}
