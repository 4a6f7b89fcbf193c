//! Report catalog and execution log.
//!
//! Both tables are append-only in the database itself (see the triggers in
//! the bootstrap schema); these methods only ever INSERT and SELECT.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::StoreError;
use crate::record::{ExecutionOutcome, ExecutionRecord, NewExecution, ReportDefinition};
use crate::store::{timestamp, Store};

const REPORT_COLUMNS: &str = "id, name, version, prompt, script_text, created_at";

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportDefinition> {
    Ok(ReportDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        prompt: row.get(3)?,
        script_text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Store {
    /// Save a report. An existing name gets the next version; earlier
    /// versions stay readable and unchanged.
    pub fn save_report(
        &mut self,
        name: &str,
        prompt: &str,
        script_text: &str,
    ) -> Result<ReportDefinition, StoreError> {
        let tx = self.connection_mut().transaction()?;
        let version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM reports WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        let created_at = timestamp();
        tx.execute(
            "INSERT INTO reports (name, version, prompt, script_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, version, prompt, script_text, created_at],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        tracing::info!(report_id = id, name, version, "report saved");
        Ok(ReportDefinition {
            id,
            name: name.to_string(),
            version,
            prompt: prompt.to_string(),
            script_text: script_text.to_string(),
            created_at,
        })
    }

    pub fn report(&self, id: i64) -> Result<ReportDefinition, StoreError> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM reports WHERE id = ?1", REPORT_COLUMNS),
                params![id],
                report_from_row,
            )
            .optional()?
            .ok_or(StoreError::ReportNotFound(id))
    }

    /// The latest version of every report, ordered by name.
    pub fn list_reports(&self) -> Result<Vec<ReportDefinition>, StoreError> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM reports r
             WHERE version = (SELECT MAX(version) FROM reports WHERE name = r.name)
             ORDER BY name",
            REPORT_COLUMNS
        ))?;
        let reports = stmt
            .query_map([], report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    /// All versions of `name`, oldest first.
    pub fn report_versions(&self, name: &str) -> Result<Vec<ReportDefinition>, StoreError> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM reports WHERE name = ?1 ORDER BY version",
            REPORT_COLUMNS
        ))?;
        let reports = stmt
            .query_map(params![name], report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    /// Append one execution record and return its id.
    pub fn record_execution(&self, entry: &NewExecution) -> Result<i64, StoreError> {
        self.connection().execute(
            "INSERT INTO execution_log (report_id, started_at, duration_ms, outcome, detail)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.report_id,
                entry.started_at,
                entry.duration_ms,
                entry.outcome.as_str(),
                entry.detail
            ],
        )?;
        let id = self.connection().last_insert_rowid();
        tracing::debug!(execution_id = id, outcome = %entry.outcome, "execution recorded");
        Ok(id)
    }

    /// Most recent executions first, optionally for one report.
    pub fn history(
        &self,
        report_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let mut stmt = self.connection().prepare(
            "SELECT id, report_id, started_at, duration_ms, outcome, detail
             FROM execution_log
             WHERE ?1 IS NULL OR report_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![report_id, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, report_id, started_at, duration_ms, outcome, detail) = row?;
            let outcome = outcome.parse::<ExecutionOutcome>().map_err(|e| {
                StoreError::Sql(rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    e.into(),
                ))
            })?;
            out.push(ExecutionRecord {
                id,
                report_id,
                started_at,
                duration_ms,
                outcome,
                detail,
            });
        }
        Ok(out)
    }
}
