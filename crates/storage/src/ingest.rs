//! Ingestion pipeline: drop location to store to archive.
//!
//! Each file is ingested in its own transaction (schema evolution, row
//! inserts and the status change commit together), so a concurrent reader
//! sees all of a file's rows or none of them. A bad file is recorded as
//! failed and left in place; it never aborts the pass.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, OptionalExtension, ToSql};
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::hasher;
use crate::normalize;
use crate::record::{FileStatus, IngestFailure, IngestSummary};
use crate::schema::{self, quote};
use crate::source;
use crate::store::{timestamp, Store};

/// Where files are picked up and where they go afterwards.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub drop_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Table for files placed directly in `drop_dir`.
    pub default_table: String,
}

/// A supported file found in the drop location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    /// Path relative to the drop location, `/`-separated.
    pub relative: String,
    pub table: String,
}

/// What happened to one file.
enum FileOutcome {
    Ingested { inserted: usize, skipped: usize },
    /// Already in the store; the file only needed archiving.
    Rearchived { skipped: usize },
}

/// List the files a refresh would consider, in a stable order. Files in
/// the drop root go to `default_table`; files in a first-level directory
/// go to the table named after it. Hidden entries and deeper levels are
/// ignored.
pub fn discover(config: &IngestConfig) -> Result<Vec<Candidate>, StoreError> {
    let default_table = normalize::table_name(&config.default_table)
        .unwrap_or_else(|| "records".to_string());
    let mut out = Vec::new();
    for entry in sorted_entries(&config.drop_dir)? {
        let name = file_name(&entry);
        if is_hidden(&name) {
            continue;
        }
        if entry.is_dir() {
            let Some(table) = normalize::table_name(&name) else {
                tracing::warn!(dir = %entry.display(), "no usable table name; skipped");
                continue;
            };
            for inner in sorted_entries(&entry)? {
                let inner_name = file_name(&inner);
                if inner.is_file() && !is_hidden(&inner_name) && source::is_supported(&inner) {
                    out.push(Candidate {
                        relative: format!("{}/{}", name, inner_name),
                        path: inner,
                        table: table.clone(),
                    });
                }
            }
        } else if entry.is_file() && source::is_supported(&entry) {
            out.push(Candidate {
                relative: name,
                path: entry,
                table: default_table.clone(),
            });
        }
    }
    Ok(out)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| StoreError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::io(dir, e))?;
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(name: &str) -> bool {
    // `~$` marks office lock files.
    name.starts_with('.') || name.starts_with("~$")
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl Store {
    /// Ingest every new file in the drop location and archive it.
    pub fn ingest(&mut self, config: &IngestConfig) -> Result<IngestSummary, StoreError> {
        fs::create_dir_all(&config.drop_dir).map_err(|e| StoreError::io(&config.drop_dir, e))?;
        let mut summary = IngestSummary::default();
        for candidate in discover(config)? {
            match self.ingest_file(config, &candidate) {
                Ok(FileOutcome::Ingested { inserted, skipped }) => {
                    summary.files_processed += 1;
                    summary.rows_inserted += inserted;
                    summary.rows_skipped += skipped;
                }
                Ok(FileOutcome::Rearchived { skipped }) => {
                    summary.files_processed += 1;
                    summary.rows_skipped += skipped;
                }
                Err(e) => {
                    tracing::warn!(file = %candidate.relative, error = %e, "ingestion failed");
                    summary.failures.push(IngestFailure {
                        file: candidate.relative.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            files = summary.files_processed,
            inserted = summary.rows_inserted,
            skipped = summary.rows_skipped,
            failed = summary.failures.len(),
            "ingestion finished"
        );
        Ok(summary)
    }

    fn ingest_file(
        &mut self,
        config: &IngestConfig,
        candidate: &Candidate,
    ) -> Result<FileOutcome, StoreError> {
        let bytes = fs::read(&candidate.path).map_err(|e| StoreError::io(&candidate.path, e))?;
        let hash = content_hash(&bytes);

        let existing: Option<(i64, String, Option<i64>)> = self
            .connection()
            .query_row(
                "SELECT id, status, row_count FROM data_files WHERE path = ?1 AND content_hash = ?2",
                params![candidate.relative, hash],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let file_id = match existing {
            Some((id, status, row_count)) => {
                let status = status.parse::<FileStatus>().unwrap_or(FileStatus::Pending);
                if matches!(status, FileStatus::Ingested | FileStatus::Archived) {
                    tracing::info!(file = %candidate.relative, "already ingested; archiving only");
                    self.archive(config, candidate, id)?;
                    return Ok(FileOutcome::Rearchived {
                        skipped: row_count.unwrap_or(0).max(0) as usize,
                    });
                }
                id
            }
            None => {
                self.connection().execute(
                    "INSERT INTO data_files (path, table_name, content_hash, detected_at, status)
                     VALUES (?1, ?2, ?3, ?4, 'pending')",
                    params![candidate.relative, candidate.table, hash, timestamp()],
                )?;
                self.connection().last_insert_rowid()
            }
        };

        let (inserted, skipped) = match self.load_rows(candidate, file_id, &bytes) {
            Ok(counts) => counts,
            Err(e) => {
                self.connection().execute(
                    "UPDATE data_files SET status = 'failed', detail = ?2 WHERE id = ?1",
                    params![file_id, e.to_string()],
                )?;
                return Err(e);
            }
        };
        tracing::info!(
            file = %candidate.relative,
            table = %candidate.table,
            inserted,
            skipped,
            "file ingested"
        );
        self.archive(config, candidate, file_id)?;
        Ok(FileOutcome::Ingested { inserted, skipped })
    }

    /// Parse, evolve and insert in one transaction. Returns (inserted,
    /// skipped as duplicate).
    fn load_rows(
        &mut self,
        candidate: &Candidate,
        file_id: i64,
        bytes: &[u8],
    ) -> Result<(usize, usize), StoreError> {
        let table = source::read(&candidate.path, bytes)?;
        let now = timestamp();
        let tx = self.connection_mut().transaction()?;
        let descriptor = schema::evolve(&tx, &candidate.table, &table.columns, &now)?;

        let column_list = table
            .columns
            .iter()
            .map(|(name, _)| format!(", {}", quote(name)))
            .collect::<String>();
        let placeholders = ", ?".repeat(table.columns.len());
        let mut inserted = 0;
        let mut skipped = 0;
        let row_count = table.rows.len();
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO data_records (table_name, file_id, row_hash{})
                 VALUES (?, ?, ?{})",
                column_list, placeholders
            ))?;
            for row in table.rows {
                let cells = schema::coerce_row(&descriptor, &table.columns, row);
                let hash = hasher::fingerprint(cells.iter().map(|(n, c)| (n.as_str(), c)));
                let mut values: Vec<&dyn ToSql> = vec![&candidate.table, &file_id, &hash];
                values.extend(cells.iter().map(|(_, c)| c as &dyn ToSql));
                if stmt.execute(values.as_slice())? == 1 {
                    inserted += 1;
                } else {
                    skipped += 1;
                }
            }
        }
        tx.execute(
            "UPDATE data_files
             SET status = 'ingested', ingested_at = ?2, row_count = ?3, detail = NULL
             WHERE id = ?1",
            params![file_id, now, row_count as i64],
        )?;
        tx.commit()?;
        Ok((inserted, skipped))
    }

    /// Move the file into the archive mirror and mark it archived. A failed
    /// move leaves the file `ingested`, so the next pass only retries this.
    fn archive(
        &self,
        config: &IngestConfig,
        candidate: &Candidate,
        file_id: i64,
    ) -> Result<(), StoreError> {
        let target = archive_target(&config.archive_dir, &candidate.relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        move_file(&candidate.path, &target)?;
        self.connection().execute(
            "UPDATE data_files SET status = 'archived', archived_to = ?2 WHERE id = ?1",
            params![file_id, target.to_string_lossy()],
        )?;
        tracing::debug!(file = %candidate.relative, to = %target.display(), "file archived");
        Ok(())
    }
}

/// `archive_dir/relative`, with `_1`, `_2`, ... before the extension if
/// that name is taken.
pub fn archive_target(archive_dir: &Path, relative: &str) -> PathBuf {
    let wanted = archive_dir.join(relative);
    if !wanted.exists() {
        return wanted;
    }
    let stem = wanted
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = wanted
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = wanted.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut n = 1;
    loop {
        let candidate = parent.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn move_file(from: &Path, to: &Path) -> Result<(), StoreError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Different filesystems: copy, then remove the original.
    fs::copy(from, to).map_err(|e| StoreError::io(to, e))?;
    fs::remove_file(from).map_err(|e| StoreError::io(from, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &Path) -> IngestConfig {
        IngestConfig {
            drop_dir: root.join("in"),
            archive_dir: root.join("archive"),
            default_table: "records".into(),
        }
    }

    #[test]
    fn discover_maps_directories_to_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(dir.path());
        fs::create_dir_all(cfg.drop_dir.join("Sales Q1/deeper")).expect("mkdir");
        fs::write(cfg.drop_dir.join("a.csv"), "x\n1\n").expect("write");
        fs::write(cfg.drop_dir.join(".hidden.csv"), "x\n1\n").expect("write");
        fs::write(cfg.drop_dir.join("notes.txt"), "hi").expect("write");
        fs::write(cfg.drop_dir.join("Sales Q1/b.csv"), "x\n1\n").expect("write");
        fs::write(cfg.drop_dir.join("Sales Q1/deeper/c.csv"), "x\n1\n").expect("write");

        let found = discover(&cfg).expect("discover");
        let got: Vec<(&str, &str)> = found
            .iter()
            .map(|c| (c.relative.as_str(), c.table.as_str()))
            .collect();
        assert_eq!(got, vec![("Sales Q1/b.csv", "sales_q1"), ("a.csv", "records")]);
    }

    #[test]
    fn archive_names_never_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = archive_target(dir.path(), "a.csv");
        assert_eq!(first, dir.path().join("a.csv"));
        fs::write(&first, "").expect("write");
        let second = archive_target(dir.path(), "a.csv");
        assert_eq!(second, dir.path().join("a_1.csv"));
        fs::write(&second, "").expect("write");
        assert_eq!(archive_target(dir.path(), "a.csv"), dir.path().join("a_2.csv"));
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
