//! Read-only access for scripts.
//!
//! A [`QueryHandle`] is the only store access the interpreter ever gets. It
//! cannot write, independently of the validator: the connection is opened
//! read-only, `query_only` is on, and every statement must be a read
//! according to both its first keyword and SQLite's own analysis.
//!
//! Script SQL sees logical tables only. While a script statement is
//! prepared and stepped, an authorizer denies direct reads of the
//! store-internal tables; the per-table views still read `data_records`
//! because SQLite reports those reads with the view as accessor.

use std::path::Path;
use std::time::Duration;

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Statement};

use crate::cell::Cell;
use crate::error::StoreError;
use crate::normalize::RESERVED_TABLES;
use crate::schema::{self, quote, ColumnDef};

/// Columns and rows returned by a read.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

pub struct QueryHandle {
    conn: Connection,
}

impl QueryHandle {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA query_only = ON;")?;
        Ok(QueryHandle { conn })
    }

    pub fn tables(&self) -> Result<Vec<String>, StoreError> {
        schema::list_tables(&self.conn)
    }

    pub fn columns(&self, table: &str) -> Result<Vec<ColumnDef>, StoreError> {
        schema::load(&self.conn, table)?
            .map(|d| d.columns)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    /// Every row of a logical table, in ingestion order.
    pub fn table(&self, table: &str) -> Result<TableData, StoreError> {
        let columns = self.columns(table)?;
        let list = columns
            .iter()
            .map(|c| quote(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM data_records WHERE table_name = ?1 ORDER BY id",
            list
        ))?;
        let names = columns.into_iter().map(|c| c.name).collect();
        read_rows(&mut stmt, names, params![table])
    }

    /// Run one read-only SQL statement with positional parameters.
    pub fn query(&self, sql: &str, params: &[Cell]) -> Result<TableData, StoreError> {
        let keyword = first_keyword(sql);
        if !matches!(keyword.as_str(), "SELECT" | "WITH" | "VALUES") {
            return Err(StoreError::WriteViolation(format!(
                "only SELECT, WITH or VALUES statements may run (got '{}')",
                keyword
            )));
        }
        // Statements may re-prepare while stepping; keep the guard until the
        // rows are read.
        self.conn.authorizer(Some(guard_internal_tables));
        let data = self.read_statement(sql, params);
        self.conn.authorizer(None::<fn(AuthContext<'_>) -> Authorization>);
        data
    }

    fn read_statement(&self, sql: &str, params: &[Cell]) -> Result<TableData, StoreError> {
        let mut stmt = self.conn.prepare(sql).map_err(StoreError::from_readonly)?;
        if !stmt.readonly() {
            return Err(StoreError::WriteViolation(
                "statement would modify the store".to_string(),
            ));
        }
        let names = stmt.column_names().into_iter().map(String::from).collect();
        read_rows(&mut stmt, names, params_from_iter(params.iter()))
    }
}

/// Deny reads of internal tables made directly by statement text.
fn guard_internal_tables(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Read { table_name, .. }
            if ctx.accessor.is_none()
                && RESERVED_TABLES
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(table_name)) =>
        {
            Authorization::Deny
        }
        _ => Authorization::Allow,
    }
}

fn read_rows<P: rusqlite::Params>(
    stmt: &mut Statement<'_>,
    columns: Vec<String>,
    params: P,
) -> Result<TableData, StoreError> {
    let width = columns.len();
    let mut rows = stmt.query(params).map_err(StoreError::from_readonly)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(StoreError::from_readonly)? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(row.get::<_, Cell>(i)?);
        }
        out.push(cells);
    }
    Ok(TableData { columns, rows: out })
}

/// Uppercased first word of `sql`, skipping whitespace, comments and
/// opening parentheses.
fn first_keyword(sql: &str) -> String {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("");
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("");
        } else {
            return trimmed
                .chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect::<String>()
                .to_ascii_uppercase();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_keyword_skips_noise() {
        assert_eq!(first_keyword("  select 1"), "SELECT");
        assert_eq!(first_keyword("-- c\n/* d */ (WITH x AS (SELECT 1) SELECT * FROM x)"), "WITH");
        assert_eq!(first_keyword("delete from t"), "DELETE");
        assert_eq!(first_keyword(""), "");
    }
}
