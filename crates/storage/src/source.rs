//! Readers that turn a dropped file into a typed, header-normalised table.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::cell::{parse_decimal, Cell, ColumnType};
use crate::error::StoreError;
use crate::normalize;

/// File extensions the ingestion pipeline picks up.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "xlsx", "xls", "ods"];

/// A parsed source file: normalised columns with inferred types, and rows
/// aligned to them.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub columns: Vec<(String, ColumnType)>,
    pub rows: Vec<Vec<Cell>>,
}

pub fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Read `bytes` (the content of `path`) into a [`SourceTable`].
pub fn read(path: &Path, bytes: &[u8]) -> Result<SourceTable, StoreError> {
    let raw = match extension(path).as_deref() {
        Some("csv") => read_delimited(path, bytes, b',')?,
        Some("tsv") => read_delimited(path, bytes, b'\t')?,
        Some("xlsx" | "xls" | "ods") => read_workbook(path)?,
        _ => return Err(malformed(path, "unsupported file type")),
    };
    build(path, raw)
}

fn malformed(path: &Path, reason: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn read_delimited(
    path: &Path,
    bytes: &[u8],
    delimiter: u8,
) -> Result<Vec<Vec<String>>, StoreError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| malformed(path, format!("record {}: {}", i + 1, e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>, StoreError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| malformed(path, e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| malformed(path, "workbook has no worksheets"))?
        .map_err(|e| malformed(path, e.to_string()))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(render_data).collect())
        .collect())
}

fn render_data(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        // Spreadsheets store whole numbers as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{:?}", e),
        other => other.to_string(),
    }
}

fn build(path: &Path, mut raw: Vec<Vec<String>>) -> Result<SourceTable, StoreError> {
    raw.retain(|row| row.iter().any(|c| !c.trim().is_empty()));
    if raw.is_empty() {
        return Err(malformed(path, "no header row"));
    }
    let header = raw.remove(0);
    let names = normalize::headers(&header);
    let width = names.len();

    for (i, row) in raw.iter_mut().enumerate() {
        if row.len() > width {
            if row[width..].iter().any(|c| !c.trim().is_empty()) {
                return Err(malformed(
                    path,
                    format!(
                        "row {} has {} fields but the header has {}",
                        i + 2,
                        row.len(),
                        width
                    ),
                ));
            }
            row.truncate(width);
        }
        row.resize(width, String::new());
    }

    let columns: Vec<(String, ColumnType)> = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let ty = infer(raw.iter().map(|row| row[i].as_str()));
            (name, ty)
        })
        .collect();
    let rows = raw
        .iter()
        .map(|row| {
            row.iter()
                .zip(&columns)
                .map(|(value, (_, ty))| Cell::parse(value, *ty))
                .collect()
        })
        .collect();
    Ok(SourceTable { columns, rows })
}

/// INTEGER if every non-empty value is an i64, else REAL if every one is a
/// decimal, else TEXT. A column with no values at all is TEXT.
pub fn infer<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut any = false;
    let mut all_int = true;
    let mut all_dec = true;
    for v in values.map(str::trim).filter(|v| !v.is_empty()) {
        any = true;
        if all_int && v.parse::<i64>().is_err() {
            all_int = false;
        }
        if !all_int && parse_decimal(v).is_none() {
            all_dec = false;
            break;
        }
    }
    match (any, all_int, all_dec) {
        (false, _, _) => ColumnType::Text,
        (true, true, _) => ColumnType::Integer,
        (true, false, true) => ColumnType::Real,
        _ => ColumnType::Text,
    }
}
