//! Column and table name normalisation.

use std::collections::HashSet;

/// Physical column names owned by the store itself.
pub const RESERVED_COLUMNS: &[&str] = &["id", "table_name", "file_id", "row_hash"];

/// Lowercase, collapse every run of non-alphanumerics to `_`, and trim
/// separators from both ends.
pub fn identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Normalise a file's header row into unique, storable column names.
pub fn headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .enumerate()
        .map(|(i, h)| {
            let mut name = identifier(h.as_ref());
            if name.is_empty() {
                name = format!("column_{}", i + 1);
            }
            if name.starts_with(|c: char| c.is_ascii_digit()) {
                name = format!("c_{}", name);
            }
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                name = format!("source_{}", name);
            }
            let mut unique = name.clone();
            let mut n = 2;
            while !seen.insert(unique.clone()) {
                unique = format!("{}_{}", name, n);
                n += 1;
            }
            unique
        })
        .collect()
}

/// Store-internal tables; a logical table may not take one of these names.
pub const RESERVED_TABLES: &[&str] = &[
    "data_files",
    "table_columns",
    "data_records",
    "reports",
    "execution_log",
];

/// Normalise a directory name into a table name. `None` if nothing usable
/// remains.
pub fn table_name(raw: &str) -> Option<String> {
    let mut name = identifier(raw);
    if name.is_empty() {
        return None;
    }
    if name.starts_with(|c: char| c.is_ascii_digit())
        || name.starts_with("sqlite_")
        || RESERVED_TABLES.contains(&name.as_str())
    {
        name = format!("t_{}", name);
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_punctuation() {
        assert_eq!(identifier("  Unit Price ($) "), "unit_price");
        assert_eq!(identifier("First--Name"), "first_name");
        assert_eq!(identifier("__a__b__"), "a_b");
    }

    #[test]
    fn header_edge_cases() {
        let got = headers(&["Name", "name", "", "2024 Sales", "ID", "  name "]);
        assert_eq!(
            got,
            vec!["name", "name_2", "column_3", "c_2024_sales", "source_id", "name_3"]
        );
    }

    #[test]
    fn table_names() {
        assert_eq!(table_name("Sales Q1"), Some("sales_q1".to_string()));
        assert_eq!(table_name("2024"), Some("t_2024".to_string()));
        assert_eq!(table_name("---"), None);
        assert_eq!(table_name("Reports"), Some("t_reports".to_string()));
    }
}
