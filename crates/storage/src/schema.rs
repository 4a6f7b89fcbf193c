//! Schema descriptors and the additive schema evolver.
//!
//! A table's schema lives in `table_columns`; the values live in shared,
//! untyped physical columns of `data_records`. Evolution only ever appends:
//! existing columns keep their position and type forever, and rows that
//! predate a column read it as NULL.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, ColumnType};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

impl SchemaDescriptor {
    pub fn empty(table: &str) -> Self {
        SchemaDescriptor {
            table: table.to_string(),
            columns: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Columns of `incoming` that `current` lacks, in incoming order. Pure.
pub fn plan(current: &SchemaDescriptor, incoming: &[(String, ColumnType)]) -> Vec<ColumnDef> {
    let mut seen: HashSet<&str> = current.columns.iter().map(|c| c.name.as_str()).collect();
    incoming
        .iter()
        .filter(|(name, _)| seen.insert(name.as_str()))
        .map(|(name, ty)| ColumnDef {
            name: name.clone(),
            ty: *ty,
        })
        .collect()
}

/// Bring `table`'s schema up to date with `incoming` and return the merged
/// descriptor. Runs inside the caller's transaction; a second call with
/// the same input changes nothing.
pub fn evolve(
    conn: &Connection,
    table: &str,
    incoming: &[(String, ColumnType)],
    now: &str,
) -> Result<SchemaDescriptor, StoreError> {
    let mut descriptor = load(conn, table)?.unwrap_or_else(|| SchemaDescriptor::empty(table));
    let additions = plan(&descriptor, incoming);
    if additions.is_empty() {
        return Ok(descriptor);
    }

    let physical = physical_columns(conn)?;
    for def in additions {
        if !physical.contains(&def.name) {
            // No declared type; the logical type lives in table_columns.
            conn.execute_batch(&format!(
                "ALTER TABLE data_records ADD COLUMN {}",
                quote(&def.name)
            ))?;
        }
        conn.execute(
            "INSERT INTO table_columns (table_name, position, column_name, column_type, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                table,
                descriptor.columns.len() as i64,
                def.name,
                def.ty.as_str(),
                now
            ],
        )?;
        tracing::info!(table, column = %def.name, ty = %def.ty, "schema widened");
        descriptor.columns.push(def);
    }
    refresh_view(conn, &descriptor)?;
    Ok(descriptor)
}

/// (Re)create the view that exposes one logical table to SQL, so scripts
/// can `SELECT ... FROM sales` instead of filtering `data_records`.
fn refresh_view(conn: &Connection, descriptor: &SchemaDescriptor) -> Result<(), StoreError> {
    let columns = descriptor
        .columns
        .iter()
        .map(|c| quote(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!(
        "DROP VIEW IF EXISTS {view};
         CREATE VIEW {view} AS SELECT {columns} FROM data_records WHERE table_name = '{table}';",
        view = quote(&descriptor.table),
        columns = columns,
        table = descriptor.table.replace('\'', "''"),
    ))?;
    Ok(())
}

/// Coerce a source row to the stored column types of `descriptor`.
/// `columns` names the row's cells in order.
pub fn coerce_row(
    descriptor: &SchemaDescriptor,
    columns: &[(String, ColumnType)],
    row: Vec<Cell>,
) -> Vec<(String, Cell)> {
    columns
        .iter()
        .zip(row)
        .map(|((name, incoming), cell)| {
            let target = descriptor.column(name).map(|c| c.ty).unwrap_or(*incoming);
            (name.clone(), cell.coerce(target))
        })
        .collect()
}

pub fn load(conn: &Connection, table: &str) -> Result<Option<SchemaDescriptor>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT column_name, column_type FROM table_columns
         WHERE table_name = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![table], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut columns = Vec::new();
    for row in rows {
        let (name, ty) = row?;
        let ty = ty.parse::<ColumnType>().map_err(|e| {
            StoreError::Sql(rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                e.into(),
            ))
        })?;
        columns.push(ColumnDef { name, ty });
    }
    if columns.is_empty() {
        return Ok(None);
    }
    Ok(Some(SchemaDescriptor {
        table: table.to_string(),
        columns,
    }))
}

pub fn list_tables(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT table_name FROM table_columns ORDER BY table_name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM table_columns WHERE table_name = ?1 LIMIT 1",
            params![table],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn physical_columns(conn: &Connection) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('data_records')")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(names)
}

/// Double-quote an identifier for SQL.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn cols(pairs: &[(&str, ColumnType)]) -> Vec<(String, ColumnType)> {
        pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    #[test]
    fn plan_is_the_set_difference_in_incoming_order() {
        let current = SchemaDescriptor {
            table: "t".into(),
            columns: vec![ColumnDef {
                name: "a".into(),
                ty: ColumnType::Integer,
            }],
        };
        let additions = plan(
            &current,
            &cols(&[("c", ColumnType::Text), ("a", ColumnType::Text), ("b", ColumnType::Real)]),
        );
        let names: Vec<&str> = additions.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn evolve_appends_and_is_idempotent() {
        let store = Store::open_in_memory().expect("store");
        let conn = store.connection();
        let first =
            evolve(conn, "sales", &cols(&[("name", ColumnType::Text)]), "t0").expect("evolve");
        assert_eq!(first.column_names(), vec!["name"]);

        let incoming = cols(&[("amount", ColumnType::Integer), ("name", ColumnType::Integer)]);
        let second = evolve(conn, "sales", &incoming, "t1").expect("evolve");
        assert_eq!(second.column_names(), vec!["name", "amount"]);
        // Existing column keeps its type.
        assert_eq!(second.column("name").map(|c| c.ty), Some(ColumnType::Text));

        let again = evolve(conn, "sales", &incoming, "t2").expect("evolve");
        assert_eq!(again, second);
    }

    #[test]
    fn physical_columns_are_shared_between_tables() {
        let store = Store::open_in_memory().expect("store");
        let conn = store.connection();
        evolve(conn, "a", &cols(&[("x", ColumnType::Integer)]), "t").expect("evolve a");
        evolve(conn, "b", &cols(&[("x", ColumnType::Text)]), "t").expect("evolve b");
        let a = load(conn, "a").expect("load").expect("a exists");
        let b = load(conn, "b").expect("load").expect("b exists");
        assert_eq!(a.columns[0].ty, ColumnType::Integer);
        assert_eq!(b.columns[0].ty, ColumnType::Text);
        assert_eq!(list_tables(conn).expect("tables"), vec!["a", "b"]);
    }

    #[test]
    fn each_table_gets_a_view() {
        let store = Store::open_in_memory().expect("store");
        let conn = store.connection();
        evolve(conn, "sales", &cols(&[("amount", ColumnType::Integer)]), "t").expect("evolve");
        evolve(conn, "sales", &cols(&[("region", ColumnType::Text)]), "t").expect("widen");
        let mut stmt = conn.prepare("SELECT * FROM sales").expect("view exists");
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        assert_eq!(names, vec!["amount", "region"]);
    }

    #[test]
    fn coerce_row_follows_stored_types() {
        let descriptor = SchemaDescriptor {
            table: "t".into(),
            columns: vec![
                ColumnDef {
                    name: "amount".into(),
                    ty: ColumnType::Real,
                },
                ColumnDef {
                    name: "code".into(),
                    ty: ColumnType::Text,
                },
            ],
        };
        let incoming = cols(&[("amount", ColumnType::Integer), ("code", ColumnType::Integer)]);
        let row = coerce_row(&descriptor, &incoming, vec![Cell::Integer(3), Cell::Integer(7)]);
        assert_eq!(row[0].1, Cell::Real(3.into()));
        assert_eq!(row[1].1, Cell::Text("7".into()));
    }
}
