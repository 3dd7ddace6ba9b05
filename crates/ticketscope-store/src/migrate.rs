//! Forward-only schema evolution: add missing columns, record the version.

use rusqlite::Connection;
use tracing::info;

use crate::sqlite::db_err;
use ticketscope_core::{Error, Result};

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    Ok(count > 0)
}

pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    check_identifier(table)?;
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .map_err(db_err)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(db_err)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)
}

/// Add every column of `columns` that `table` lacks. Returns the names added.
pub fn ensure_columns(
    conn: &Connection,
    table: &str,
    columns: &[(&str, &str)],
) -> Result<Vec<String>> {
    let existing = column_names(conn, table)?;
    let mut added = Vec::new();
    for (name, decl) in columns {
        if existing.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            continue;
        }
        check_identifier(name)?;
        conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, decl))
            .map_err(|e| Error::Database(format!("Adding {}.{} failed: {}", table, name, e)))?;
        added.push(name.to_string());
    }
    if !added.is_empty() {
        info!("Added columns to {}: {}", table, added.join(", "));
    }
    Ok(added)
}

pub fn schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(db_err)
}

pub fn set_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {}", version))
        .map_err(db_err)
}

/// Table and column names are interpolated into SQL; only plain identifiers pass.
pub fn check_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("Invalid SQL identifier: {}", name)))
    }
}
