//! Database schema.
//!
//! The hierarchy is modelled with three tables:
//!
//! - `partitions`: one row per device
//! - `children`: one row per timestamp, unique within its partition
//! - `entries`: the field/value text pairs of a child
//!
//! Row ids are assigned in insertion order and define iteration order.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Fresh databases get the current layout. Databases written by a newer
/// version are refused rather than guessed at.
pub fn initialize(conn: &Connection) -> Result<()> {
    match get_schema_version(conn)? {
        0 => {
            create_schema_v1(conn)?;
            set_schema_version(conn, SCHEMA_VERSION)?;
        }
        version if version > SCHEMA_VERSION => {
            return Err(Error::UnsupportedSchema {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }
        _ => {}
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Top-level partitions (one per device)
        CREATE TABLE IF NOT EXISTS partitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        -- Sub-partitions (one per timestamp)
        CREATE TABLE IF NOT EXISTS children (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            partition_id INTEGER NOT NULL REFERENCES partitions(id),
            key TEXT NOT NULL,
            UNIQUE(partition_id, key)
        );

        -- Flat key/value pairs within a sub-partition
        CREATE TABLE IF NOT EXISTS entries (
            child_id INTEGER NOT NULL REFERENCES children(id),
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (child_id, key)
        );
        "#,
    )?;

    Ok(())
}
