mod versioned_schema;

pub use versioned_schema::{Column, SqlType, Table, VersionedSchema};

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Offset added to every schema version written to `PRAGMA user_version`,
/// so that foreign SQLite files are rejected instead of being migrated.
pub const BASE_DB_VERSION: usize = 7_100;

/// Opens the db at `db_path`, creating it with the latest schema if it
/// doesn't exist, otherwise validating it and running pending migrations.
pub fn open_versioned_db<P: AsRef<Path>>(
    db_path: P,
    schemas: &'static [VersionedSchema],
    label: &str,
) -> Result<Connection> {
    let db_path = db_path.as_ref();
    let latest = schemas.last().context("No schemas defined")?;

    let conn = if db_path.exists() {
        Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?
    } else {
        let conn = Connection::open(db_path)?;
        latest.create(&conn)?;
        info!("Created new {} database at {:?}", label, db_path);
        conn
    };

    let raw_version = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
        .context("Failed to read database version")?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    if db_version < 0 {
        bail!(
            "{} database version {} is too old, does not contain base db version {}",
            label,
            raw_version,
            BASE_DB_VERSION
        );
    }
    let version = db_version as usize;
    if version >= schemas.len() {
        bail!(
            "{} database version {} is too new (max supported: {})",
            label,
            version,
            schemas.len() - 1
        );
    }

    schemas[version].validate(&conn)?;
    migrate_if_needed(&conn, schemas, version, label)?;
    Ok(conn)
}

/// In-memory connection with the latest schema, for tests.
pub fn open_in_memory_db(schemas: &'static [VersionedSchema]) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schemas
        .last()
        .context("No schemas defined")?
        .create(&conn)?;
    Ok(conn)
}

fn migrate_if_needed(
    conn: &Connection,
    schemas: &'static [VersionedSchema],
    current_version: usize,
    label: &str,
) -> Result<()> {
    let target_version = schemas.len() - 1;
    if current_version >= target_version {
        return Ok(());
    }

    info!(
        "Migrating {} database from version {} to {}",
        label, current_version, target_version
    );

    let tx = conn.unchecked_transaction()?;
    for schema in schemas.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!("Running {} migration to version {}", label, schema.version);
            migration_fn(&tx)?;
        }
    }
    tx.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + target_version),
        [],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_column;
    use tempfile::TempDir;

    const NOTES_V0: Table = Table {
        name: "notes",
        columns: &[sqlite_column!("id", &SqlType::Text, is_primary_key = true)],
        indices: &[],
    };

    const NOTES_V1: Table = Table {
        name: "notes",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!("body", &SqlType::Text),
        ],
        indices: &[],
    };

    fn add_body_column(conn: &Connection) -> Result<()> {
        conn.execute("ALTER TABLE notes ADD COLUMN body TEXT", [])?;
        Ok(())
    }

    static ONLY_V0: [VersionedSchema; 1] = [VersionedSchema {
        version: 0,
        tables: &[NOTES_V0],
        migration: None,
    }];

    static V0_AND_V1: [VersionedSchema; 2] = [
        VersionedSchema {
            version: 0,
            tables: &[NOTES_V0],
            migration: None,
        },
        VersionedSchema {
            version: 1,
            tables: &[NOTES_V1],
            migration: Some(add_body_column),
        },
    ];

    #[test]
    fn test_creates_then_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.db");
        drop(open_versioned_db(&path, &V0_AND_V1, "notes").unwrap());
        let conn = open_versioned_db(&path, &V0_AND_V1, "notes").unwrap();
        let version: usize = conn
            .query_row("PRAGMA user_version;", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, BASE_DB_VERSION + 1);
    }

    #[test]
    fn test_migrates_old_db() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.db");
        drop(open_versioned_db(&path, &ONLY_V0, "notes").unwrap());

        let conn = open_versioned_db(&path, &V0_AND_V1, "notes").unwrap();
        conn.execute("INSERT INTO notes (id, body) VALUES ('a', 'hello')", [])
            .unwrap();
        let version: usize = conn
            .query_row("PRAGMA user_version;", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, BASE_DB_VERSION + 1);
    }

    #[test]
    fn test_rejects_foreign_db() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foreign.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE x (a TEXT)", []).unwrap();
        }
        let err = open_versioned_db(&path, &V0_AND_V1, "notes").unwrap_err();
        assert!(err.to_string().contains("too old"));
    }

    #[test]
    fn test_rejects_newer_db() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.db");
        drop(open_versioned_db(&path, &V0_AND_V1, "notes").unwrap());
        let err = open_versioned_db(&path, &ONLY_V0, "notes").unwrap_err();
        assert!(err.to_string().contains("too new"));
    }
}
