use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;
use crate::config::{MigrationPolicy, SCHEMA_VERSION};

/// Tables owned by the schema, children first so drops never trip a foreign key.
const SCHEMA_TABLES: &[&str] = &[
    "medication_history",
    "medications",
    "consultations",
    "schema_version",
];

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path, policy: MigrationPolicy) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn, policy)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn, MigrationPolicy::Strict)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn migrations() -> Vec<(i64, &'static str)> {
    vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
        (2, include_str!("../../resources/migrations/002_consultations.sql")),
        (3, include_str!("../../resources/migrations/003_indices.sql")),
    ]
}

/// Run all pending migrations.
///
/// A database written by a newer build is either wiped and recreated
/// (`Destructive`) or rejected (`Strict`).
pub fn run_migrations(conn: &Connection, policy: MigrationPolicy) -> Result<(), DatabaseError> {
    let mut current_version = get_current_version(conn);

    if current_version > SCHEMA_VERSION {
        match policy {
            MigrationPolicy::Strict => {
                return Err(DatabaseError::SchemaTooNew {
                    found: current_version,
                    supported: SCHEMA_VERSION,
                });
            }
            MigrationPolicy::Destructive => {
                tracing::warn!(
                    found = current_version,
                    supported = SCHEMA_VERSION,
                    "Incompatible schema, resetting local database"
                );
                reset_schema(conn)?;
                current_version = 0;
            }
        }
    }

    for (version, sql) in migrations() {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
            tx.commit()?;
        }
    }

    Ok(())
}

/// Drop every schema table.
fn reset_schema(conn: &Connection) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    for table in SCHEMA_TABLES {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
    }
    tx.commit()?;
    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
pub fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}
