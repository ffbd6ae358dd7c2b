pub mod repository;
pub mod sqlite;

pub use repository::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid timestamp for {field}: {value}")]
    InvalidTimestamp { field: String, value: i64 },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Database schema v{found} is newer than supported v{supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl DatabaseError {
    /// Classify a write failure, lifting SQLite constraint errors
    /// (foreign key, NOT NULL) into `ConstraintViolation`.
    pub fn from_write(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => Self::Sqlite(e),
        }
    }
}
