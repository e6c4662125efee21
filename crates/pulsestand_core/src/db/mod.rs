//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections shared by pulse and timeline repos.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - File databases run in WAL mode so independent connections (threads or
//!   processes) can interleave readers with a writer.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with_config};

/// Result of connection bootstrap and migration steps.
pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening, configuring or migrating a database.
#[derive(Debug)]
pub enum DbError {
    /// SQLite refused a pragma (WAL switch, busy timeout), a migration script
    /// or the open itself; carries SQLite's own diagnostic.
    Sqlite(rusqlite::Error),
    /// `PRAGMA user_version` is ahead of every migration this binary ships,
    /// so the file was written by a newer release and is left untouched.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "pulsestand database is at schema version {db_version}; this build migrates up to {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
