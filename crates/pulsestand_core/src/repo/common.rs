//! Shared repository error type and SQLite helpers.
//!
//! # Invariants
//! - Every SQLite failure surfaces as `RepoError::Db` carrying SQLite's own
//!   diagnostic text.
//! - Repositories refuse connections whose schema is not fully migrated.

use crate::db::migrations::{current_version, latest_version};
use crate::db::DbError;
use rusqlite::{Connection, ErrorCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence-layer error shared by pulse, stand and timeline repositories.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(String),
    AlreadyExists(String),
    /// Store accepted the call but did not report the expected write.
    NotAcknowledged(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted into a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::AlreadyExists(what) => write!(f, "already exists: {what}"),
            Self::NotAcknowledged(message) => write!(f, "write not acknowledged: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn ensure_schema_ready(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    for &table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}

pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
        }
        _ => false,
    }
}

pub(crate) fn to_json_column<T: Serialize>(value: &T, column: &str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode {column}: {err}")))
}

pub(crate) fn from_json_column<T: DeserializeOwned>(text: &str, column: &str) -> RepoResult<T> {
    serde_json::from_str(text)
        .map_err(|err| RepoError::InvalidData(format!("invalid JSON in {column}: {err}")))
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
