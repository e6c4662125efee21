//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout, so a
//!   writer blocked by another connection waits instead of failing.
//! - File connections use the WAL journal.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::CoreConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    File,
    Memory,
}

impl OpenMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens a SQLite database file with default configuration.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with_config(path, &CoreConfig::default())
}

/// Opens a SQLite database file using `config` for connection tunables.
pub fn open_db_with_config(path: impl AsRef<Path>, config: &CoreConfig) -> DbResult<Connection> {
    open_with(OpenMode::File, config, || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(OpenMode::Memory, &CoreConfig::default(), Connection::open_in_memory)
}

fn open_with(
    mode: OpenMode,
    config: &CoreConfig,
    opener: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={}", mode.as_str());

    let mut conn = match opener() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, mode, config) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, mode: OpenMode, config: &CoreConfig) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(config.busy_timeout())?;
    if mode == OpenMode::File {
        let _journal: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    }
    apply_migrations(conn)?;
    Ok(())
}
