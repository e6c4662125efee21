//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations in one transaction.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A database newer than this binary is rejected, never downgraded.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "pulses",
        sql: include_str!("0001_pulses.sql"),
    },
    Migration {
        version: 2,
        name: "timelines",
        sql: include_str!("0002_timelines.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Reads the schema version recorded in the database.
pub fn current_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Applies all pending migrations on the provided connection.
///
/// The version is re-read under an immediate transaction, so concurrent
/// openers of one file migrate it exactly once.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let latest = latest_version();
    if current_version(conn)? == latest {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current = current_version(&tx)?;
    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(())
}
