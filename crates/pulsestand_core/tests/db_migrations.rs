use pulsestand_core::db::migrations::latest_version;
use pulsestand_core::db::{open_db, open_db_in_memory, DbError};
use pulsestand_core::repo::pulse_repo::SqlitePulseRepository;
use pulsestand_core::RepoError;
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "stands",
        "pulses",
        "pulse_tags",
        "timelines",
        "events",
        "event_products",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulsestand.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "pulses");
}

#[test]
fn file_databases_use_wal_journal() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("wal.db")).unwrap();
    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    assert!(err.to_string().contains("schema version 999"));
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repositories_reject_unmigrated_connections() {
    let conn = Connection::open_in_memory().unwrap();
    let result = SqlitePulseRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        })
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
