//! Pulse repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the two primitives the append loop is built on: atomic
//!   find-or-create and conditional replace against a known version.
//! - Keep the derived `pulse_tags` index in step with the pulse row.
//! - List pulses of a stand newest-first, optionally by tag label.
//!
//! # Invariants
//! - `replace_if_current` changes at most one row and only when the stored
//!   version equals the snapshot version; the tag index is rewritten in the
//!   same transaction.
//! - Pulse rows are never deleted here.
//!
//! # See also
//! - `service::pulse_log` for the retry loop.

use crate::model::coordinates::{Coordinates, Position};
use crate::model::pulse::{PulseSnapshot, PulseUpdate};
use crate::model::tag::Tag;
use crate::model::time::Timestamp;
use crate::repo::common::{
    ensure_schema_ready, from_json_column, to_json_column, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::BTreeSet;

const PULSES_DEFAULT_LIMIT: u32 = 20;
const PULSES_LIMIT_MAX: u32 = 200;

const PULSE_SELECT_SQL: &str = "SELECT
    stand,
    coordinates,
    version,
    xembly,
    tags,
    updated_at
FROM pulses";

/// Query options for listing pulses of one stand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseListQuery {
    /// Only pulses strictly below this position are returned.
    pub below: Position,
    /// Optional tag label filter, matched against the derived tag index.
    pub tag: Option<String>,
    /// Maximum rows to return. Defaults to 20 and clamps to 200.
    pub limit: Option<u32>,
}

/// Storage primitives required by the pulse append engine.
pub trait PulseRepository {
    /// Returns the record for `(stand, coordinates)`, atomically creating an
    /// empty one first when absent.
    fn find_or_create(&self, stand: &str, coordinates: &Coordinates) -> RepoResult<PulseSnapshot>;
    /// Replaces the record identified by `snapshot` if nobody committed since
    /// it was read. Returns the number of affected records (0 or 1).
    fn replace_if_current(&self, snapshot: &PulseSnapshot, update: &PulseUpdate)
        -> RepoResult<usize>;
    /// Loads one record without creating it.
    fn get_pulse(&self, stand: &str, coordinates: &Coordinates)
        -> RepoResult<Option<PulseSnapshot>>;
    /// Lists records newest-first.
    fn list_pulses(&self, stand: &str, query: &PulseListQuery) -> RepoResult<Vec<PulseSnapshot>>;
}

/// SQLite-backed pulse repository.
pub struct SqlitePulseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePulseRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn, &["pulses", "pulse_tags"])?;
        Ok(Self { conn })
    }
}

impl PulseRepository for SqlitePulseRepository<'_> {
    fn find_or_create(&self, stand: &str, coordinates: &Coordinates) -> RepoResult<PulseSnapshot> {
        let key = coordinates.to_string();
        self.conn.execute(
            "INSERT INTO pulses (stand, coordinates, scheduled, rule, owner)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (stand, coordinates) DO NOTHING;",
            params![
                stand,
                key.as_str(),
                coordinates.scheduled().millis(),
                coordinates.rule(),
                coordinates.owner().as_str(),
            ],
        )?;

        self.get_pulse(stand, coordinates)?.ok_or_else(|| {
            RepoError::NotAcknowledged(format!("pulse `{key}` missing right after upsert"))
        })
    }

    fn replace_if_current(
        &self,
        snapshot: &PulseSnapshot,
        update: &PulseUpdate,
    ) -> RepoResult<usize> {
        let key = snapshot.coordinates.to_string();
        let tags_json = to_json_column(&update.tags, "pulses.tags")?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE pulses
             SET
                version = version + 1,
                xembly = ?3,
                tags = ?4,
                updated_at = ?5
             WHERE stand = ?1
               AND coordinates = ?2
               AND version = ?6;",
            params![
                snapshot.stand.as_str(),
                key.as_str(),
                update.xembly.as_str(),
                tags_json,
                update.updated.millis(),
                snapshot.version,
            ],
        )?;
        if changed != 1 {
            // Dropping the transaction rolls it back; nothing was written.
            return Ok(changed);
        }

        replace_tag_index(&tx, &snapshot.stand, &key, &update.tags)?;
        tx.commit()?;
        Ok(changed)
    }

    fn get_pulse(
        &self,
        stand: &str,
        coordinates: &Coordinates,
    ) -> RepoResult<Option<PulseSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PULSE_SELECT_SQL}
             WHERE stand = ?1
               AND coordinates = ?2;"
        ))?;
        let row = stmt
            .query_row(params![stand, coordinates.to_string()], |row| {
                Ok(parse_pulse_row(row))
            })
            .optional()?;
        row.transpose()
    }

    fn list_pulses(&self, stand: &str, query: &PulseListQuery) -> RepoResult<Vec<PulseSnapshot>> {
        let mut sql = format!("{PULSE_SELECT_SQL} WHERE stand = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(stand.to_string())];

        if let Some(below) = query.below.coordinates() {
            sql.push_str(
                " AND (scheduled < ?
                       OR (scheduled = ? AND (rule < ? OR (rule = ? AND owner < ?))))",
            );
            let scheduled = below.scheduled().millis();
            bind_values.push(Value::Integer(scheduled));
            bind_values.push(Value::Integer(scheduled));
            bind_values.push(Value::Text(below.rule().to_string()));
            bind_values.push(Value::Text(below.rule().to_string()));
            bind_values.push(Value::Text(below.owner().to_string()));
        }

        if let Some(tag) = query.tag.as_ref() {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM pulse_tags pt
                    WHERE pt.stand = pulses.stand
                      AND pt.coordinates = pulses.coordinates
                      AND pt.label = ?
                )",
            );
            bind_values.push(Value::Text(tag.clone()));
        }

        sql.push_str(" ORDER BY scheduled DESC, rule DESC, owner DESC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_pulse_limit(query.limit))));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut pulses = Vec::new();
        while let Some(row) = rows.next()? {
            pulses.push(parse_pulse_row(row)?);
        }
        Ok(pulses)
    }
}

/// Normalizes list limit according to the pulse listing contract.
pub fn normalize_pulse_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => PULSES_DEFAULT_LIMIT,
        Some(value) => value.min(PULSES_LIMIT_MAX),
    }
}

fn replace_tag_index(
    tx: &Transaction<'_>,
    stand: &str,
    coordinates: &str,
    tags: &BTreeSet<Tag>,
) -> RepoResult<()> {
    tx.execute(
        "DELETE FROM pulse_tags WHERE stand = ?1 AND coordinates = ?2;",
        params![stand, coordinates],
    )?;
    for tag in tags {
        tx.execute(
            "INSERT OR IGNORE INTO pulse_tags (stand, coordinates, label, level)
             VALUES (?1, ?2, ?3, ?4);",
            params![stand, coordinates, tag.label.as_str(), tag.level.as_str()],
        )?;
    }
    Ok(())
}

fn parse_pulse_row(row: &Row<'_>) -> RepoResult<PulseSnapshot> {
    let coordinates_text: String = row.get("coordinates")?;
    let coordinates = Coordinates::parse(&coordinates_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid coordinates `{coordinates_text}` in pulses.coordinates: {err}"
        ))
    })?;
    let tags_text: String = row.get("tags")?;

    Ok(PulseSnapshot {
        stand: row.get("stand")?,
        coordinates,
        version: row.get("version")?,
        xembly: row.get("xembly")?,
        tags: from_json_column(&tags_text, "pulses.tags")?,
        updated: row
            .get::<_, Option<i64>>("updated_at")?
            .map(Timestamp::from_millis),
    })
}

#[cfg(test)]
mod tests {
    use super::normalize_pulse_limit;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(normalize_pulse_limit(None), 20);
        assert_eq!(normalize_pulse_limit(Some(0)), 20);
        assert_eq!(normalize_pulse_limit(Some(7)), 7);
        assert_eq!(normalize_pulse_limit(Some(10_000)), 200);
    }
}
