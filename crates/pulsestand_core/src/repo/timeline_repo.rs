//! Timeline repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist timelines and their append-only events.
//! - Serve keyset pages of events ordered `time DESC, seq DESC`.
//! - Aggregate the latest product per name across one timeline.
//!
//! # Invariants
//! - An event row and its `event_products` rows are written in one
//!   transaction; readers never see half an event.
//! - `seq` is assigned by SQLite and only breaks ties between equal times.
//! - Events and timelines are never updated or deleted.

use crate::model::coordinates::PrincipalId;
use crate::model::event::{Event, Timeline};
use crate::model::tag::Product;
use crate::model::time::Timestamp;
use crate::repo::common::{
    ensure_schema_ready, from_json_column, is_foreign_key_violation, is_unique_violation,
    to_json_column, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const EVENT_SELECT_SQL: &str = "SELECT
    seq,
    uuid,
    timeline,
    text,
    time,
    tags,
    products
FROM events";

/// Upper bound of one events page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventBound {
    /// First page: every event with `time <= up_to`.
    AtOrBefore(Timestamp),
    /// Following pages: strictly after the last row already returned.
    Before { time: Timestamp, seq: i64 },
}

/// Event together with its storage sequence, used as a paging cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub seq: i64,
    pub event: Event,
}

/// Storage primitives of the timeline event store.
pub trait TimelineRepository {
    fn create_timeline(&self, timeline: &Timeline) -> RepoResult<()>;
    fn get_timeline(&self, name: &str) -> RepoResult<Option<Timeline>>;
    /// Timelines of one owner sorted by name.
    fn list_timelines(&self, owner: &PrincipalId) -> RepoResult<Vec<Timeline>>;
    /// Inserts one event atomically and returns its storage sequence.
    fn insert_event(&self, event: &Event) -> RepoResult<i64>;
    /// Returns up to `limit` events below `bound`, newest first.
    fn events_page(&self, timeline: &str, bound: &EventBound, limit: u32)
        -> RepoResult<Vec<EventRow>>;
    fn count_events(&self, timeline: &str) -> RepoResult<u64>;
    /// Latest value of every distinct product name, sorted by name.
    fn latest_products(&self, timeline: &str) -> RepoResult<Vec<Product>>;
}

/// SQLite-backed timeline repository.
pub struct SqliteTimelineRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTimelineRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn, &["timelines", "events", "event_products"])?;
        Ok(Self { conn })
    }
}

impl TimelineRepository for SqliteTimelineRepository<'_> {
    fn create_timeline(&self, timeline: &Timeline) -> RepoResult<()> {
        let inserted = self.conn.execute(
            "INSERT INTO timelines (name, owner, created_at) VALUES (?1, ?2, ?3);",
            params![
                timeline.name.as_str(),
                timeline.owner.as_str(),
                timeline.created_at.millis(),
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::AlreadyExists(format!(
                "timeline `{}`",
                timeline.name
            ))),
            Err(err) => Err(err.into()),
        }
    }

    fn get_timeline(&self, name: &str) -> RepoResult<Option<Timeline>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, owner, created_at FROM timelines WHERE name = ?1;",
                [name],
                |row| Ok(parse_timeline_row(row)),
            )
            .optional()?;
        row.transpose()
    }

    fn list_timelines(&self, owner: &PrincipalId) -> RepoResult<Vec<Timeline>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, owner, created_at
             FROM timelines
             WHERE owner = ?1
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([owner.as_str()])?;
        let mut timelines = Vec::new();
        while let Some(row) = rows.next()? {
            timelines.push(parse_timeline_row(row)?);
        }
        Ok(timelines)
    }

    fn insert_event(&self, event: &Event) -> RepoResult<i64> {
        let tags_json = to_json_column(&event.tags, "events.tags")?;
        let products_json = to_json_column(&event.products, "events.products")?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO events (uuid, timeline, text, time, tags, products)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                event.id.to_string(),
                event.timeline.as_str(),
                event.text.as_str(),
                event.time.millis(),
                tags_json,
                products_json,
            ],
        );
        let changed = match inserted {
            Ok(changed) => changed,
            Err(err) if is_foreign_key_violation(&err) => {
                return Err(RepoError::NotFound(format!("timeline `{}`", event.timeline)));
            }
            Err(err) => return Err(err.into()),
        };
        if changed != 1 {
            return Err(RepoError::NotAcknowledged(format!(
                "insert of event {} reported {changed} rows",
                event.id
            )));
        }
        let seq = tx.last_insert_rowid();

        for (position, product) in event.products.iter().enumerate() {
            tx.execute(
                "INSERT INTO event_products (event_seq, timeline, time, position, name, markdown)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    seq,
                    event.timeline.as_str(),
                    event.time.millis(),
                    position as i64,
                    product.name.as_str(),
                    product.markdown.as_str(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(seq)
    }

    fn events_page(
        &self,
        timeline: &str,
        bound: &EventBound,
        limit: u32,
    ) -> RepoResult<Vec<EventRow>> {
        let limit = i64::from(limit.max(1));
        let mut rows_out = Vec::new();
        match *bound {
            EventBound::AtOrBefore(up_to) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{EVENT_SELECT_SQL}
                     WHERE timeline = ?1
                       AND time <= ?2
                     ORDER BY time DESC, seq DESC
                     LIMIT ?3;"
                ))?;
                let mut rows = stmt.query(params![timeline, up_to.millis(), limit])?;
                while let Some(row) = rows.next()? {
                    rows_out.push(parse_event_row(row)?);
                }
            }
            EventBound::Before { time, seq } => {
                let mut stmt = self.conn.prepare(&format!(
                    "{EVENT_SELECT_SQL}
                     WHERE timeline = ?1
                       AND (time < ?2 OR (time = ?2 AND seq < ?3))
                     ORDER BY time DESC, seq DESC
                     LIMIT ?4;"
                ))?;
                let mut rows = stmt.query(params![timeline, time.millis(), seq, limit])?;
                while let Some(row) = rows.next()? {
                    rows_out.push(parse_event_row(row)?);
                }
            }
        }
        Ok(rows_out)
    }

    fn count_events(&self, timeline: &str) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE timeline = ?1;",
            [timeline],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn latest_products(&self, timeline: &str) -> RepoResult<Vec<Product>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, markdown
             FROM (
                SELECT
                    name,
                    markdown,
                    ROW_NUMBER() OVER (
                        PARTITION BY name
                        ORDER BY time DESC, event_seq DESC, position ASC
                    ) AS latest_rank
                FROM event_products
                WHERE timeline = ?1
             )
             WHERE latest_rank = 1
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([timeline])?;
        let mut products = Vec::new();
        while let Some(row) = rows.next()? {
            products.push(Product::new(
                row.get::<_, String>("name")?,
                row.get::<_, String>("markdown")?,
            ));
        }
        Ok(products)
    }
}

fn parse_timeline_row(row: &Row<'_>) -> RepoResult<Timeline> {
    let owner_text: String = row.get("owner")?;
    let owner = PrincipalId::parse(&owner_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid owner `{owner_text}` in timelines.owner"))
    })?;
    Ok(Timeline {
        name: row.get("name")?,
        owner,
        created_at: Timestamp::from_millis(row.get("created_at")?),
    })
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<EventRow> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid uuid `{uuid_text}` in events.uuid: {err}"))
    })?;
    let tags_text: String = row.get("tags")?;
    let products_text: String = row.get("products")?;

    Ok(EventRow {
        seq: row.get("seq")?,
        event: Event {
            id,
            timeline: row.get("timeline")?,
            text: row.get("text")?,
            time: Timestamp::from_millis(row.get("time")?),
            tags: from_json_column(&tags_text, "events.tags")?,
            products: from_json_column(&products_text, "events.products")?,
        },
    })
}
