//! Stand repository contracts and SQLite implementation.
//!
//! Stands are plain metadata rows; the pulse records they own live in
//! `pulses` and are reached through `PulseRepository`.

use crate::model::coordinates::PrincipalId;
use crate::model::stand::StandRecord;
use crate::model::time::Timestamp;
use crate::repo::common::{ensure_schema_ready, is_unique_violation, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const STAND_SELECT_SQL: &str = "SELECT
    name,
    owner,
    acl,
    widgets,
    created_at
FROM stands";

/// Repository interface for stand metadata.
pub trait StandRepository {
    /// Inserts a new stand; fails with `AlreadyExists` on a taken name.
    fn create_stand(&self, stand: &StandRecord) -> RepoResult<()>;
    fn get_stand(&self, name: &str) -> RepoResult<Option<StandRecord>>;
    /// Lists stands of one owner sorted by name.
    fn list_stands(&self, owner: &PrincipalId) -> RepoResult<Vec<StandRecord>>;
    fn update_acl(&self, name: &str, acl: &str) -> RepoResult<()>;
    fn update_widgets(&self, name: &str, widgets: &str) -> RepoResult<()>;
}

/// SQLite-backed stand repository.
pub struct SqliteStandRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStandRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn, &["stands"])?;
        Ok(Self { conn })
    }
}

impl StandRepository for SqliteStandRepository<'_> {
    fn create_stand(&self, stand: &StandRecord) -> RepoResult<()> {
        let inserted = self.conn.execute(
            "INSERT INTO stands (name, owner, acl, widgets, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                stand.name.as_str(),
                stand.owner.as_str(),
                stand.acl.as_str(),
                stand.widgets.as_str(),
                stand.created_at.millis(),
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(RepoError::AlreadyExists(format!("stand `{}`", stand.name)))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get_stand(&self, name: &str) -> RepoResult<Option<StandRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STAND_SELECT_SQL} WHERE name = ?1;"))?;
        let row = stmt
            .query_row([name], |row| Ok(parse_stand_row(row)))
            .optional()?;
        row.transpose()
    }

    fn list_stands(&self, owner: &PrincipalId) -> RepoResult<Vec<StandRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STAND_SELECT_SQL} WHERE owner = ?1 ORDER BY name ASC;"
        ))?;
        let mut rows = stmt.query([owner.as_str()])?;
        let mut stands = Vec::new();
        while let Some(row) = rows.next()? {
            stands.push(parse_stand_row(row)?);
        }
        Ok(stands)
    }

    fn update_acl(&self, name: &str, acl: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE stands SET acl = ?2 WHERE name = ?1;",
            params![name, acl],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("stand `{name}`")));
        }
        Ok(())
    }

    fn update_widgets(&self, name: &str, widgets: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE stands SET widgets = ?2 WHERE name = ?1;",
            params![name, widgets],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("stand `{name}`")));
        }
        Ok(())
    }
}

fn parse_stand_row(row: &Row<'_>) -> RepoResult<StandRecord> {
    let owner_text: String = row.get("owner")?;
    let owner = PrincipalId::parse(&owner_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid owner `{owner_text}` in stands.owner"))
    })?;
    Ok(StandRecord {
        name: row.get("name")?,
        owner,
        acl: row.get("acl")?,
        widgets: row.get("widgets")?,
        created_at: Timestamp::from_millis(row.get("created_at")?),
    })
}
