//! Stand registry and per-stand facade.
//!
//! # Responsibility
//! - Create, look up and list stands per owner.
//! - Route pulse posts of one stand into its `PulseLog`.
//! - Serve newest-first pulse listings, optionally filtered by tag label.
//!
//! # Invariants
//! - Stand names match `[a-z0-9-]{2,40}` and are unique.
//! - ACL and widget specs are pass-through text; this layer never reads them.

use crate::config::RetryPolicy;
use crate::model::coordinates::{Coordinates, PrincipalId};
use crate::model::pulse::PulseSnapshot;
use crate::model::stand::{is_valid_stand_name, StandRecord};
use crate::model::time::Timestamp;
use crate::repo::common::RepoError;
use crate::repo::pulse_repo::{PulseListQuery, PulseRepository};
use crate::repo::stand_repo::StandRepository;
use crate::service::pulse_log::{PulseLog, PulseLogError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_ACL: &str = "";
const DEFAULT_WIDGETS: &str = "";

#[derive(Debug)]
pub enum StandError {
    InvalidName(String),
    NotFound(String),
    AlreadyExists(String),
    Append(PulseLogError),
    Repo(RepoError),
}

impl Display for StandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => {
                write!(f, "stand name `{name}` doesn't match [a-z0-9-]{{2,40}}")
            }
            Self::NotFound(name) => write!(f, "stand `{name}` not found"),
            Self::AlreadyExists(name) => write!(f, "stand `{name}` already exists"),
            Self::Append(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Append(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for StandError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(what) => Self::NotFound(what),
            RepoError::AlreadyExists(what) => Self::AlreadyExists(what),
            other => Self::Repo(other),
        }
    }
}

impl From<PulseLogError> for StandError {
    fn from(value: PulseLogError) -> Self {
        Self::Append(value)
    }
}

/// Registry of all stands.
pub struct Stands<S: StandRepository> {
    repo: S,
}

impl<S: StandRepository> Stands<S> {
    pub fn new(repo: S) -> Self {
        Self { repo }
    }

    pub fn create(&self, owner: &PrincipalId, name: &str) -> Result<StandRecord, StandError> {
        if !is_valid_stand_name(name) {
            return Err(StandError::InvalidName(name.to_string()));
        }
        let record = StandRecord {
            name: name.to_string(),
            owner: owner.clone(),
            acl: DEFAULT_ACL.to_string(),
            widgets: DEFAULT_WIDGETS.to_string(),
            created_at: Timestamp::now(),
        };
        self.repo.create_stand(&record).map_err(|err| match err {
            RepoError::AlreadyExists(_) => StandError::AlreadyExists(name.to_string()),
            other => StandError::from(other),
        })?;
        info!(
            "event=stand_create module=stand status=ok stand={} owner={}",
            record.name, record.owner
        );
        Ok(record)
    }

    pub fn get(&self, name: &str) -> Result<Option<StandRecord>, StandError> {
        Ok(self.repo.get_stand(name)?)
    }

    /// Stands owned by `owner`, sorted by name.
    pub fn find(&self, owner: &PrincipalId) -> Result<Vec<StandRecord>, StandError> {
        Ok(self.repo.list_stands(owner)?)
    }
}

/// One stand together with its pulse log.
pub struct Stand<S: StandRepository, P: PulseRepository> {
    record: StandRecord,
    stands: S,
    log: PulseLog<P>,
}

impl<S: StandRepository, P: PulseRepository> Stand<S, P> {
    /// Loads an existing stand; fails with `NotFound` otherwise.
    pub fn open(stands: S, pulses: P, name: &str, retry: RetryPolicy) -> Result<Self, StandError> {
        let record = stands
            .get_stand(name)?
            .ok_or_else(|| StandError::NotFound(name.to_string()))?;
        let log = PulseLog::with_retry(record.name.clone(), pulses, retry);
        Ok(Self {
            record,
            stands,
            log,
        })
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn owner(&self) -> &PrincipalId {
        &self.record.owner
    }

    pub fn acl(&self) -> &str {
        &self.record.acl
    }

    pub fn set_acl(&mut self, acl: impl Into<String>) -> Result<(), StandError> {
        let acl = acl.into();
        self.stands.update_acl(&self.record.name, &acl)?;
        self.record.acl = acl;
        Ok(())
    }

    pub fn widgets(&self) -> &str {
        &self.record.widgets
    }

    pub fn set_widgets(&mut self, widgets: impl Into<String>) -> Result<(), StandError> {
        let widgets = widgets.into();
        self.stands.update_widgets(&self.record.name, &widgets)?;
        self.record.widgets = widgets;
        Ok(())
    }

    /// Appends one directive fragment to the pulse at `coordinates`.
    pub fn post(
        &self,
        coordinates: &Coordinates,
        sequence: i64,
        xembly: &str,
    ) -> Result<(), StandError> {
        Ok(self.log.append(coordinates, sequence, xembly)?)
    }

    pub fn pulses(&self, query: &PulseListQuery) -> Result<Vec<PulseSnapshot>, StandError> {
        Ok(self.log.repo().list_pulses(&self.record.name, query)?)
    }

    pub fn pulse(&self, coordinates: &Coordinates) -> Result<Option<PulseSnapshot>, StandError> {
        Ok(self.log.repo().get_pulse(&self.record.name, coordinates)?)
    }

    pub fn log(&self) -> &PulseLog<P> {
        &self.log
    }
}
