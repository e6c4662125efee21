//! Timeline registry and append-only event store.
//!
//! # Responsibility
//! - Create, look up and list named timelines.
//! - Validate and post immutable events with store-assigned times.
//! - Iterate events lazily, newest first, bounded above by a time.
//! - Aggregate the latest product per name.
//!
//! # Invariants
//! - A post with any invalid tag label or product name writes nothing.
//! - Event times never go backwards within one process.
//! - `events(up_to)` yields each matching event exactly once, ordered
//!   `time DESC`; ties come out newest insert first.

use crate::config::CoreConfig;
use crate::model::coordinates::PrincipalId;
use crate::model::event::{
    validate_post, validate_timeline_name, Event, Timeline, TimelineValidationError,
};
use crate::model::tag::{Product, Tag};
use crate::model::time::Timestamp;
use crate::repo::common::RepoError;
use crate::repo::timeline_repo::{EventBound, EventRow, TimelineRepository};
use log::{error, info};
use std::collections::{BTreeSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum TimelineError {
    Validation(TimelineValidationError),
    TimelineNotFound(String),
    AlreadyExists(String),
    /// Backing store failed or did not acknowledge a write.
    Storage(RepoError),
}

impl Display for TimelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::TimelineNotFound(name) => write!(f, "timeline `{name}` not found"),
            Self::AlreadyExists(name) => write!(f, "timeline `{name}` already exists"),
            Self::Storage(err) => write!(f, "timeline storage failure: {err}"),
        }
    }
}

impl Error for TimelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TimelineValidationError> for TimelineError {
    fn from(value: TimelineValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for TimelineError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(what) => Self::TimelineNotFound(what),
            RepoError::AlreadyExists(what) => Self::AlreadyExists(what),
            other => Self::Storage(other),
        }
    }
}

/// Registry of named timelines.
pub struct Timelines<R: TimelineRepository> {
    repo: R,
    page_size: u32,
}

impl<R: TimelineRepository> Timelines<R> {
    pub fn new(repo: R) -> Self {
        Self::with_config(repo, &CoreConfig::default())
    }

    pub fn with_config(repo: R, config: &CoreConfig) -> Self {
        Self {
            repo,
            page_size: config.events_page_size.max(1),
        }
    }

    pub fn create(&self, owner: &PrincipalId, name: &str) -> Result<Timeline, TimelineError> {
        validate_timeline_name(name)?;
        let timeline = Timeline {
            name: name.to_string(),
            owner: owner.clone(),
            created_at: Timestamp::now(),
        };
        self.repo.create_timeline(&timeline).map_err(|err| match err {
            RepoError::AlreadyExists(_) => TimelineError::AlreadyExists(name.to_string()),
            other => TimelineError::from(other),
        })?;
        info!(
            "event=timeline_create module=timeline status=ok timeline={} owner={}",
            timeline.name, timeline.owner
        );
        Ok(timeline)
    }

    /// Opens the store of an existing timeline.
    pub fn get(&self, name: &str) -> Result<TimelineStore<'_, R>, TimelineError> {
        let timeline = self
            .repo
            .get_timeline(name)?
            .ok_or_else(|| TimelineError::TimelineNotFound(name.to_string()))?;
        Ok(TimelineStore {
            repo: &self.repo,
            timeline,
            page_size: self.page_size,
        })
    }

    /// Timelines owned by `owner`, sorted by name.
    pub fn find(&self, owner: &PrincipalId) -> Result<Vec<Timeline>, TimelineError> {
        Ok(self.repo.list_timelines(owner)?)
    }
}

/// Event store of one timeline.
pub struct TimelineStore<'a, R: TimelineRepository> {
    repo: &'a R,
    timeline: Timeline,
    page_size: u32,
}

impl<'a, R: TimelineRepository> TimelineStore<'a, R> {
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Validates and appends one event; nothing is written on rejection.
    pub fn post(
        &self,
        text: impl Into<String>,
        tags: BTreeSet<Tag>,
        products: BTreeSet<Product>,
    ) -> Result<Event, TimelineError> {
        validate_post(&tags, &products)?;
        let event = Event {
            id: Uuid::new_v4(),
            timeline: self.timeline.name.clone(),
            text: text.into(),
            time: Timestamp::now_monotonic(),
            tags,
            products,
        };
        match self.repo.insert_event(&event) {
            Ok(seq) => {
                info!(
                    "event=timeline_post module=timeline status=ok timeline={} seq={} tags={} products={}",
                    event.timeline,
                    seq,
                    event.tags.len(),
                    event.products.len()
                );
                Ok(event)
            }
            Err(err) => {
                error!(
                    "event=timeline_post module=timeline status=error timeline={} error={}",
                    event.timeline, err
                );
                Err(err.into())
            }
        }
    }

    /// Lazy cursor over events with `time <= up_to`, newest first.
    ///
    /// Each call starts a fresh cursor; pages are fetched on demand.
    pub fn events(&self, up_to: Timestamp) -> Events<'a, R> {
        Events {
            repo: self.repo,
            timeline: self.timeline.name.clone(),
            page_size: self.page_size,
            buffer: VecDeque::new(),
            next_bound: Some(EventBound::AtOrBefore(up_to)),
        }
    }

    /// Latest value per distinct product name, sorted by name.
    pub fn products(&self) -> Result<Vec<Product>, TimelineError> {
        Ok(self.repo.latest_products(&self.timeline.name)?)
    }

    pub fn count(&self) -> Result<u64, TimelineError> {
        Ok(self.repo.count_events(&self.timeline.name)?)
    }
}

/// Keyset-paged event iterator.
///
/// Finite: it ends after the last page, or right after yielding an error.
pub struct Events<'a, R: TimelineRepository> {
    repo: &'a R,
    timeline: String,
    page_size: u32,
    buffer: VecDeque<EventRow>,
    next_bound: Option<EventBound>,
}

impl<R: TimelineRepository> Events<'_, R> {
    fn fetch_page(&mut self, bound: EventBound) -> Result<(), TimelineError> {
        let page = self.repo.events_page(&self.timeline, &bound, self.page_size)?;
        self.next_bound = match page.last() {
            Some(last) if page.len() >= self.page_size as usize => Some(EventBound::Before {
                time: last.event.time,
                seq: last.seq,
            }),
            _ => None,
        };
        self.buffer.extend(page);
        Ok(())
    }
}

impl<R: TimelineRepository> Iterator for Events<'_, R> {
    type Item = Result<Event, TimelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            let bound = self.next_bound.take()?;
            if let Err(err) = self.fetch_page(bound) {
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(|row| Ok(row.event))
    }
}
