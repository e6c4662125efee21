//! Core domain logic for pulsestand.
//!
//! Two independent stores live here: the per-stand pulse log, which merges
//! concurrently appended status fragments without locks, and the timeline
//! event store. Both sit on the same migrated SQLite connection.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod snapshot;

pub use config::{ConfigError, CoreConfig, RetryPolicy};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::coordinates::{Coordinates, CoordinatesError, Position, PrincipalId};
pub use model::event::{Event, EventId, Timeline, TimelineValidationError};
pub use model::fragment::{decode, next_sequence, Fragment, FragmentLog};
pub use model::pulse::PulseSnapshot;
pub use model::tag::{Level, Product, Tag};
pub use model::time::Timestamp;
pub use repo::common::{RepoError, RepoResult};
pub use repo::pulse_repo::{PulseListQuery, PulseRepository, SqlitePulseRepository};
pub use repo::stand_repo::{SqliteStandRepository, StandRepository};
pub use repo::timeline_repo::{SqliteTimelineRepository, TimelineRepository};
pub use service::pulse_log::{PulseLog, PulseLogError};
pub use service::stand::{Stand, StandError, Stands};
pub use service::timeline::{Events, TimelineError, TimelineStore, Timelines};
pub use snapshot::{Snapshot, SnapshotError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
