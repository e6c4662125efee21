//! Pulse records as persisted per stand.
//!
//! # Invariants
//! - A record is keyed by `(stand, coordinates)` and is never deleted.
//! - `version` grows by one on every committed append; it is the identity
//!   used for conditional replacement.
//! - `tags` is derived from the decoded document and never written directly.

use crate::model::coordinates::Coordinates;
use crate::model::fragment::{decode, FragmentLog};
use crate::model::tag::Tag;
use crate::model::time::Timestamp;
use std::collections::BTreeSet;

/// Full stored state of one pulse at a given version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseSnapshot {
    pub stand: String,
    pub coordinates: Coordinates,
    /// Store-level version; conditional replace succeeds only against it.
    pub version: i64,
    /// Sequence-prefixed, newline-delimited fragment blob.
    pub xembly: String,
    pub tags: BTreeSet<Tag>,
    /// `None` until the first append commits.
    pub updated: Option<Timestamp>,
}

impl PulseSnapshot {
    pub fn fragments(&self) -> FragmentLog {
        FragmentLog::parse(&self.xembly)
    }

    /// Canonical document, fragments in ascending sequence order.
    pub fn document(&self) -> String {
        decode(&self.xembly)
    }
}

/// Replacement values written by one successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseUpdate {
    pub xembly: String,
    pub tags: BTreeSet<Tag>,
    pub updated: Timestamp,
}
