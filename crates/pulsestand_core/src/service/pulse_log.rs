//! Lock-free append engine for pulse documents.
//!
//! # Responsibility
//! - Merge one sequenced fragment into the stored blob of a pulse.
//! - Re-derive the pulse tag set from the merged document.
//! - Resolve concurrent writers with conditional replace plus bounded retry.
//!
//! # Invariants
//! - No committed fragment is ever lost: every write replaces the exact
//!   version it read, so a concurrent commit forces a re-read.
//! - Malformed fragment text never fails an append; the previous tag set is
//!   kept and a warning is logged.
//! - Conflicts are retried internally; only storage failures and an
//!   exhausted retry budget reach the caller.
//!
//! # See also
//! - `repo::pulse_repo` for the storage primitives.
//! - `model::fragment` for the blob format.

use crate::config::RetryPolicy;
use crate::model::coordinates::Coordinates;
use crate::model::fragment::{decode, encode_line};
use crate::model::pulse::PulseUpdate;
use crate::model::tag::Tag;
use crate::model::time::Timestamp;
use crate::repo::common::RepoError;
use crate::repo::pulse_repo::PulseRepository;
use crate::service::retry::back_off;
use crate::snapshot::{Snapshot, SnapshotError};
use log::{debug, error, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum PulseLogError {
    /// Backing store failed; carries the store diagnostic.
    Storage(RepoError),
    /// Every attempt lost the race to a concurrent writer.
    RetriesExhausted { coordinates: String, attempts: u32 },
}

impl Display for PulseLogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "pulse storage failure: {err}"),
            Self::RetriesExhausted {
                coordinates,
                attempts,
            } => write!(
                f,
                "append to `{coordinates}` gave up after {attempts} conflicting attempts"
            ),
        }
    }
}

impl Error for PulseLogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::RetriesExhausted { .. } => None,
        }
    }
}

impl From<RepoError> for PulseLogError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

/// Append-only fragment log of every pulse in one stand.
pub struct PulseLog<R: PulseRepository> {
    stand: String,
    repo: R,
    retry: RetryPolicy,
}

impl<R: PulseRepository> PulseLog<R> {
    pub fn new(stand: impl Into<String>, repo: R) -> Self {
        Self::with_retry(stand, repo, RetryPolicy::default())
    }

    pub fn with_retry(stand: impl Into<String>, repo: R, retry: RetryPolicy) -> Self {
        Self {
            stand: stand.into(),
            repo,
            retry: retry.normalized(),
        }
    }

    pub fn stand(&self) -> &str {
        &self.stand
    }

    pub(crate) fn repo(&self) -> &R {
        &self.repo
    }

    /// Adds one fragment to the pulse at `coordinates`, creating the pulse on
    /// first use.
    pub fn append(
        &self,
        coordinates: &Coordinates,
        sequence: i64,
        text: &str,
    ) -> Result<(), PulseLogError> {
        let line = encode_line(sequence, text);
        let key = coordinates.to_string();

        for attempt in 1..=self.retry.max_attempts {
            let snapshot = self.repo.find_or_create(&self.stand, coordinates).map_err(|err| {
                self.log_storage_failure(&key, "find_or_create", &err);
                PulseLogError::from(err)
            })?;

            let mut after = snapshot.xembly.clone();
            after.push_str(&line);
            let tags = match derive_tags(&after) {
                Ok(tags) => tags,
                Err(err) => {
                    warn!(
                        "event=tag_derive module=pulse_log status=degraded stand={} coordinates={} sequence={} error={}",
                        self.stand, key, sequence, err
                    );
                    snapshot.tags.clone()
                }
            };

            let update = PulseUpdate {
                xembly: after,
                tags,
                updated: Timestamp::now_monotonic(),
            };
            let changed = self
                .repo
                .replace_if_current(&snapshot, &update)
                .map_err(|err| {
                    self.log_storage_failure(&key, "replace_if_current", &err);
                    PulseLogError::from(err)
                })?;
            if changed > 0 {
                debug!(
                    "event=pulse_append module=pulse_log status=ok stand={} coordinates={} sequence={} attempts={}",
                    self.stand, key, sequence, attempt
                );
                return Ok(());
            }

            debug!(
                "event=pulse_append module=pulse_log status=conflict stand={} coordinates={} attempt={} version={}",
                self.stand, key, attempt, snapshot.version
            );
            if attempt < self.retry.max_attempts {
                back_off(&self.retry, attempt);
            }
        }

        error!(
            "event=pulse_append module=pulse_log status=error error_code=retries_exhausted stand={} coordinates={} attempts={}",
            self.stand, key, self.retry.max_attempts
        );
        Err(PulseLogError::RetriesExhausted {
            coordinates: key,
            attempts: self.retry.max_attempts,
        })
    }

    /// Last derived tag set of a pulse; empty for a pulse never written.
    pub fn tags(&self, coordinates: &Coordinates) -> Result<BTreeSet<Tag>, PulseLogError> {
        Ok(self
            .repo
            .get_pulse(&self.stand, coordinates)?
            .map(|snapshot| snapshot.tags)
            .unwrap_or_default())
    }

    /// Decoded document of a pulse; empty for a pulse never written.
    pub fn document(&self, coordinates: &Coordinates) -> Result<String, PulseLogError> {
        Ok(self
            .repo
            .get_pulse(&self.stand, coordinates)?
            .map(|snapshot| snapshot.document())
            .unwrap_or_default())
    }

    fn log_storage_failure(&self, key: &str, step: &str, err: &RepoError) {
        error!(
            "event=pulse_append module=pulse_log status=error error_code=storage step={} stand={} coordinates={} error={}",
            step, self.stand, key, err
        );
    }
}

/// Tags of the document encoded by `blob`.
pub fn derive_tags(blob: &str) -> Result<BTreeSet<Tag>, SnapshotError> {
    Snapshot::parse(&decode(blob)).map(|snapshot| snapshot.tags())
}

#[cfg(test)]
mod tests {
    use super::{derive_tags, PulseLog, PulseLogError};
    use crate::config::RetryPolicy;
    use crate::model::coordinates::{Coordinates, PrincipalId};
    use crate::model::fragment::encode_line;
    use crate::model::pulse::{PulseSnapshot, PulseUpdate};
    use crate::model::tag::Level;
    use crate::model::time::Timestamp;
    use crate::repo::common::RepoResult;
    use crate::repo::pulse_repo::{PulseListQuery, PulseRepository};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeSet;

    /// Repository whose every read sees a newer version and whose first
    /// `losses` conditional replaces find that version already gone.
    struct RacingRepo {
        losses: Cell<u32>,
        reads: Cell<i64>,
        replaced_versions: RefCell<Vec<i64>>,
    }

    impl RacingRepo {
        fn losing(losses: u32) -> Self {
            Self {
                losses: Cell::new(losses),
                reads: Cell::new(0),
                replaced_versions: RefCell::new(Vec::new()),
            }
        }
    }

    impl PulseRepository for RacingRepo {
        fn find_or_create(
            &self,
            stand: &str,
            coordinates: &Coordinates,
        ) -> RepoResult<PulseSnapshot> {
            self.reads.set(self.reads.get() + 1);
            Ok(PulseSnapshot {
                stand: stand.to_string(),
                coordinates: coordinates.clone(),
                version: self.reads.get(),
                xembly: String::new(),
                tags: BTreeSet::new(),
                updated: None,
            })
        }

        fn replace_if_current(
            &self,
            snapshot: &PulseSnapshot,
            _update: &PulseUpdate,
        ) -> RepoResult<usize> {
            self.replaced_versions.borrow_mut().push(snapshot.version);
            if self.losses.get() == 0 {
                return Ok(1);
            }
            self.losses.set(self.losses.get() - 1);
            Ok(0)
        }

        fn get_pulse(
            &self,
            _stand: &str,
            _coordinates: &Coordinates,
        ) -> RepoResult<Option<PulseSnapshot>> {
            Ok(None)
        }

        fn list_pulses(
            &self,
            _stand: &str,
            _query: &PulseListQuery,
        ) -> RepoResult<Vec<PulseSnapshot>> {
            Ok(Vec::new())
        }
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    fn key() -> Coordinates {
        Coordinates::new(
            Timestamp::from_millis(1_000),
            PrincipalId::parse("urn:github:1").unwrap(),
            "merge",
        )
        .unwrap()
    }

    #[test]
    fn lost_replace_rereads_and_retries() {
        let log = PulseLog::with_retry("main", RacingRepo::losing(2), no_wait(5));

        log.append(&key(), 1, "<a/>").unwrap();

        assert_eq!(log.repo().reads.get(), 3);
        assert_eq!(*log.repo().replaced_versions.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn endless_conflicts_exhaust_the_budget() {
        let log = PulseLog::with_retry("main", RacingRepo::losing(u32::MAX), no_wait(3));

        let err = log.append(&key(), 1, "<a/>").unwrap_err();

        assert!(matches!(
            err,
            PulseLogError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(log.repo().reads.get(), 3);
    }

    #[test]
    fn derives_tags_across_fragments() {
        let blob = format!(
            "{}{}",
            encode_line(2, "ADD 'label'; SET 'deploy'; UP; ADD 'level'; SET 'INFO';"),
            encode_line(1, "ADD 'tags'; ADD 'tag';"),
        );
        let tags = derive_tags(&blob).unwrap();
        assert_eq!(tags.len(), 1);
        let tag = tags.iter().next().unwrap();
        assert_eq!(tag.label, "deploy");
        assert_eq!(tag.level, Level::Info);
    }

    #[test]
    fn broken_script_is_an_error() {
        assert!(derive_tags(&encode_line(1, "ADD 'tags'")).is_err());
    }
}
