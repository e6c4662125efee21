//! Stand metadata.
//!
//! A stand is a named dashboard collecting pulses for one principal. Besides
//! its pulses it only carries pass-through specs for the presentation layer.

use crate::model::coordinates::PrincipalId;
use crate::model::time::Timestamp;
use once_cell::sync::Lazy;
use regex::Regex;

static STAND_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]{2,40}$").expect("valid stand name regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandRecord {
    pub name: String,
    pub owner: PrincipalId,
    /// Access-control spec text, stored verbatim.
    pub acl: String,
    /// Widget spec text, stored verbatim.
    pub widgets: String,
    pub created_at: Timestamp,
}

pub fn is_valid_stand_name(name: &str) -> bool {
    STAND_NAME_RE.is_match(name)
}
