//! Pulse identity and ordering key.
//!
//! # Responsibility
//! - Identify one scheduled execution (pulse) by time, owner and rule.
//! - Provide the text form used in storage keys, URLs and query parameters.
//!
//! # Invariants
//! - `rule` matches `[a-z0-9-]+`.
//! - `owner` is a URN without whitespace (`urn:<nid>:<nss>`).
//! - `Coordinates::parse(&c.to_string()) == Ok(c)` for every valid value.
//! - Ordering is by `scheduled` first; rule and owner only break ties so that
//!   `Ord` stays consistent with `Eq`.

use crate::model::time::Timestamp;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static RULE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid rule regex"));
static URN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^urn:[a-z]{1,31}:\S+$").expect("valid urn regex"));

/// Malformed coordinates text or component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatesError {
    /// Text did not split into exactly three whitespace-separated tokens.
    TokenCount(String),
    InvalidTime(String),
    InvalidRule(String),
    InvalidOwner(String),
}

impl Display for CoordinatesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenCount(text) => write!(f, "invalid coordinates `{text}`"),
            Self::InvalidTime(value) => write!(f, "invalid scheduled time `{value}`"),
            Self::InvalidRule(value) => {
                write!(f, "invalid rule name `{value}`; expected [a-z0-9-]+")
            }
            Self::InvalidOwner(value) => write!(f, "invalid owner URN `{value}`"),
        }
    }
}

impl Error for CoordinatesError {}

/// URN of the principal owning a pulse, stand or timeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn parse(value: &str) -> Result<Self, CoordinatesError> {
        if URN_RE.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(CoordinatesError::InvalidOwner(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PrincipalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = CoordinatesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PrincipalId> for String {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

/// Immutable identity of one pulse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinates {
    scheduled: Timestamp,
    owner: PrincipalId,
    rule: String,
}

impl Coordinates {
    pub fn new(
        scheduled: Timestamp,
        owner: PrincipalId,
        rule: impl Into<String>,
    ) -> Result<Self, CoordinatesError> {
        let rule = rule.into();
        if !RULE_RE.is_match(&rule) {
            return Err(CoordinatesError::InvalidRule(rule));
        }
        Ok(Self {
            scheduled,
            owner,
            rule,
        })
    }

    /// Parses the `"<time> <rule> <owner>"` text form.
    pub fn parse(text: &str) -> Result<Self, CoordinatesError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let [time, rule, owner] = tokens.as_slice() else {
            return Err(CoordinatesError::TokenCount(text.to_string()));
        };
        let scheduled = time
            .parse::<Timestamp>()
            .map_err(|_| CoordinatesError::InvalidTime((*time).to_string()))?;
        Self::new(scheduled, PrincipalId::parse(owner)?, *rule)
    }

    pub fn scheduled(&self) -> Timestamp {
        self.scheduled
    }

    pub fn owner(&self) -> &PrincipalId {
        &self.owner
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }
}

impl Display for Coordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.scheduled, self.rule, self.owner)
    }
}

impl FromStr for Coordinates {
    type Err = CoordinatesError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl TryFrom<String> for Coordinates {
    type Error = CoordinatesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Coordinates> for String {
    fn from(value: Coordinates) -> Self {
        value.to_string()
    }
}

impl Ord for Coordinates {
    fn cmp(&self, other: &Self) -> Ordering {
        self.scheduled
            .cmp(&other.scheduled)
            .then_with(|| self.rule.cmp(&other.rule))
            .then_with(|| self.owner.cmp(&other.owner))
    }
}

impl PartialOrd for Coordinates {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Either a concrete pulse or "no pulse yet".
///
/// `Top` sorts above every concrete coordinate, so it is the natural starting
/// point when paging pulses newest-first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Position {
    #[default]
    Top,
    At(Coordinates),
}

impl Position {
    pub fn coordinates(&self) -> Option<&Coordinates> {
        match self {
            Self::Top => None,
            Self::At(coordinates) => Some(coordinates),
        }
    }
}

impl From<Coordinates> for Position {
    fn from(value: Coordinates) -> Self {
        Self::At(value)
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Top, Self::Top) => Ordering::Equal,
            (Self::Top, Self::At(_)) => Ordering::Greater,
            (Self::At(_), Self::Top) => Ordering::Less,
            (Self::At(left), Self::At(right)) => left.cmp(right),
        }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
