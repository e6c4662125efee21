//! Millisecond timestamps shared by pulses and timeline events.
//!
//! # Responsibility
//! - Represent instants as epoch milliseconds (the storage unit).
//! - Print and parse the ISO-8601 text form embedded in `Coordinates`.
//!
//! # Invariants
//! - Text form is UTC with millisecond precision, so print/parse round trips.
//! - `Timestamp::now_monotonic()` never goes backwards within one process.

use chrono::{DateTime, Datelike, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Instant in Unix epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Current wall-clock time, clamped so that no earlier value is ever
    /// returned after a later one in this process.
    pub fn now_monotonic() -> Self {
        let wall = Utc::now().timestamp_millis();
        let previous = LAST_ISSUED_MS.fetch_max(wall, Ordering::SeqCst);
        Self(previous.max(wall))
    }

    /// Instant as a calendar date, only when RFC 3339 can express it.
    fn as_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .filter(|datetime| (0..=9999).contains(&datetime.year()))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.as_datetime() {
            Some(datetime) => f.write_str(&datetime.to_rfc3339_opts(SecondsFormat::Millis, true)),
            // Years outside 0000..=9999 print as raw millis, which FromStr accepts too.
            None => write!(f, "{}", self.0),
        }
    }
}

/// Text could not be read as an ISO-8601 instant or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampParseError(pub String);

impl Display for TimestampParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid timestamp `{}`", self.0)
    }
}

impl Error for TimestampParseError {}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(datetime.with_timezone(&Utc).timestamp_millis()));
        }
        trimmed
            .parse::<i64>()
            .map(Self)
            .map_err(|_| TimestampParseError(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn prints_and_parses() {
        let now = Timestamp::now();
        let parsed: Timestamp = now.to_string().parse().unwrap();
        assert_eq!(parsed, now);
        assert_eq!(parsed.to_string(), now.to_string());
    }

    #[test]
    fn parses_iso_format_without_fraction() {
        let parsed: Timestamp = "2013-07-21T12:15:00Z".parse().unwrap();
        assert_eq!(parsed.millis(), 1_374_408_900_000);
        assert_eq!(parsed.to_string(), "2013-07-21T12:15:00.000Z");
    }

    #[test]
    fn round_trips_at_rfc3339_year_limits() {
        for millis in [
            253_402_300_799_999,
            253_402_300_800_000,
            -62_167_219_200_000,
            -62_167_219_200_001,
            i64::MIN,
            i64::MAX,
        ] {
            let timestamp = Timestamp::from_millis(millis);
            let parsed: Timestamp = timestamp.to_string().parse().unwrap();
            assert_eq!(parsed, timestamp);
        }
        assert_eq!(
            Timestamp::from_millis(253_402_300_799_999).to_string(),
            "9999-12-31T23:59:59.999Z"
        );
        assert_eq!(
            Timestamp::from_millis(253_402_300_800_000).to_string(),
            "253402300800000"
        );
        assert_eq!(
            Timestamp::from_millis(-62_167_219_200_001).to_string(),
            "-62167219200001"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!("yesterday".parse::<Timestamp>().is_err());
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let mut previous = Timestamp::now_monotonic();
        for _ in 0..1_000 {
            let next = Timestamp::now_monotonic();
            assert!(next >= previous);
            previous = next;
        }
    }
}
