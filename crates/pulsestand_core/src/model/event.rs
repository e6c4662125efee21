//! Timeline and event domain model.
//!
//! # Responsibility
//! - Define the immutable event record appended to a named timeline.
//! - Validate user-supplied tags/products before anything is written.
//!
//! # Invariants
//! - Tag labels match `[a-z-]{2,40}`; product names are at most 100 chars.
//! - Validation is all-or-nothing: one bad item rejects the whole post.
//! - `time` is assigned by the store, never by the caller.

use crate::model::coordinates::PrincipalId;
use crate::model::tag::{Product, Tag, PRODUCT_NAME_MAX_CHARS};
use crate::model::time::Timestamp;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static TIMELINE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]{2,40}$").expect("valid timeline name regex"));

/// Stable identifier of one posted event.
pub type EventId = Uuid;

/// Named append-only feed owned by a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    pub name: String,
    pub owner: PrincipalId,
    pub created_at: Timestamp,
}

/// Immutable timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timeline: String,
    pub text: String,
    pub time: Timestamp,
    pub tags: BTreeSet<Tag>,
    pub products: BTreeSet<Product>,
}

/// Rejected post input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineValidationError {
    InvalidTimelineName(String),
    InvalidTagLabel(String),
    ProductNameTooLong { name: String, chars: usize },
}

impl Display for TimelineValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTimelineName(name) => {
                write!(f, "timeline name `{name}` doesn't match [a-z0-9-]{{2,40}}")
            }
            Self::InvalidTagLabel(label) => {
                write!(f, "tag label `{label}` doesn't match [a-z-]{{2,40}}")
            }
            Self::ProductNameTooLong { name, chars } => write!(
                f,
                "product name `{name}` is too long ({chars} chars), should be at most {PRODUCT_NAME_MAX_CHARS}"
            ),
        }
    }
}

impl Error for TimelineValidationError {}

pub fn validate_timeline_name(name: &str) -> Result<(), TimelineValidationError> {
    if TIMELINE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(TimelineValidationError::InvalidTimelineName(
            name.to_string(),
        ))
    }
}

/// Checks every tag and product of one post before any write happens.
pub fn validate_post(
    tags: &BTreeSet<Tag>,
    products: &BTreeSet<Product>,
) -> Result<(), TimelineValidationError> {
    if let Some(tag) = tags.iter().find(|tag| !tag.has_valid_label()) {
        return Err(TimelineValidationError::InvalidTagLabel(tag.label.clone()));
    }
    if let Some(product) = products.iter().find(|product| !product.has_valid_name()) {
        return Err(TimelineValidationError::ProductNameTooLong {
            name: product.name.clone(),
            chars: product.name.chars().count(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_post, validate_timeline_name, TimelineValidationError};
    use crate::model::tag::{Level, Product, Tag};
    use std::collections::BTreeSet;

    #[test]
    fn rejects_uppercase_tag_label() {
        let tags = BTreeSet::from([Tag::new("ok-tag", Level::Info), Tag::new("AB", Level::Info)]);
        let err = validate_post(&tags, &BTreeSet::new()).unwrap_err();
        assert_eq!(err, TimelineValidationError::InvalidTagLabel("AB".to_string()));
    }

    #[test]
    fn rejects_long_product_name() {
        let products = BTreeSet::from([Product::new("p".repeat(101), "")]);
        let err = validate_post(&BTreeSet::new(), &products).unwrap_err();
        assert!(matches!(
            err,
            TimelineValidationError::ProductNameTooLong { chars: 101, .. }
        ));
    }

    #[test]
    fn accepts_boundary_values() {
        let tags = BTreeSet::from([Tag::new("x".repeat(40), Level::Fine)]);
        let products = BTreeSet::from([Product::new("p".repeat(100), "done")]);
        assert!(validate_post(&tags, &products).is_ok());
    }

    #[test]
    fn timeline_names_are_slugs() {
        assert!(validate_timeline_name("releases").is_ok());
        assert!(validate_timeline_name("Releases").is_err());
    }
}
