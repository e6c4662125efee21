//! Tags and products: the labelled markers attached to pulses and events.
//!
//! # Invariants
//! - A valid tag label matches `[a-z-]{2,40}`.
//! - A valid product name is at most 100 characters long.
//! - `data` defaults to `{}` and `markdown` to the empty string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static TAG_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z-]{2,40}$").expect("valid tag label regex"));

pub const PRODUCT_NAME_MAX_CHARS: usize = 100;
pub const DEFAULT_TAG_DATA: &str = "{}";

/// Tag severity, using the java-logging level vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Severe,
    Warning,
    Info,
    Config,
    Fine,
    Finer,
    Finest,
}

impl Level {
    /// Parses a level name (case-insensitive) or its numeric value.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "SEVERE" => Some(Self::Severe),
            "WARNING" => Some(Self::Warning),
            "INFO" => Some(Self::Info),
            "CONFIG" => Some(Self::Config),
            "FINE" => Some(Self::Fine),
            "FINER" => Some(Self::Finer),
            "FINEST" => Some(Self::Finest),
            _ => match trimmed.parse::<i32>().ok()? {
                1000 => Some(Self::Severe),
                900 => Some(Self::Warning),
                800 => Some(Self::Info),
                700 => Some(Self::Config),
                500 => Some(Self::Fine),
                400 => Some(Self::Finer),
                300 => Some(Self::Finest),
                _ => None,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Severe => "SEVERE",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Config => "CONFIG",
            Self::Fine => "FINE",
            Self::Finer => "FINER",
            Self::Finest => "FINEST",
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labelled marker with a severity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub level: Level,
    /// JSON payload kept verbatim.
    #[serde(default = "default_tag_data")]
    pub data: String,
    #[serde(default)]
    pub markdown: String,
}

impl Tag {
    pub fn new(label: impl Into<String>, level: Level) -> Self {
        Self {
            label: label.into(),
            level,
            data: default_tag_data(),
            markdown: String::new(),
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_markdown(mut self, markdown: impl Into<String>) -> Self {
        self.markdown = markdown.into();
        self
    }

    pub fn has_valid_label(&self) -> bool {
        is_valid_tag_label(&self.label)
    }
}

/// Named artifact attached to a timeline event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default)]
    pub markdown: String,
}

impl Product {
    pub fn new(name: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markdown: markdown.into(),
        }
    }

    pub fn has_valid_name(&self) -> bool {
        self.name.chars().count() <= PRODUCT_NAME_MAX_CHARS
    }
}

pub fn is_valid_tag_label(label: &str) -> bool {
    TAG_LABEL_RE.is_match(label)
}

fn default_tag_data() -> String {
    DEFAULT_TAG_DATA.to_string()
}
