//! Sequenced fragments of a pulse document.
//!
//! # Responsibility
//! - Encode fragments into the newline-delimited blob persisted per pulse.
//! - Parse that blob back tolerantly and rebuild the logical document.
//! - Hand out per-process unique, increasing sequence numbers to writers.
//!
//! # Invariants
//! - One fragment per blob line: `<sequence> <escaped text>`.
//! - Newlines and backslashes inside fragment text are escaped, so a
//!   multi-line fragment never spans blob lines.
//! - Logical order is ascending sequence; equal sequences keep arrival order.
//! - Lines that cannot be read (partial writes) are skipped, never fatal.

use chrono::Utc;
use log::warn;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_SEQUENCE: AtomicI64 = AtomicI64::new(0);

/// One timestamped piece of a pulse's status document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub sequence: i64,
    pub text: String,
}

/// Ordered collection of fragments, in physical arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentLog {
    fragments: Vec<Fragment>,
}

impl FragmentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a persisted blob, skipping unreadable lines.
    pub fn parse(blob: &str) -> Self {
        let mut fragments = Vec::new();
        for line in blob.split('\n').filter(|line| !line.is_empty()) {
            let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
            match head.parse::<i64>() {
                Ok(sequence) => fragments.push(Fragment {
                    sequence,
                    text: unescape(rest),
                }),
                Err(_) => warn!(
                    "event=fragment_skip module=model status=degraded reason=bad_sequence line_chars={}",
                    line.chars().count()
                ),
            }
        }
        Self { fragments }
    }

    pub fn push(&mut self, sequence: i64, text: impl Into<String>) {
        self.fragments.push(Fragment {
            sequence,
            text: text.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragments in physical arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter()
    }

    /// Fragments in logical order: ascending sequence, stable for ties.
    pub fn ordered(&self) -> Vec<&Fragment> {
        let mut ordered: Vec<&Fragment> = self.fragments.iter().collect();
        ordered.sort_by_key(|fragment| fragment.sequence);
        ordered
    }

    /// Canonical document: fragment texts in logical order, one per line.
    pub fn document(&self) -> String {
        self.ordered()
            .into_iter()
            .map(|fragment| fragment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Persisted blob form.
    pub fn encode(&self) -> String {
        self.fragments
            .iter()
            .map(|fragment| encode_line(fragment.sequence, &fragment.text))
            .collect()
    }
}

/// Rebuilds the canonical document from a persisted blob.
pub fn decode(blob: &str) -> String {
    FragmentLog::parse(blob).document()
}

/// Encodes one fragment as a blob line, including the trailing newline.
pub fn encode_line(sequence: i64, text: &str) -> String {
    format!("{sequence} {}\n", escape(text))
}

/// Returns a sequence number greater than any previously returned in this
/// process, tracking wall-clock nanoseconds where possible.
pub fn next_sequence() -> i64 {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let mut current = LAST_SEQUENCE.load(Ordering::SeqCst);
    loop {
        let candidate = now.max(current.saturating_add(1));
        match LAST_SEQUENCE.compare_exchange(current, candidate, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => return candidate,
            Err(actual) => current = actual,
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            unescaped.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }
    unescaped
}
