//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own retry, validation and logging policy so repositories stay plain.

pub mod pulse_log;
mod retry;
pub mod stand;
pub mod timeline;
