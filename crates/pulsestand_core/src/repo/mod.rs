//! Repository layer: storage primitives over a migrated SQLite connection.
//!
//! # Responsibility
//! - Expose narrow traits the services are written against.
//! - Keep SQL and row mapping out of the service layer.
//!
//! # Invariants
//! - Repositories borrow a connection and never open their own.
//! - `try_new` rejects connections that are not fully migrated.

pub mod common;
pub mod pulse_repo;
pub mod stand_repo;
pub mod timeline_repo;
