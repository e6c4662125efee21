//! Domain model for pulses, stands and timelines.
//!
//! # Responsibility
//! - Define the identity (`Coordinates`) and ordering of pulses.
//! - Define fragment encoding, tags, products and timeline events.
//!
//! # Invariants
//! - Model types carry no storage handles; persistence lives in `repo`.
//! - Constructors validate what the type promises (rule names, URNs).

pub mod coordinates;
pub mod event;
pub mod fragment;
pub mod pulse;
pub mod stand;
pub mod tag;
pub mod time;
