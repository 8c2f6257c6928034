//! Trestle - Column-oriented entity-component engine
//!
//! This crate re-exports all layers of the Trestle system for convenient
//! access. For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: trestle_event      — Observable, observers, event emission
//! Layer 1: trestle_storage    — Tables, entity index, id records
//! Layer 0: trestle_foundation — Core types (EntityId, Id, Value, Event)
//! ```

pub use trestle_event as event;
pub use trestle_foundation as foundation;
pub use trestle_storage as storage;
