//! Observable registry, observers, and the event emission core for Trestle.
//!
//! This crate provides:
//! - [`World`] - Storage, id records, observable, and statistics in one place
//! - [`Observable`] - The two-level sparse (event, id) → observer index
//! - [`ObserverDesc`] / [`Observer`] - Observer registration and filters
//! - [`EventDesc`] / [`World::emit`] - The emit entry point
//! - [`EventIter`] - The transient iterator observer callbacks receive

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod emit;
mod instantiate;
mod iter;
mod observer;
mod registry;
mod stats;
mod world;

pub use emit::{EmitFlags, EventDesc};
pub use iter::{DataRef, EventIter};
pub use observer::{IterFn, Observer, ObserverDesc, RunFn, Term, TermSrc, Traverse};
pub use registry::{EventIdRecord, EventRecord, MatchSet, Observable, ObserverId};
pub use stats::WorldStats;
pub use world::{EntityModify, World};
