//! Core types for the Trestle entity-component engine.
//!
//! This crate provides:
//! - [`EntityId`] - Generational entity identifiers
//! - [`Id`] - Component ids, pairs, and wildcards
//! - [`Value`] - The dynamic component value type
//! - [`Event`] - Event kinds and the polarity flip
//! - [`Error`] - Error types
//! - Id and table flags

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod entity;
mod error;
mod event;
mod flags;
mod id;
mod value;

pub use entity::EntityId;
pub use error::{Error, ErrorKind, Result};
pub use event::{flip_event, sync_event, Event, TermOper};
pub use flags::{IdFlags, TableFlags};
pub use id::Id;
pub use value::{Type, Value};
