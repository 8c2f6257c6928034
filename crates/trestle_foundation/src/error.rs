//! Error types for the Trestle system.
//!
//! Uses `thiserror` for ergonomic error definition. Errors cover recoverable
//! registration and structural misuse; internal invariant violations are
//! debug-time assertions, and expected sparsity (no observers, no record) is
//! a silent no-op rather than an error.

use thiserror::Error;

use crate::entity::EntityId;
use crate::id::Id;
use crate::value::Type;

/// Result alias for Trestle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Trestle operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn entity_not_found(id: EntityId) -> Self {
        Self::new(ErrorKind::EntityNotFound(id))
    }

    /// Creates a stale entity reference error.
    #[must_use]
    pub fn stale_entity(id: EntityId) -> Self {
        Self::new(ErrorKind::StaleEntity(id))
    }

    /// Creates an unknown id error.
    #[must_use]
    pub fn unknown_id(id: Id) -> Self {
        Self::new(ErrorKind::UnknownId(id))
    }

    /// Creates an error for value access on an id without storage.
    #[must_use]
    pub fn not_a_component(id: Id) -> Self {
        Self::new(ErrorKind::NotAComponent(id))
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: Type, actual: Type) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates an invalid observer descriptor error.
    #[must_use]
    pub fn invalid_observer(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidObserver(message.into()))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Entity was not found in storage.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EntityId),

    /// Entity reference is stale (generation mismatch).
    #[error("stale entity reference: {0:?}")]
    StaleEntity(EntityId),

    /// A name was registered twice.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// An id was used without being registered first.
    #[error("unknown id: {0:?}")]
    UnknownId(Id),

    /// Value access on an id that carries no storage (a tag or pair).
    #[error("id has no storage: {0:?}")]
    NotAComponent(Id),

    /// Type mismatch during runtime type checking.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: Type,
        /// The actual type encountered.
        actual: Type,
    },

    /// Malformed observer descriptor.
    #[error("invalid observer: {0}")]
    InvalidObserver(String),

    /// Observer id did not resolve to a registered observer.
    #[error("observer not found: {0}")]
    ObserverNotFound(u64),

    /// Structural mutation attempted on a table locked by a running
    /// observer callback. Defer the change instead.
    #[error("table {0} is locked by an observer callback")]
    TableLocked(usize),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}
