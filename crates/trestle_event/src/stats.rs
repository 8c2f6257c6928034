//! World statistics updated by the emit path.

use std::cell::Cell;
use std::time::Duration;

/// Counters the emit path maintains. Interior mutability keeps them
/// writable from the shared-borrow invocation path; the engine is
/// single-threaded per call.
#[derive(Debug, Default)]
pub struct WorldStats {
    observers_ran: Cell<u64>,
    emits: Cell<u64>,
    emit_time: Cell<Duration>,
}

impl WorldStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total observer invocations.
    #[must_use]
    pub fn observers_ran(&self) -> u64 {
        self.observers_ran.get()
    }

    /// Total emit calls.
    #[must_use]
    pub fn emits(&self) -> u64 {
        self.emits.get()
    }

    /// Cumulative time spent in emit, when measurement is enabled.
    #[must_use]
    pub fn emit_time(&self) -> Duration {
        self.emit_time.get()
    }

    pub(crate) fn bump_observers_ran(&self) {
        self.observers_ran.set(self.observers_ran.get() + 1);
    }

    pub(crate) fn bump_emits(&self) {
        self.emits.set(self.emits.get() + 1);
    }

    pub(crate) fn add_emit_time(&self, elapsed: Duration) {
        self.emit_time.set(self.emit_time.get() + elapsed);
    }
}
