//! Wall-clock sources.
//!
//! Message-triggered writes never read a clock: they reuse the message's own
//! creation instant. The clock only stamps writes that have no message
//! instant to reuse (creation, rename, recompute).

use std::sync::{Arc, Mutex, PoisonError};

use recency_shared::models::Timestamp;

/// Source of the current instant.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// Clock shared across services.
pub type SharedClock = Arc<dyn Clock>;

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. Used by tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    /// A clock stopped at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Moves the clock to `at`, backwards included.
    pub fn set(&self, at: Timestamp) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Moves the clock by `millis` and returns the new instant.
    pub fn advance_millis(&self, millis: i64) -> Timestamp {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = guard.plus_millis(millis);
        *guard
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
