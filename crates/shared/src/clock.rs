//! Time source abstraction
//!
//! Every "now" read by the engine goes through a [`Clock`] so SLA and
//! auto-reopen behavior can be tested against fixed instants.

use std::sync::Mutex;

use time::{Duration, OffsetDateTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(time: OffsetDateTime) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    pub fn set(&self, time: OffsetDateTime) {
        // A poisoned lock still holds a valid instant
        let mut guard = self.time.lock().unwrap_or_else(|e| e.into_inner());
        *guard = time;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.time.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.time.lock().unwrap_or_else(|e| e.into_inner())
    }
}
