#![forbid(unsafe_code)]

//! Time source for observation timestamps.
//!
//! The registry stamps every observation itself; the clock is injected so
//! tests can drive timestamps deterministically with [`ManualClock`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use web_time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source.
pub trait Clock {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// The host's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<SystemTime>>,
}

impl ManualClock {
    /// Start at `UNIX_EPOCH + offset`.
    #[must_use]
    pub fn starting_at(offset: Duration) -> Self {
        Self {
            now: Rc::new(Cell::new(UNIX_EPOCH + offset)),
        }
    }

    /// Move forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Move backward (simulates a wall-clock step).
    pub fn rewind(&self, by: Duration) {
        let t = self.now.get();
        self.now.set(t.checked_sub(by).unwrap_or(UNIX_EPOCH));
    }

    /// Jump to an absolute time.
    pub fn set(&self, at: SystemTime) {
        self.now.set(at);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(Duration::ZERO)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.now.get()
    }
}

/// Seconds-of-day formatted as `HH:MM:SS` (UTC).
#[must_use]
pub fn format_time_of_day(at: SystemTime) -> String {
    let secs = at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
