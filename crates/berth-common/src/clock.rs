//! Wall-clock abstraction so TTL logic can be tested at fixed instants

use chrono::{DateTime, Duration, Utc};

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Time elapsed since `instant` (negative if it lies in the future)
    fn since(&self, instant: DateTime<Utc>) -> Duration {
        self.now() - instant
    }
}

/// The system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
