use chrono::{Duration, Utc};
use matrix_core::Timestamp;
use matrix_ports::Clock;
use parking_lot::RwLock;
use std::sync::Arc;

/// Clock frozen at a point in time, moved only by [`ManualClock::advance`]
/// and [`ManualClock::set_time`]
///
/// Shared as `Arc<ManualClock>` between a test and the scheduler under test.
pub struct ManualClock {
    current_time: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a manual clock
    ///
    /// # Arguments
    /// * `initial_time` - Optional starting time. If None, uses current wall time.
    pub fn new(initial_time: Option<Timestamp>) -> Arc<Self> {
        Arc::new(Self {
            current_time: RwLock::new(initial_time.unwrap_or_else(Utc::now)),
        })
    }

    /// Move time forward by `duration`
    pub fn advance(&self, duration: Duration) {
        *self.current_time.write() += duration;
    }

    /// Explicitly set the time
    ///
    /// Warning: moving backwards un-expires deadlines.
    pub fn set_time(&self, time: Timestamp) {
        *self.current_time.write() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current_time.read()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
