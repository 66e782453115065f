use matrix_core::Timestamp;
use matrix_ports::Clock;
use chrono::Utc;

/// Wall-clock time source used by a live scheduler
///
/// Request deadlines and error-log entries are stamped with `Utc::now()`.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
