use matrix_core::Timestamp;

/// Source of "now" for the scheduler.
///
/// Request start and end times, deadlines and session activity all read this
/// clock, so a manual clock lets tests step past timeouts without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Shown in logs
    fn name(&self) -> &str {
        "clock"
    }
}
