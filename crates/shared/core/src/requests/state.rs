use serde::{Deserialize, Serialize};
use std::fmt;

/// Request lifecycle.
///
/// `Created → Queued → Started → {Finished | Cancelled | TimedOut | Errored}`.
/// `Queued` is skipped for kinds without an admission ceiling. The four
/// terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    Created,
    Queued,
    Started,
    Finished,
    Cancelled,
    TimedOut,
    Errored,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Finished
                | RequestState::Cancelled
                | RequestState::TimedOut
                | RequestState::Errored
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Created => "created",
            RequestState::Queued => "queued",
            RequestState::Started => "started",
            RequestState::Finished => "finished",
            RequestState::Cancelled => "cancelled",
            RequestState::TimedOut => "timed_out",
            RequestState::Errored => "errored",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was cancelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// Reclaimed by the sweep after its deadline passed
    TimedOut,
    /// The venue rejected the request
    Error,
    /// Bulk shutdown of outstanding work
    Finish,
    /// No longer part of the wanted set
    Unselected,
    /// Linked parent order was rejected by the venue
    ParentFailed,
    /// The owning session was closed while the request was in flight
    SessionClosed,
    Caller(String),
}

impl CancelReason {
    /// Terminal state a cancellation with this reason lands in
    pub fn terminal_state(&self) -> RequestState {
        match self {
            CancelReason::TimedOut => RequestState::TimedOut,
            CancelReason::Error => RequestState::Errored,
            _ => RequestState::Cancelled,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::TimedOut => f.write_str("TimedOut"),
            CancelReason::Error => f.write_str("Error"),
            CancelReason::Finish => f.write_str("Finish"),
            CancelReason::Unselected => f.write_str("Unselected"),
            CancelReason::ParentFailed => f.write_str("ParentFailed"),
            CancelReason::SessionClosed => f.write_str("SessionClosed"),
            CancelReason::Caller(reason) => f.write_str(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeout_and_error_leave_cancelled() {
        assert_eq!(CancelReason::TimedOut.terminal_state(), RequestState::TimedOut);
        assert_eq!(CancelReason::Error.terminal_state(), RequestState::Errored);
        for reason in [
            CancelReason::Finish,
            CancelReason::Unselected,
            CancelReason::ParentFailed,
            CancelReason::SessionClosed,
            CancelReason::Caller("manual".into()),
        ] {
            assert_eq!(reason.terminal_state(), RequestState::Cancelled);
        }
    }
}
