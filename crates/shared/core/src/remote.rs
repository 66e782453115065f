//! Classification of remote error codes

use serde::{Deserialize, Serialize};

use crate::values::Timestamp;

/// Informational status chatter (farm connectivity notices and the like)
pub const WARNING_CODES: [i32; 13] = [
    2100, 2101, 2102, 2103, 2104, 2105, 2106, 2107, 2108, 2109, 2110, 2137, 2158,
];

/// Codes meaning the session itself is unhealthy: connectivity lost/restored,
/// connect failure, not connected, bad length, bad message, socket exception,
/// SSL failure
pub const SESSION_FAULT_CODES: [i32; 8] = [1100, 1300, 502, 504, 507, 508, 509, 530];

/// Code recorded for failures detected locally (e.g. the session refused a send)
pub const LOCAL_ERROR_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErrorClass {
    /// Dropped without touching any request
    Warning,
    /// Flags the session for reconnection; no request is touched
    SessionFault,
    /// Attached to the request it names
    Request,
}

pub fn classify(code: i32) -> RemoteErrorClass {
    if SESSION_FAULT_CODES.contains(&code) {
        RemoteErrorClass::SessionFault
    } else if WARNING_CODES.contains(&code) {
        RemoteErrorClass::Warning
    } else {
        RemoteErrorClass::Request
    }
}

/// Entry of a request's error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub at: Timestamp,
    pub code: i32,
    pub message: String,
}

impl RemoteError {
    pub fn new(at: Timestamp, code: i32, message: impl Into<String>) -> Self {
        Self {
            at,
            code,
            message: message.into(),
        }
    }

    pub fn local(at: Timestamp, message: impl Into<String>) -> Self {
        Self::new(at, LOCAL_ERROR_CODE, message)
    }

    pub fn class(&self) -> RemoteErrorClass {
        classify(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(classify(2104), RemoteErrorClass::Warning);
        assert_eq!(classify(2158), RemoteErrorClass::Warning);
        assert_eq!(classify(1100), RemoteErrorClass::SessionFault);
        assert_eq!(classify(504), RemoteErrorClass::SessionFault);
        assert_eq!(classify(162), RemoteErrorClass::Request);
        assert_eq!(classify(202), RemoteErrorClass::Request);
    }

    #[test]
    fn test_code_sets_are_disjoint() {
        for code in WARNING_CODES {
            assert!(!SESSION_FAULT_CODES.contains(&code));
        }
    }
}
