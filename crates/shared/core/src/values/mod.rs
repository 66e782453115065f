use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Quantity value - uses Decimal for precision
pub type Quantity = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Symbol identifier for a tradeable instrument
pub type Symbol = String;

/// Client identity of one venue session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request id, assigned monotonically per session
///
/// Order ids share this id space on the venue side, so an order request's
/// id is also the venue order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide identity of a request: `(session, request id)`.
/// Orders by session, then by id, which is submission order within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub client_id: ClientId,
    pub request_id: RequestId,
}

impl RequestKey {
    pub fn new(client_id: ClientId, request_id: RequestId) -> Self {
        Self {
            client_id,
            request_id,
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client_id, self.request_id)
    }
}

/// Monotonic, thread-safe request id allocator
///
/// Seeded with the first valid id the venue reports after connecting;
/// every call to [`RequestIdSeq::next`] returns a strictly larger id.
#[derive(Debug, Default)]
pub struct RequestIdSeq {
    last: AtomicI64,
}

impl RequestIdSeq {
    pub fn new(first_valid: i64) -> Self {
        Self {
            last: AtomicI64::new(first_valid),
        }
    }

    /// Re-seed after a reconnect. Never moves backwards.
    pub fn seed(&self, first_valid: i64) {
        self.last.fetch_max(first_valid, Ordering::SeqCst);
    }

    pub fn next(&self) -> RequestId {
        RequestId(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> RequestId {
        RequestId(self.last.load(Ordering::SeqCst))
    }
}
