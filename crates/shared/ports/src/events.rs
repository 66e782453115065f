//! Inbound callback surface of a session.
//!
//! A session decodes venue callbacks into [`SessionEvent`]s and pushes them
//! through the [`EventSink`] it was handed on connect. The scheduler drains the
//! other end on the session's callback thread.

use crossbeam_channel::{Receiver, Sender, unbounded};
use matrix_core::requests::{CommissionReport, Execution, Payload};
use matrix_core::{RequestId, SingletonSlot};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Data tagged with the originating request id
    Data {
        request_id: RequestId,
        payload: Payload,
    },
    /// The venue's end marker for a request
    End { request_id: RequestId },
    /// Remote error; `request_id` is `None` for session-wide notices
    Error {
        request_id: Option<RequestId>,
        code: i32,
        message: String,
    },
    /// Untagged whole-snapshot data (positions, open orders, managed accounts)
    Snapshot { slot: SingletonSlot, payload: Payload },
    SnapshotEnd { slot: SingletonSlot },
    /// Fill report; carries the order id it belongs to
    Execution(Execution),
    /// Commission report; correlated only through its execution id
    Commission(CommissionReport),
}

impl SessionEvent {
    /// Request id the event names directly, if any
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            SessionEvent::Data { request_id, .. } | SessionEvent::End { request_id } => {
                Some(*request_id)
            }
            SessionEvent::Error { request_id, .. } => *request_id,
            SessionEvent::Execution(execution) => Some(execution.order_id),
            _ => None,
        }
    }
}

/// Sending half of a session's inbound event channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<SessionEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver the callback thread drains
    pub fn channel() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }

    /// Push one event; returns false once the receiving side is gone
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}
