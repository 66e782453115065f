use matrix_core::{ClientId, RequestId, RequestKind, RequestParams};

use crate::error::SessionResult;
use crate::events::EventSink;

/// Port for one authenticated channel to the venue
///
/// Implementations own the socket and the wire codec. Every send returns as
/// soon as the request is written; results arrive later as events on the sink
/// handed to [`Session::connect`].
pub trait Session: Send + Sync {
    /// Open the channel under `client_id` and start delivering events to `sink`
    fn connect(&self, client_id: ClientId, sink: EventSink) -> SessionResult<()>;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Next request id; monotonic and safe to call from any thread.
    ///
    /// Order ids come from the same sequence.
    fn next_request_id(&self) -> RequestId;

    /// Write the request for `params.kind()` under `request_id`
    fn send(&self, request_id: RequestId, params: &RequestParams) -> SessionResult<()>;

    /// Write the venue cancel call for `kind`
    fn cancel(&self, kind: RequestKind, request_id: RequestId) -> SessionResult<()>;

    /// Get the session's name/identifier for debugging
    fn name(&self) -> &str {
        "Session"
    }
}
