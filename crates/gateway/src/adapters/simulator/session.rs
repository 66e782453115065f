//! Simulated session - records outbound traffic, replays inbound events
//!
//! Tests drive the inbound side explicitly (`data`, `end`, `error`, ...) or
//! install a [`Responder`] that answers every outbound call automatically.

use log::{debug, info, warn};
use matrix_core::requests::{CommissionReport, Execution, Payload};
use matrix_core::{ClientId, RequestId, RequestIdSeq, RequestKind, RequestParams, SingletonSlot};
use matrix_ports::{EventSink, Session, SessionError, SessionEvent, SessionResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::Outbound;

/// Scripted venue: maps each outbound call to the events it produces
pub type Responder = Arc<dyn Fn(&Outbound) -> Vec<SessionEvent> + Send + Sync>;

/// In-memory [`Session`] implementation
pub struct SimulatedSession {
    name: String,
    ids: RequestIdSeq,
    connected: AtomicBool,
    client_id: Mutex<Option<ClientId>>,
    sink: Mutex<Option<EventSink>>,
    outbound: Mutex<Vec<Outbound>>,
    fail_connect: AtomicBool,
    fail_sends: AtomicBool,
    responder: Option<Responder>,
}

impl SimulatedSession {
    /// Create a session whose first allocated id is `last_id + 1`
    pub fn new(last_id: i64) -> Self {
        Self {
            name: "SimulatedSession".to_string(),
            ids: RequestIdSeq::new(last_id),
            connected: AtomicBool::new(false),
            client_id: Mutex::new(None),
            sink: Mutex::new(None),
            outbound: Mutex::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            responder: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Answer every outbound call with the events `responder` returns
    pub fn with_responder(
        mut self,
        responder: impl Fn(&Outbound) -> Vec<SessionEvent> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Make the next `connect` calls fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make `send` calls fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn client_id(&self) -> Option<ClientId> {
        *self.client_id.lock()
    }

    // Outbound inspection

    pub fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().clone()
    }

    pub fn clear_outbound(&self) {
        self.outbound.lock().clear();
    }

    /// Ids sent for `kind`, in send order
    pub fn sent_ids(&self, kind: RequestKind) -> Vec<RequestId> {
        self.outbound
            .lock()
            .iter()
            .filter(|call| call.is_send() && call.kind() == kind)
            .map(Outbound::request_id)
            .collect()
    }

    /// Ids cancelled for `kind`, in cancel order
    pub fn cancelled_ids(&self, kind: RequestKind) -> Vec<RequestId> {
        self.outbound
            .lock()
            .iter()
            .filter(|call| call.is_cancel() && call.kind() == kind)
            .map(Outbound::request_id)
            .collect()
    }

    pub fn send_count(&self) -> usize {
        self.outbound.lock().iter().filter(|c| c.is_send()).count()
    }

    pub fn cancel_count(&self) -> usize {
        self.outbound.lock().iter().filter(|c| c.is_cancel()).count()
    }

    // Inbound driving

    /// Push a raw event; false if not connected or nobody is listening
    pub fn emit(&self, event: SessionEvent) -> bool {
        match &*self.sink.lock() {
            Some(sink) => sink.emit(event),
            None => {
                warn!("{}: event dropped, not connected", self.name);
                false
            }
        }
    }

    pub fn data(&self, request_id: RequestId, payload: Payload) -> bool {
        self.emit(SessionEvent::Data {
            request_id,
            payload,
        })
    }

    pub fn end(&self, request_id: RequestId) -> bool {
        self.emit(SessionEvent::End { request_id })
    }

    pub fn error(&self, request_id: Option<RequestId>, code: i32, message: &str) -> bool {
        self.emit(SessionEvent::Error {
            request_id,
            code,
            message: message.to_string(),
        })
    }

    pub fn snapshot(&self, slot: SingletonSlot, payload: Payload) -> bool {
        self.emit(SessionEvent::Snapshot { slot, payload })
    }

    pub fn snapshot_end(&self, slot: SingletonSlot) -> bool {
        self.emit(SessionEvent::SnapshotEnd { slot })
    }

    pub fn execution(&self, execution: Execution) -> bool {
        self.emit(SessionEvent::Execution(execution))
    }

    pub fn commission(&self, report: CommissionReport) -> bool {
        self.emit(SessionEvent::Commission(report))
    }

    fn record(&self, call: Outbound) {
        let responses = self
            .responder
            .as_ref()
            .map(|responder| responder(&call))
            .unwrap_or_default();
        self.outbound.lock().push(call);
        for event in responses {
            self.emit(event);
        }
    }
}

impl Session for SimulatedSession {
    fn connect(&self, client_id: ClientId, sink: EventSink) -> SessionResult<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SessionError::Connect(format!(
                "{} refused client {}",
                self.name, client_id
            )));
        }
        *self.client_id.lock() = Some(client_id);
        *self.sink.lock() = Some(sink);
        self.connected.store(true, Ordering::SeqCst);
        info!("{}: connected as client {}", self.name, client_id);
        Ok(())
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.sink.lock().take();
            info!("{}: disconnected", self.name);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn next_request_id(&self) -> RequestId {
        self.ids.next()
    }

    fn send(&self, request_id: RequestId, params: &RequestParams) -> SessionResult<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SessionError::Send(format!(
                "{} rejected {} {}",
                self.name,
                params.kind(),
                request_id
            )));
        }
        debug!("{}: send {} {}", self.name, params.kind(), request_id);
        self.record(Outbound::Send {
            request_id,
            params: params.clone(),
        });
        Ok(())
    }

    fn cancel(&self, kind: RequestKind, request_id: RequestId) -> SessionResult<()> {
        if !kind.is_cancellable() {
            return Err(SessionError::NotCancellable(kind));
        }
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        debug!("{}: cancel {} {}", self.name, kind, request_id);
        self.record(Outbound::Cancel { kind, request_id });
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
