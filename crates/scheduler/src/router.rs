//! Inbound event routing
//!
//! Runs on a session's callback thread. Tagged events are matched to their
//! request through the session's correlation table. Snapshot events go
//! through the session's singleton slots. Commissions are matched through
//! the execution id recorded when the fill arrived.

use log::{debug, trace, warn};
use matrix_core::remote::RemoteError;
use matrix_core::requests::{CommissionReport, Execution};
use matrix_core::{
    ClientId, Payload, RemoteErrorClass, RequestHandle, RequestId, SingletonSlot,
};
use matrix_ports::SessionEvent;

use crate::engine::Engine;
use crate::pool::SessionHandle;

impl Engine {
    /// Deliver one event received on session `client_id`
    pub(crate) fn route(&self, client_id: ClientId, event: SessionEvent) {
        let Ok(session) = self.pool.get(client_id) else {
            debug!("Event for closed session {} dropped", client_id);
            return;
        };
        session.touch(self.now());

        match event {
            SessionEvent::Data {
                request_id,
                payload,
            } => self.on_data(&session, request_id, payload),
            SessionEvent::End { request_id } => match session.request(request_id) {
                Some(request) => {
                    self.complete(&request);
                }
                None => warn!("End for unknown request {}:{}", client_id, request_id),
            },
            SessionEvent::Error {
                request_id,
                code,
                message,
            } => self.on_error(&session, request_id, code, message),
            SessionEvent::Snapshot { slot, payload } => self.on_snapshot(&session, slot, payload),
            SessionEvent::SnapshotEnd { slot } => match session.singleton(slot) {
                Some(request) => {
                    self.complete(&request);
                }
                None => warn!("Snapshot end for empty slot {:?} on {}", slot, client_id),
            },
            SessionEvent::Execution(execution) => self.on_execution(&session, execution),
            SessionEvent::Commission(report) => self.on_commission(&session, report),
        }
    }

    fn on_data(&self, session: &SessionHandle, request_id: RequestId, payload: Payload) {
        let Some(request) = session.request(request_id) else {
            warn!(
                "{} for unknown request {}:{}",
                payload.name(),
                session.client_id(),
                request_id
            );
            return;
        };
        if !request.ingest(&payload) {
            return;
        }
        if request.kind().completes_on_reply() {
            self.complete(&request);
            return;
        }
        let filled = matches!(&payload, Payload::OrderStatus(status) if status.is_filled());
        if filled {
            self.complete(&request);
        }
    }

    fn on_error(
        &self,
        session: &SessionHandle,
        request_id: Option<RequestId>,
        code: i32,
        message: String,
    ) {
        let error = RemoteError::new(self.now(), code, message);
        match error.class() {
            RemoteErrorClass::Warning => {
                debug!(
                    "Session {} notice {}: {}",
                    session.client_id(),
                    code,
                    error.message
                );
            }
            RemoteErrorClass::SessionFault => {
                warn!(
                    "Session {} fault {}: {}; flagged for reconnect",
                    session.client_id(),
                    code,
                    error.message
                );
                session.flag_reconnect();
            }
            RemoteErrorClass::Request => {
                match request_id.and_then(|id| session.request(id)) {
                    Some(request) => {
                        self.fail(&request, error);
                    }
                    None => warn!(
                        "Error {} for unknown request {:?} on {}: {}",
                        code,
                        request_id,
                        session.client_id(),
                        error.message
                    ),
                }
            }
        }
    }

    fn on_snapshot(&self, session: &SessionHandle, slot: SingletonSlot, payload: Payload) {
        let Some(request) = session.singleton(slot) else {
            warn!(
                "{} for empty slot {:?} on {}",
                payload.name(),
                slot,
                session.client_id()
            );
            return;
        };
        if request.ingest(&payload) && slot.kind().completes_on_reply() {
            self.complete(&request);
        }
    }

    fn on_execution(&self, session: &SessionHandle, execution: Execution) {
        match session.request(execution.order_id) {
            Some(request) => {
                session.record_execution(&execution.exec_id, execution.order_id);
                request.ingest(&Payload::Execution(execution));
            }
            None => warn!(
                "Execution {} for unknown order {}:{}",
                execution.exec_id,
                session.client_id(),
                execution.order_id
            ),
        }
    }

    fn on_commission(&self, session: &SessionHandle, report: CommissionReport) {
        let order: Option<RequestHandle> = session
            .order_for_execution(&report.exec_id)
            .and_then(|order_id| session.request(order_id));
        match order {
            Some(request) => {
                trace!("Commission {} -> {}", report.exec_id, request.key());
                request.ingest(&Payload::Commission(report));
            }
            None => self.unattributed_commission(&report),
        }
    }
}
