//! Shared scheduler state and the lifecycle transitions that touch
//! admission accounting.
//!
//! Every terminal transition goes through one of [`Engine::complete`],
//! [`Engine::fail`], [`Engine::cancel`] or the sweep's reclamation. Each
//! asks the request to change state first and only the caller that wins
//! releases the admission slot, so a slot is returned exactly once.
//!
//! Caller hooks are never invoked while an admission lock is held: a hook is
//! free to call back into the scheduler.

use dashmap::DashMap;
use log::{debug, info, warn};
use matrix_core::remote::RemoteError;
use matrix_core::requests::CommissionReport;
use matrix_core::{
    CancelReason, ClientId, InstrumentKey, RequestHandle, RequestKind, Timestamp,
};
use matrix_ports::{Clock, SessionEvent};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

use crate::admission::Admission;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::orders::OrderIndex;
use crate::pool::{SessionHandle, SessionPool};
use crate::timeout::TimeoutPolicy;

/// Receives commission reports whose execution id matches no known order
pub type CommissionHook = Arc<dyn Fn(&CommissionReport) + Send + Sync>;

pub(crate) struct Engine {
    pub(crate) config: SchedulerConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) admission: Admission,
    pub(crate) pool: SessionPool,
    pub(crate) orders: OrderIndex,
    /// Latest market data stream per instrument
    pub(crate) market_data: DashMap<InstrumentKey, RequestHandle>,
    pub(crate) timeout_policy: Box<dyn TimeoutPolicy>,
    unattributed_commission: RwLock<Option<CommissionHook>>,
}

impl Engine {
    pub(crate) fn new(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        timeout_policy: Box<dyn TimeoutPolicy>,
    ) -> Self {
        Self {
            admission: Admission::new(&config.ceilings),
            pool: SessionPool::new(config.first_client_id),
            orders: OrderIndex::new(),
            market_data: DashMap::new(),
            unattributed_commission: RwLock::new(None),
            timeout_policy,
            clock,
            config,
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Event callback for a session thread; holds the engine weakly so
    /// sessions never keep it alive.
    pub(crate) fn event_handler(self: &Arc<Self>) -> impl Fn(ClientId, SessionEvent) + Send + 'static {
        let engine: Weak<Engine> = Arc::downgrade(self);
        move |client_id, event| {
            if let Some(engine) = engine.upgrade() {
                engine.route(client_id, event);
            }
        }
    }

    /// Register `request` on its session, then queue it (limited kinds) or
    /// send it right away.
    pub(crate) fn submit(&self, session: &SessionHandle, request: RequestHandle) {
        session.register(request.clone());

        if self.admission.is_limited(request.kind()) {
            request.mark_queued();
            self.admission.enqueue(request.clone());
            debug!(
                "Queued {} {} ({} waiting)",
                request.kind(),
                request.key(),
                self.admission.queued(request.kind())
            );
            return;
        }

        if !request.start(self.now()) {
            return;
        }
        match session.transport().send(request.id(), request.params()) {
            Ok(()) => debug!("Dispatched {} {}", request.kind(), request.key()),
            Err(e) => self.reject(&request, &e.to_string()),
        }
    }

    /// Finalize a request the session refused to send. It was never counted.
    pub(crate) fn reject(&self, request: &RequestHandle, message: &str) {
        warn!(
            "Send failed for {} {}: {}",
            request.kind(),
            request.key(),
            message
        );
        let error = RemoteError::local(self.now(), message);
        request.record_error(error.clone());
        if !request.reject(self.now()) {
            return;
        }
        if let Some(hook) = &request.hooks().on_error {
            hook(request, &error);
        }
    }

    /// Normal completion
    pub(crate) fn complete(&self, request: &RequestHandle) -> bool {
        if !request.finish(self.now()) {
            return false;
        }
        self.admission.release(request.kind(), &request.key());
        debug!("Finished {} {}", request.kind(), request.key());
        if let Some(hook) = &request.hooks().on_complete {
            hook(request);
        }
        true
    }

    /// Attach a remote error and finalize the request as errored
    pub(crate) fn fail(&self, request: &RequestHandle, error: RemoteError) -> bool {
        warn!(
            "Request {} ({}) error {}: {}",
            request.key(),
            request.kind(),
            error.code,
            error.message
        );
        request.record_error(error.clone());
        let won = request.fail(self.now());
        if won {
            self.admission.release(request.kind(), &request.key());
        }
        if let Some(hook) = &request.hooks().on_error {
            hook(request, &error);
        }
        if won {
            self.cascade_to_child(request, CancelReason::ParentFailed);
        }
        won
    }

    /// Cancel an active request. No-op unless the request is active.
    ///
    /// Sends the venue cancel for kinds that have one, returns the admission
    /// slot and cascades to an active protective child.
    pub(crate) fn cancel(&self, request: &RequestHandle, reason: CancelReason) -> bool {
        if !request.cancel(reason.clone(), self.now()) {
            return false;
        }
        info!(
            "Cancelled {} {} ({})",
            request.kind(),
            request.key(),
            reason
        );
        self.send_venue_cancel(request);
        self.admission.release(request.kind(), &request.key());
        self.cascade_to_child(request, reason);
        true
    }

    pub(crate) fn send_venue_cancel(&self, request: &RequestHandle) {
        if !request.kind().is_cancellable() {
            return;
        }
        let result = self
            .pool
            .get(request.client_id())
            .map_err(|e| e.to_string())
            .and_then(|session| {
                session
                    .transport()
                    .cancel(request.kind(), request.id())
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!("Venue cancel for {} failed: {}", request.key(), e);
        }
    }

    /// Cancel the protective order linked to `parent`, if it is still active
    pub(crate) fn cascade_to_child(&self, parent: &RequestHandle, reason: CancelReason) {
        let Some(child_id) = parent.child() else {
            return;
        };
        let Some(child) = self
            .pool
            .get(parent.client_id())
            .ok()
            .and_then(|session| session.request(child_id))
        else {
            return;
        };
        if child.is_active() && self.cancel(&child, reason) {
            info!("Cascaded cancel from {} to {}", parent.key(), child.key());
        }
    }

    /// Close a session and finalize everything it still owned.
    ///
    /// Queued requests are withdrawn and rejected. Active ones are cancelled
    /// with [`CancelReason::SessionClosed`] and their slots returned; no venue
    /// cancel goes out on a closed session.
    pub(crate) fn close_session(&self, client_id: ClientId) -> Result<usize> {
        let session = self.pool.get(client_id)?;
        self.pool.close_session(client_id)?;

        let mut orphaned = 0;
        for request in session.requests() {
            if request.is_terminal() {
                continue;
            }
            // A request the sweep already popped is either admitted by now or
            // will be rejected by the sweep itself
            if self.admission.withdraw(request.kind(), &request.key()) {
                self.reject(&request, "session closed");
                orphaned += 1;
            } else if request.cancel(CancelReason::SessionClosed, self.now()) {
                self.admission.release(request.kind(), &request.key());
                orphaned += 1;
            }
        }
        if orphaned > 0 {
            info!(
                "Finalized {} requests of closed session {}",
                orphaned, client_id
            );
        }
        Ok(orphaned)
    }

    pub(crate) fn close_all(&self) {
        for session in self.pool.sessions() {
            if let Err(e) = self.close_session(session.client_id()) {
                debug!("Session {} already closed: {}", session.client_id(), e);
            }
        }
    }

    pub(crate) fn requests(&self) -> Vec<RequestHandle> {
        self.pool
            .sessions()
            .iter()
            .flat_map(|session| session.requests())
            .collect()
    }

    pub(crate) fn active_requests(&self) -> Vec<RequestHandle> {
        let mut active: Vec<_> = self
            .requests()
            .into_iter()
            .filter(|request| request.is_active())
            .collect();
        active.sort_by_key(|request| (request.client_id(), request.id()));
        active
    }

    /// Whether cancelling `request` would free capacity someone is waiting for
    pub(crate) fn worth_cancelling(&self, request: &RequestHandle) -> bool {
        if request.is_busy() {
            return false;
        }
        match self.admission.record(request.kind()) {
            Some(record) => record.under_pressure(&record.lock()),
            None => true,
        }
    }

    pub(crate) fn set_unattributed_commission_hook(&self, hook: CommissionHook) {
        *self.unattributed_commission.write() = Some(hook);
    }

    pub(crate) fn unattributed_commission(&self, report: &CommissionReport) {
        match &*self.unattributed_commission.read() {
            Some(hook) => hook(report),
            None => debug!(
                "Commission for unknown execution {} dropped",
                report.exec_id
            ),
        }
    }

    /// Evict terminal requests from every table; returns how many requests
    /// left the session tables
    pub(crate) fn prune_terminal(&self) -> usize {
        let removed: usize = self
            .pool
            .sessions()
            .iter()
            .map(|session| session.prune_terminal())
            .sum();
        self.orders.prune_terminal();
        self.market_data
            .retain(|_, request| !request.is_terminal());
        if removed > 0 {
            debug!("Pruned {} terminal requests", removed);
        }
        removed
    }

    pub(crate) fn is_limited(&self, kind: RequestKind) -> bool {
        self.admission.is_limited(kind)
    }
}
