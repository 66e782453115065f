//! Public facade
//!
//! [`Scheduler`] owns the engine and the sweep thread. Every submission
//! returns a [`RequestHandle`] right away; results arrive through the
//! handle's hooks or can be polled and waited on.

use log::{debug, info};
use matrix_core::requests::{
    Bar, CommissionReport, HistoricalParams, MarketDataParams, OptionChainQuery,
};
use matrix_core::{
    BodyShape, CancelReason, ClientId, Contract, InstrumentKey, Order, Request, RequestHandle,
    RequestHooks, RequestId, RequestKey, RequestKind, RequestParams, Timestamp,
};
use matrix_ports::{Clock, Session, SessionEvent};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{SchedulerConfig, SessionPlan};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::orders::OrderBucket;
use crate::pool::SessionHandle;
use crate::sweep::{SweepReport, SweepThread};
use crate::timeout::{HeuristicTimeout, TimeoutPolicy};

/// Outcome of [`Scheduler::reconcile_market_data`]
#[derive(Debug, Default)]
pub struct MarketDataReconcile {
    /// Unwanted streams cancelled
    pub cancelled: usize,
    /// Wanted streams already running
    pub kept: usize,
    /// Unwanted option streams left running because cancelling them would
    /// free nothing anyone is waiting for
    pub deferred: usize,
    /// Streams newly requested
    pub requested: Vec<RequestHandle>,
}

pub struct Scheduler {
    engine: Arc<Engine>,
    sweep: Mutex<Option<SweepThread>>,
}

impl Scheduler {
    /// Create a scheduler with the default historical timeout heuristic.
    /// The sweep does not run until [`Scheduler::start`].
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let policy = HeuristicTimeout::new(config.historical.clone());
        Self::with_timeout_policy(config, clock, policy)
    }

    pub fn with_timeout_policy(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        policy: impl TimeoutPolicy + 'static,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Scheduler using {} with ceilings {:?}",
            clock.name(),
            config.ceilings
        );
        Ok(Self {
            engine: Arc::new(Engine::new(config, clock, Box::new(policy))),
            sweep: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.engine.config
    }

    // Lifecycle

    /// Start the sweep thread; no-op if it is already running
    pub fn start(&self) {
        let mut sweep = self.sweep.lock();
        if sweep.as_ref().is_some_and(SweepThread::is_running) {
            return;
        }
        *sweep = Some(SweepThread::spawn(
            Arc::downgrade(&self.engine),
            self.engine.config.sweep_interval(),
        ));
    }

    /// Stop and join the sweep thread. Sessions stay open.
    pub fn stop(&self) {
        let thread = self.sweep.lock().take();
        if let Some(mut thread) = thread {
            thread.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweep
            .lock()
            .as_ref()
            .is_some_and(SweepThread::is_running)
    }

    /// Stop the sweep and close every session
    pub fn shutdown(&self) {
        self.stop();
        self.engine.close_all();
    }

    /// Run one sweep pass on the calling thread
    pub fn sweep_once(&self) -> SweepReport {
        self.engine.sweep_once()
    }

    /// Deliver an inbound event as if it arrived on session `client_id`
    pub fn route(&self, client_id: ClientId, event: SessionEvent) {
        self.engine.route(client_id, event);
    }

    // Sessions

    /// Connect `transport` and make it eligible for `kinds`
    pub fn open_session(
        &self,
        name: &str,
        kinds: &[RequestKind],
        transport: Arc<dyn Session>,
        client_id: Option<ClientId>,
    ) -> Result<ClientId> {
        let handler = self.engine.event_handler();
        self.engine
            .pool
            .create_session(name, kinds, transport, client_id, handler)
    }

    /// Open every session listed in the configuration, building each
    /// transport with `factory`
    pub fn open_planned_sessions<F>(&self, mut factory: F) -> Result<Vec<ClientId>>
    where
        F: FnMut(&SessionPlan) -> Arc<dyn Session>,
    {
        let plans = self.engine.config.sessions.clone();
        let mut opened = Vec::with_capacity(plans.len());
        for plan in &plans {
            let transport = factory(plan);
            opened.push(self.open_session(&plan.name, &plan.kinds, transport, plan.client_id)?);
        }
        Ok(opened)
    }

    /// Close one session. Its unfinished requests end here: queued ones are
    /// rejected, active ones cancelled. Returns how many were finalized.
    pub fn close_session(&self, client_id: ClientId) -> Result<usize> {
        self.engine.close_session(client_id)
    }

    pub fn close_all(&self) {
        self.engine.close_all();
    }

    pub fn session(&self, client_id: ClientId) -> Result<Arc<SessionHandle>> {
        self.engine.pool.get(client_id)
    }

    pub fn sessions(&self) -> Vec<Arc<SessionHandle>> {
        self.engine.pool.sessions()
    }

    pub fn connection_statuses(&self) -> Vec<(ClientId, bool)> {
        self.engine.pool.connection_statuses()
    }

    pub fn sessions_needing_reconnect(&self) -> Vec<ClientId> {
        self.engine.pool.sessions_needing_reconnect()
    }

    pub fn clear_reconnect(&self, client_id: ClientId) -> Result<()> {
        self.engine.pool.get(client_id)?.clear_reconnect();
        Ok(())
    }

    pub fn last_activity(&self, client_id: ClientId) -> Result<Option<Timestamp>> {
        Ok(self.engine.pool.get(client_id)?.last_activity())
    }

    // Submission

    /// Submit any request. Orders go through [`Scheduler::place_order`].
    pub fn submit(&self, params: RequestParams, hooks: RequestHooks) -> Result<RequestHandle> {
        match params {
            RequestParams::PlaceOrder { contract, order } => {
                self.place_order(contract, order, hooks, None)
            }
            RequestParams::MarketData(params) => self.request_market_data(params, hooks),
            params => self.submit_on(None, params, hooks, 1),
        }
    }

    /// `load_factor` is the number of sibling historical requests issued
    /// together; it stretches the deadline.
    pub fn request_historical_data(
        &self,
        params: HistoricalParams,
        load_factor: usize,
        hooks: RequestHooks,
    ) -> Result<RequestHandle> {
        self.submit_on(
            None,
            RequestParams::HistoricalData(params),
            hooks,
            load_factor,
        )
    }

    pub fn request_contract_details(
        &self,
        contract: Contract,
        hooks: RequestHooks,
    ) -> Result<RequestHandle> {
        self.submit_on(None, RequestParams::ContractDetails { contract }, hooks, 1)
    }

    pub fn request_option_chain(
        &self,
        query: OptionChainQuery,
        hooks: RequestHooks,
    ) -> Result<RequestHandle> {
        self.submit_on(None, RequestParams::OptionChainParams(query), hooks, 1)
    }

    /// Open a quote stream; it becomes the instrument's current stream
    pub fn request_market_data(
        &self,
        params: MarketDataParams,
        hooks: RequestHooks,
    ) -> Result<RequestHandle> {
        let instrument = params.contract.instrument_key();
        let request = self.submit_on(None, RequestParams::MarketData(params), hooks, 1)?;
        self.engine.market_data.insert(instrument, request.clone());
        Ok(request)
    }

    /// Positions snapshot; an active one on the chosen session is reused
    pub fn request_positions(&self, hooks: RequestHooks) -> Result<RequestHandle> {
        self.submit_on(None, RequestParams::Positions, hooks, 1)
    }

    pub fn request_positions_multi(
        &self,
        account: impl Into<String>,
        model_code: impl Into<String>,
        hooks: RequestHooks,
    ) -> Result<RequestHandle> {
        let params = RequestParams::PositionsMulti {
            account: account.into(),
            model_code: model_code.into(),
        };
        self.submit_on(None, params, hooks, 1)
    }

    pub fn request_open_orders(&self, hooks: RequestHooks) -> Result<RequestHandle> {
        self.submit_on(None, RequestParams::OpenOrders, hooks, 1)
    }

    pub fn request_account_summary(
        &self,
        group: impl Into<String>,
        tags: Vec<String>,
        hooks: RequestHooks,
    ) -> Result<RequestHandle> {
        let params = RequestParams::AccountSummary {
            group: group.into(),
            tags,
        };
        self.submit_on(None, params, hooks, 1)
    }

    /// Managed accounts of one session, or of a randomly selected one
    pub fn request_managed_accounts(
        &self,
        client_id: Option<ClientId>,
        hooks: RequestHooks,
    ) -> Result<RequestHandle> {
        self.submit_on(client_id, RequestParams::ManagedAccounts, hooks, 1)
    }

    /// Place a single order. Without `order_id` the session allocates one.
    pub fn place_order(
        &self,
        contract: Contract,
        order: Order,
        hooks: RequestHooks,
        order_id: Option<RequestId>,
    ) -> Result<RequestHandle> {
        check_order(&order)?;
        let session = self.engine.pool.select(RequestKind::PlaceOrder)?;
        let request = self.build(
            &session,
            RequestParams::PlaceOrder { contract, order },
            hooks,
            1,
            order_id,
        );
        self.engine.orders.insert(&request);
        self.engine.submit(&session, request.clone());
        Ok(request)
    }

    /// Place an entry order with an attached protective (stop or trailing)
    /// order. Both go to the same session; the entry is held until the
    /// protective leg transmits. Returns `(parent, child)`.
    pub fn place_bracket(
        &self,
        contract: Contract,
        parent: Order,
        protective: Order,
        hooks: RequestHooks,
    ) -> Result<(RequestHandle, RequestHandle)> {
        check_order(&parent)?;
        check_order(&protective)?;
        if !protective.is_protective() {
            return Err(Error::InvalidOrder(format!(
                "bracket child must be a stop or trailing order, got {:?}",
                protective.order_type
            )));
        }

        let session = self.engine.pool.select(RequestKind::PlaceOrder)?;
        let parent_id = session.transport().next_request_id();
        let child_id = session.transport().next_request_id();

        let parent = self.build(
            &session,
            RequestParams::PlaceOrder {
                contract: contract.clone(),
                order: parent.with_transmit(false),
            },
            hooks.clone(),
            1,
            Some(parent_id),
        );
        let child = self.build(
            &session,
            RequestParams::PlaceOrder {
                contract,
                order: protective.with_parent(parent_id).with_transmit(true),
            },
            hooks,
            1,
            Some(child_id),
        );
        parent.set_child(child_id);
        // Registered before the parent is sent so a cascade can find it
        session.register(child.clone());
        self.engine.orders.insert(&parent);
        self.engine.orders.insert(&child);

        self.engine.submit(&session, parent.clone());
        if parent.is_errored() {
            self.engine
                .reject(&child, &format!("parent order {} was not sent", parent_id));
        } else {
            self.engine.submit(&session, child.clone());
        }
        Ok((parent, child))
    }

    fn submit_on(
        &self,
        client_id: Option<ClientId>,
        params: RequestParams,
        hooks: RequestHooks,
        load_factor: usize,
    ) -> Result<RequestHandle> {
        let kind = params.kind();
        let session = match client_id {
            Some(client_id) => self.engine.pool.get(client_id)?,
            None => self.engine.pool.select(kind)?,
        };

        let Some(slot) = kind.singleton_slot() else {
            let request = self.build(&session, params, hooks, load_factor, None);
            self.engine.submit(&session, request.clone());
            return Ok(request);
        };

        let (request, created) = session.singleton_or_insert(slot, || {
            self.build(&session, params, hooks, load_factor, None)
        });
        if created {
            self.engine.submit(&session, request.clone());
        } else {
            debug!("Reusing {} {}", kind, request.key());
        }
        Ok(request)
    }

    fn build(
        &self,
        session: &SessionHandle,
        params: RequestParams,
        hooks: RequestHooks,
        load_factor: usize,
        request_id: Option<RequestId>,
    ) -> RequestHandle {
        let kind = params.kind();
        let request_id = request_id.unwrap_or_else(|| session.transport().next_request_id());
        let shape = match kind {
            RequestKind::MarketData => BodyShape::Stream,
            RequestKind::PlaceOrder => BodyShape::Order,
            _ => BodyShape::Plain,
        };
        let timeout = match &params {
            RequestParams::HistoricalData(historical) => {
                Some(self.engine.timeout_policy.historical_timeout(
                    historical,
                    load_factor,
                    self.engine.admission.ceiling(kind),
                ))
            }
            _ => self.engine.config.timeouts.for_kind(kind),
        };

        let key = RequestKey::new(session.client_id(), request_id);
        Arc::new(
            Request::new(key, params, shape, self.engine.now())
                .with_timeout(timeout)
                .with_hooks(hooks),
        )
    }

    // Cancellation

    /// Cancel an active request. Returns false if it was not active.
    pub fn cancel(&self, request: &RequestHandle, reason: CancelReason) -> bool {
        self.engine.cancel(request, reason)
    }

    /// Cancel every active request except orders
    pub fn cancel_all_requests(&self) -> usize {
        self.cancel_active(|request| request.kind() != RequestKind::PlaceOrder)
    }

    pub fn cancel_all_orders(&self) -> usize {
        self.cancel_active(|request| request.kind() == RequestKind::PlaceOrder)
    }

    /// Cancel the active orders of one instrument and bucket
    pub fn cancel_orders_for(
        &self,
        instrument: &InstrumentKey,
        bucket: OrderBucket,
        reason: CancelReason,
    ) -> usize {
        self.engine
            .orders
            .active(instrument, bucket)
            .iter()
            .filter(|request| self.engine.cancel(*request, reason.clone()))
            .count()
    }

    fn cancel_active(&self, select: impl Fn(&RequestHandle) -> bool) -> usize {
        let cancelled = self
            .engine
            .active_requests()
            .iter()
            .filter(|request| select(*request))
            .filter(|request| self.engine.cancel(*request, CancelReason::Finish))
            .count();
        if cancelled > 0 {
            info!("Cancelled {} requests", cancelled);
        }
        cancelled
    }

    // Queries

    /// Started, non-terminal requests across every session
    pub fn active_requests(&self) -> Vec<RequestHandle> {
        self.engine.active_requests()
    }

    pub fn request(&self, key: RequestKey) -> Option<RequestHandle> {
        self.engine
            .pool
            .get(key.client_id)
            .ok()
            .and_then(|session| session.request(key.request_id))
    }

    pub fn in_flight(&self, kind: RequestKind) -> usize {
        self.engine.admission.in_flight(kind)
    }

    pub fn queued(&self, kind: RequestKind) -> usize {
        self.engine.admission.queued(kind)
    }

    pub fn ceiling(&self, kind: RequestKind) -> Option<usize> {
        self.engine.admission.ceiling(kind)
    }

    pub fn last_dispatched(&self, kind: RequestKind) -> Option<RequestKey> {
        self.engine.admission.last_dispatched(kind)
    }

    /// The most recent market data stream requested for `instrument`
    pub fn market_data_for(&self, instrument: &InstrumentKey) -> Option<RequestHandle> {
        self.engine
            .market_data
            .get(instrument)
            .map(|entry| entry.value().clone())
    }

    pub fn orders_for(&self, instrument: &InstrumentKey, bucket: OrderBucket) -> Vec<RequestHandle> {
        self.engine.orders.get(instrument, bucket)
    }

    pub fn has_active_order(&self, instrument: &InstrumentKey, bucket: OrderBucket) -> bool {
        self.engine.orders.has_active(instrument, bucket)
    }

    pub fn is_queued_for(&self, kind: RequestKind, instrument: &InstrumentKey) -> bool {
        self.engine.admission.is_queued_for(kind, instrument)
    }

    /// False while the request is busy; otherwise true unless its kind has
    /// slack and nothing queued
    pub fn worth_cancelling(&self, request: &RequestHandle) -> bool {
        self.engine.worth_cancelling(request)
    }

    /// Drop terminal requests from every table and index
    pub fn prune_terminal(&self) -> usize {
        self.engine.prune_terminal()
    }

    pub fn set_unattributed_commission_hook(
        &self,
        hook: impl Fn(&CommissionReport) + Send + Sync + 'static,
    ) {
        self.engine.set_unattributed_commission_hook(Arc::new(hook));
    }

    // Helpers

    /// Request bars for every entry of `batch` as one load group and wait up
    /// to `wait` for them. Returns the bars of the requests that finished;
    /// the rest stay active. Needs the sweep running when historical data is
    /// limited.
    pub fn fetch_historical_batch(
        &self,
        batch: Vec<HistoricalParams>,
        wait: Duration,
    ) -> Result<Vec<(InstrumentKey, Vec<Bar>)>> {
        let load_factor = batch.len();
        let requests = batch
            .into_iter()
            .map(|params| self.request_historical_data(params, load_factor, RequestHooks::new()))
            .collect::<Result<Vec<_>>>()?;

        let until = Instant::now() + wait;
        let mut bars = Vec::with_capacity(requests.len());
        for request in requests {
            request.wait(until.saturating_duration_since(Instant::now()));
            if !request.is_finished() {
                debug!("Historical {} not finished in time", request.key());
                continue;
            }
            if let Some(instrument) = request.instrument_key() {
                bars.push((instrument, request.bars()));
            }
        }
        Ok(bars)
    }

    /// Bring the set of running quote streams in line with `wanted`.
    ///
    /// Unwanted stock streams are cancelled outright; unwanted option
    /// streams only when [`Scheduler::worth_cancelling`] says so. Wanted
    /// instruments with no running or queued stream are requested with
    /// `hooks`.
    pub fn reconcile_market_data(
        &self,
        wanted: &[Contract],
        hooks: RequestHooks,
    ) -> Result<MarketDataReconcile> {
        let wanted_keys: HashSet<InstrumentKey> =
            wanted.iter().map(Contract::instrument_key).collect();
        let mut report = MarketDataReconcile::default();
        let mut running = HashSet::new();

        let streams = self
            .engine
            .active_requests()
            .into_iter()
            .filter(|request| request.kind() == RequestKind::MarketData);
        for request in streams {
            let Some(instrument) = request.instrument_key() else {
                continue;
            };
            if wanted_keys.contains(&instrument) {
                report.kept += 1;
                running.insert(instrument);
                continue;
            }
            if instrument.is_option() && !self.engine.worth_cancelling(&request) {
                report.deferred += 1;
                continue;
            }
            if self.engine.cancel(&request, CancelReason::Unselected) {
                report.cancelled += 1;
            }
        }

        for contract in wanted {
            let instrument = contract.instrument_key();
            if running.contains(&instrument)
                || self.is_queued_for(RequestKind::MarketData, &instrument)
            {
                continue;
            }
            running.insert(instrument);
            let request =
                self.request_market_data(MarketDataParams::streaming(contract.clone()), hooks.clone())?;
            report.requested.push(request);
        }

        info!(
            "Market data reconciled: {} kept, {} cancelled, {} deferred, {} requested",
            report.kept,
            report.cancelled,
            report.deferred,
            report.requested.len()
        );
        Ok(report)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("sessions", &self.engine.pool.sessions().len())
            .field("running", &self.is_running())
            .finish()
    }
}

fn check_order(order: &Order) -> Result<()> {
    if order.validate() {
        return Ok(());
    }
    Err(Error::InvalidOrder(format!(
        "{:?} {:?} of {} is missing a price or has no quantity",
        order.order_type, order.action, order.quantity
    )))
}
