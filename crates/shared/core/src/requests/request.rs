//! The request state machine.
//!
//! A `Request` is shared between the submitting thread, the sweep thread and
//! the session callback thread. Lifecycle transitions go through a single
//! per-request lock, so exactly one terminal transition ever wins: callers
//! use the `bool` returned by [`Request::finish`], [`Request::cancel`] and
//! [`Request::fail`] to decide whether they own the follow-up accounting.
//!
//! Lock order is `lifecycle` then `body`. Hooks are invoked with no lock held.

use log::trace;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CancelReason, Payload, RequestKind, RequestParams, RequestState};
use crate::entities::InstrumentKey;
use crate::remote::RemoteError;
use crate::requests::payload::{Bar, CommissionReport, Execution, OrderStatusUpdate, Tick};
use crate::values::{ClientId, RequestId, RequestKey, Timestamp};

/// Shared handle returned by every submission
pub type RequestHandle = Arc<Request>;

/// Post-processing hook, called for every payload the request stores
pub type DataHook = Arc<dyn Fn(&Request, &Payload) + Send + Sync>;

/// Called once the request finished normally
pub type CompleteHook = Arc<dyn Fn(&Request) + Send + Sync>;

/// Called for every remote error attached to the request
pub type ErrorHook = Arc<dyn Fn(&Request, &RemoteError) + Send + Sync>;

/// While true, the request is exempt from timeout reclamation
pub type BusyCheck = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Caller-supplied handler bindings
#[derive(Clone, Default)]
pub struct RequestHooks {
    pub on_data: Option<DataHook>,
    pub on_complete: Option<CompleteHook>,
    pub on_error: Option<ErrorHook>,
    pub busy: Option<BusyCheck>,
}

impl RequestHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_data(mut self, hook: impl Fn(&Request, &Payload) + Send + Sync + 'static) -> Self {
        self.on_data = Some(Arc::new(hook));
        self
    }

    pub fn on_complete(mut self, hook: impl Fn(&Request) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_error(
        mut self,
        hook: impl Fn(&Request, &RemoteError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn busy(mut self, check: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.busy = Some(Arc::new(check));
        self
    }
}

/// Shape of the data a request accumulates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    /// Every payload appended to one buffer
    Plain,
    /// Price and size ticks kept in separate sequences
    Stream,
    /// Order status, execution and commission events
    Order,
}

/// Events accumulated by an order request
#[derive(Debug, Clone, Default)]
pub struct OrderTrail {
    pub statuses: Vec<OrderStatusUpdate>,
    pub executions: Vec<Execution>,
    pub commissions: Vec<CommissionReport>,
    /// Protective order placed alongside this one
    pub child: Option<RequestId>,
}

#[derive(Debug)]
enum RequestBody {
    Plain { data: Vec<Payload> },
    Stream { prices: Vec<Tick>, sizes: Vec<Tick> },
    Order(OrderTrail),
}

impl RequestBody {
    fn new(shape: BodyShape) -> Self {
        match shape {
            BodyShape::Plain => RequestBody::Plain { data: Vec::new() },
            BodyShape::Stream => RequestBody::Stream {
                prices: Vec::new(),
                sizes: Vec::new(),
            },
            BodyShape::Order => RequestBody::Order(OrderTrail::default()),
        }
    }

    /// Store a payload. Returns false if this body has no place for it.
    fn store(&mut self, payload: &Payload) -> bool {
        match self {
            RequestBody::Plain { data } => {
                data.push(payload.clone());
                true
            }
            RequestBody::Stream { prices, sizes } => match payload {
                Payload::PriceTick(tick) => {
                    prices.push(tick.clone());
                    true
                }
                Payload::SizeTick(tick) => {
                    sizes.push(tick.clone());
                    true
                }
                _ => false,
            },
            RequestBody::Order(trail) => match payload {
                Payload::OrderStatus(status) => {
                    trail.statuses.push(status.clone());
                    true
                }
                Payload::Execution(execution) => {
                    trail.executions.push(execution.clone());
                    true
                }
                Payload::Commission(report) => {
                    trail.commissions.push(report.clone());
                    true
                }
                _ => false,
            },
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: RequestState,
    reason: Option<CancelReason>,
    created_at: Timestamp,
    start_time: Option<Timestamp>,
    deadline: Option<Timestamp>,
    end_time: Option<Timestamp>,
    errors: Vec<RemoteError>,
}

/// A typed unit of work sent to the venue
pub struct Request {
    key: RequestKey,
    kind: RequestKind,
    params: RequestParams,
    timeout: Option<Duration>,
    shape: BodyShape,
    hooks: RequestHooks,
    lifecycle: Mutex<Lifecycle>,
    body: Mutex<RequestBody>,
    settled: Condvar,
}

impl Request {
    pub fn new(key: RequestKey, params: RequestParams, shape: BodyShape, now: Timestamp) -> Self {
        Self {
            key,
            kind: params.kind(),
            params,
            timeout: None,
            shape,
            hooks: RequestHooks::default(),
            lifecycle: Mutex::new(Lifecycle {
                state: RequestState::Created,
                reason: None,
                created_at: now,
                start_time: None,
                deadline: None,
                end_time: None,
                errors: Vec::new(),
            }),
            body: Mutex::new(RequestBody::new(shape)),
            settled: Condvar::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_hooks(mut self, hooks: RequestHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn key(&self) -> RequestKey {
        self.key
    }

    pub fn id(&self) -> RequestId {
        self.key.request_id
    }

    pub fn client_id(&self) -> ClientId {
        self.key.client_id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub fn shape(&self) -> BodyShape {
        self.shape
    }

    pub fn hooks(&self) -> &RequestHooks {
        &self.hooks
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn instrument_key(&self) -> Option<InstrumentKey> {
        self.params.instrument_key()
    }

    pub fn state(&self) -> RequestState {
        self.lifecycle.lock().state
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.lifecycle.lock().reason.clone()
    }

    pub fn is_started(&self) -> bool {
        self.state() != RequestState::Created && self.state() != RequestState::Queued
    }

    pub fn is_finished(&self) -> bool {
        self.state() == RequestState::Finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == RequestState::Cancelled
    }

    pub fn is_timed_out(&self) -> bool {
        self.state() == RequestState::TimedOut
    }

    pub fn is_errored(&self) -> bool {
        self.state() == RequestState::Errored
    }

    /// Started and not yet terminal
    pub fn is_active(&self) -> bool {
        self.state() == RequestState::Started
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether the caller's busy predicate reports ongoing useful work
    pub fn is_busy(&self) -> bool {
        self.hooks.busy.as_ref().is_some_and(|check| check(self))
    }

    pub fn created_at(&self) -> Timestamp {
        self.lifecycle.lock().created_at
    }

    pub fn start_time(&self) -> Option<Timestamp> {
        self.lifecycle.lock().start_time
    }

    pub fn deadline(&self) -> Option<Timestamp> {
        self.lifecycle.lock().deadline
    }

    pub fn end_time(&self) -> Option<Timestamp> {
        self.lifecycle.lock().end_time
    }

    /// Deadline set and already passed
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.deadline().is_some_and(|deadline| deadline < now)
    }

    /// `Created → Queued`
    pub fn mark_queued(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != RequestState::Created {
            return false;
        }
        lifecycle.state = RequestState::Queued;
        true
    }

    /// `Created | Queued → Started`; the deadline is computed from `now`.
    pub fn start(&self, now: Timestamp) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(
            lifecycle.state,
            RequestState::Created | RequestState::Queued
        ) {
            return false;
        }
        lifecycle.state = RequestState::Started;
        lifecycle.start_time = Some(now);
        lifecycle.deadline = self
            .timeout
            .and_then(|timeout| chrono::Duration::from_std(timeout).ok())
            .and_then(|timeout| now.checked_add_signed(timeout));
        true
    }

    /// Normal completion of an active request. Returns true if this call
    /// made the request terminal.
    pub fn finish(&self, now: Timestamp) -> bool {
        self.settle(RequestState::Finished, None, now, true)
    }

    /// Cancel an active request. Lands in `TimedOut` or `Errored` for those
    /// reasons, `Cancelled` otherwise. No-op unless the request is active.
    pub fn cancel(&self, reason: CancelReason, now: Timestamp) -> bool {
        let target = reason.terminal_state();
        self.settle(target, Some(reason), now, true)
    }

    /// Remote error on an active request
    pub fn fail(&self, now: Timestamp) -> bool {
        self.settle(RequestState::Errored, Some(CancelReason::Error), now, true)
    }

    /// Local refusal. The only way to leave `Created` or `Queued` without
    /// starting.
    pub fn reject(&self, now: Timestamp) -> bool {
        self.settle(RequestState::Errored, Some(CancelReason::Error), now, false)
    }

    fn settle(
        &self,
        target: RequestState,
        reason: Option<CancelReason>,
        now: Timestamp,
        require_active: bool,
    ) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.is_terminal() {
            return false;
        }
        if require_active && lifecycle.state != RequestState::Started {
            return false;
        }
        trace!(
            "request {} ({}) {} -> {}",
            self.key, self.kind, lifecycle.state, target
        );
        lifecycle.state = target;
        lifecycle.reason = reason;
        lifecycle.end_time = Some(now);
        drop(lifecycle);
        self.settled.notify_all();
        true
    }

    pub fn record_error(&self, error: RemoteError) {
        self.lifecycle.lock().errors.push(error);
    }

    pub fn errors(&self) -> Vec<RemoteError> {
        self.lifecycle.lock().errors.clone()
    }

    /// Store an inbound payload and forward it to the data hook.
    ///
    /// Plain and stream requests only accept data while active. Order
    /// requests accept every event: status and fill reports keep arriving
    /// after a cancel has been sent.
    pub fn ingest(&self, payload: &Payload) -> bool {
        let stored = {
            let lifecycle = self.lifecycle.lock();
            if self.shape != BodyShape::Order && lifecycle.state != RequestState::Started {
                false
            } else {
                self.body.lock().store(payload)
            }
        };
        if !stored {
            trace!(
                "request {} dropped {} payload in state {}",
                self.key,
                payload.name(),
                self.state()
            );
            return false;
        }
        if let Some(hook) = &self.hooks.on_data {
            hook(self, payload);
        }
        true
    }

    /// Everything accumulated by a plain request
    pub fn data(&self) -> Vec<Payload> {
        match &*self.body.lock() {
            RequestBody::Plain { data } => data.clone(),
            _ => Vec::new(),
        }
    }

    pub fn data_len(&self) -> usize {
        match &*self.body.lock() {
            RequestBody::Plain { data } => data.len(),
            RequestBody::Stream { prices, sizes } => prices.len() + sizes.len(),
            RequestBody::Order(trail) => {
                trail.statuses.len() + trail.executions.len() + trail.commissions.len()
            }
        }
    }

    /// Historical bars accumulated by a plain request
    pub fn bars(&self) -> Vec<Bar> {
        match &*self.body.lock() {
            RequestBody::Plain { data } => data
                .iter()
                .filter_map(|payload| match payload {
                    Payload::Bar(bar) => Some(bar.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn prices(&self) -> Vec<Tick> {
        match &*self.body.lock() {
            RequestBody::Stream { prices, .. } => prices.clone(),
            _ => Vec::new(),
        }
    }

    pub fn sizes(&self) -> Vec<Tick> {
        match &*self.body.lock() {
            RequestBody::Stream { sizes, .. } => sizes.clone(),
            _ => Vec::new(),
        }
    }

    pub fn order_trail(&self) -> Option<OrderTrail> {
        match &*self.body.lock() {
            RequestBody::Order(trail) => Some(trail.clone()),
            _ => None,
        }
    }

    pub fn last_order_status(&self) -> Option<OrderStatusUpdate> {
        match &*self.body.lock() {
            RequestBody::Order(trail) => trail.statuses.last().cloned(),
            _ => None,
        }
    }

    pub fn child(&self) -> Option<RequestId> {
        match &*self.body.lock() {
            RequestBody::Order(trail) => trail.child,
            _ => None,
        }
    }

    /// Link the protective order spawned alongside this one
    pub fn set_child(&self, child: RequestId) -> bool {
        match &mut *self.body.lock() {
            RequestBody::Order(trail) => {
                trail.child = Some(child);
                true
            }
            _ => false,
        }
    }

    /// Block until the request is terminal or `timeout` elapses.
    ///
    /// Returns the terminal state, or `None` on timeout.
    pub fn wait(&self, timeout: Duration) -> Option<RequestState> {
        let until = Instant::now() + timeout;
        let mut lifecycle = self.lifecycle.lock();
        while !lifecycle.state.is_terminal() {
            let now = Instant::now();
            if now >= until {
                return None;
            }
            self.settled.wait_for(&mut lifecycle, until - now);
        }
        Some(lifecycle.state)
    }

    /// Block until the request is terminal
    pub fn wait_terminal(&self) -> RequestState {
        let mut lifecycle = self.lifecycle.lock();
        while !lifecycle.state.is_terminal() {
            self.settled.wait(&mut lifecycle);
        }
        lifecycle.state
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Contract, Order, Side};
    use crate::requests::params::MarketDataParams;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    fn key(id: i64) -> RequestKey {
        RequestKey::new(ClientId(1), RequestId(id))
    }

    fn tick(value: rust_decimal::Decimal) -> Tick {
        Tick {
            time: t0(),
            field: "LAST".to_string(),
            value,
        }
    }

    fn stream_request() -> Request {
        Request::new(
            key(1),
            RequestParams::MarketData(MarketDataParams::streaming(Contract::stock("AAPL"))),
            BodyShape::Stream,
            t0(),
        )
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let request = Request::new(key(1), RequestParams::Positions, BodyShape::Plain, t0())
            .with_timeout(Some(Duration::from_secs(60)));
        assert_eq!(request.state(), RequestState::Created);
        assert!(request.mark_queued());
        assert!(!request.is_active());
        assert!(request.start(t0()));
        assert!(request.is_active());
        assert_eq!(
            request.deadline(),
            Some(t0() + chrono::Duration::seconds(60))
        );
        assert!(request.finish(t0()));
        assert!(request.is_finished());
        assert!(request.end_time().is_some());
    }

    #[test]
    fn test_terminal_states_absorb() {
        let request = Request::new(key(1), RequestParams::Positions, BodyShape::Plain, t0());
        request.start(t0());
        assert!(request.cancel(CancelReason::TimedOut, t0()));
        assert!(request.is_timed_out());

        assert!(!request.finish(t0()));
        assert!(!request.fail(t0()));
        assert!(!request.cancel(CancelReason::Finish, t0()));
        assert!(!request.start(t0()));
        assert_eq!(request.state(), RequestState::TimedOut);
        assert_eq!(request.reason(), Some(CancelReason::TimedOut));
    }

    #[test]
    fn test_remote_transitions_require_started() {
        let request = Request::new(key(1), RequestParams::Positions, BodyShape::Plain, t0());
        request.mark_queued();
        assert!(!request.finish(t0()));
        assert!(!request.fail(t0()));
        assert_eq!(request.state(), RequestState::Queued);
        assert_eq!(request.end_time(), None);

        assert!(request.reject(t0()));
        assert!(request.is_errored());
        assert!(!request.start(t0()));
    }

    #[test]
    fn test_cancel_requires_active() {
        let request = Request::new(key(1), RequestParams::Positions, BodyShape::Plain, t0());
        request.mark_queued();
        assert!(!request.cancel(CancelReason::Unselected, t0()));
        assert_eq!(request.state(), RequestState::Queued);
    }

    #[test]
    fn test_cancel_reason_maps_to_state() {
        let request = Request::new(key(1), RequestParams::Positions, BodyShape::Plain, t0());
        request.start(t0());
        request.cancel(CancelReason::Error, t0());
        assert!(request.is_errored());

        let request = Request::new(key(2), RequestParams::Positions, BodyShape::Plain, t0());
        request.start(t0());
        request.cancel(CancelReason::Caller("manual".into()), t0());
        assert!(request.is_cancelled());
        assert_eq!(request.reason().unwrap().to_string(), "manual");
    }

    #[test]
    fn test_no_deadline_without_timeout() {
        let request = Request::new(key(1), RequestParams::Positions, BodyShape::Plain, t0());
        request.start(t0());
        assert_eq!(request.deadline(), None);
        assert!(!request.is_overdue(t0() + chrono::Duration::days(365)));
    }

    #[test]
    fn test_overdue_after_deadline() {
        let request = Request::new(key(1), RequestParams::Positions, BodyShape::Plain, t0())
            .with_timeout(Some(Duration::from_secs(1)));
        request.start(t0());
        assert!(!request.is_overdue(t0() + chrono::Duration::seconds(1)));
        assert!(request.is_overdue(t0() + chrono::Duration::seconds(2)));
    }

    #[test]
    fn test_stream_separates_prices_and_sizes() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_hook = seen.clone();
        let request = stream_request().with_hooks(RequestHooks::new().on_data(move |_, _| {
            seen_hook.fetch_add(1, Ordering::SeqCst);
        }));
        request.start(t0());

        assert!(request.ingest(&Payload::PriceTick(tick(dec!(10)))));
        assert!(request.ingest(&Payload::SizeTick(tick(dec!(300)))));
        assert!(request.ingest(&Payload::PriceTick(tick(dec!(11)))));

        assert_eq!(request.prices().len(), 2);
        assert_eq!(request.sizes().len(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_data_after_terminal_is_dropped() {
        let request = stream_request();
        assert!(!request.ingest(&Payload::PriceTick(tick(dec!(10)))));
        request.start(t0());
        request.cancel(CancelReason::Unselected, t0());
        assert!(!request.ingest(&Payload::PriceTick(tick(dec!(10)))));
        assert!(request.prices().is_empty());
    }

    #[test]
    fn test_order_accepts_events_after_cancel() {
        let request = Request::new(
            key(5),
            RequestParams::PlaceOrder {
                contract: Contract::stock("AAPL"),
                order: Order::market(Side::Buy, dec!(1)),
            },
            BodyShape::Order,
            t0(),
        );
        request.start(t0());
        request.cancel(CancelReason::Finish, t0());

        let status = OrderStatusUpdate {
            time: t0(),
            status: "Cancelled".to_string(),
            filled: dec!(0),
            remaining: dec!(1),
            avg_fill_price: dec!(0),
            last_fill_price: dec!(0),
            perm_id: 1,
            parent_id: 0,
            why_held: String::new(),
        };
        assert!(request.ingest(&Payload::OrderStatus(status)));
        assert_eq!(request.order_trail().unwrap().statuses.len(), 1);
        assert!(request.set_child(RequestId(6)));
        assert_eq!(request.child(), Some(RequestId(6)));
    }

    #[test]
    fn test_busy_check() {
        let request = stream_request().with_hooks(RequestHooks::new().busy(|r| r.prices().len() < 2));
        request.start(t0());
        assert!(request.is_busy());
        request.ingest(&Payload::PriceTick(tick(dec!(1))));
        request.ingest(&Payload::PriceTick(tick(dec!(2))));
        assert!(!request.is_busy());
    }

    #[test]
    fn test_wait_wakes_on_terminal() {
        let request = Arc::new(Request::new(
            key(1),
            RequestParams::Positions,
            BodyShape::Plain,
            t0(),
        ));
        request.start(t0());
        assert_eq!(request.wait(Duration::from_millis(10)), None);

        let finisher = request.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            finisher.finish(t0());
        });

        assert_eq!(
            request.wait(Duration::from_secs(5)),
            Some(RequestState::Finished)
        );
        handle.join().unwrap();
        assert_eq!(request.wait_terminal(), RequestState::Finished);
    }

    #[test]
    fn test_single_terminal_winner_under_contention() {
        let request = Arc::new(Request::new(
            key(1),
            RequestParams::Positions,
            BodyShape::Plain,
            t0(),
        ));
        request.start(t0());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let request = request.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    let won = if i % 2 == 0 {
                        request.finish(t0())
                    } else {
                        request.cancel(CancelReason::TimedOut, t0())
                    };
                    if won {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(request.is_terminal());
    }
}
