//! Session pool
//!
//! Owns every open session, its correlation table and its callback thread,
//! and maps each request kind to the sessions allowed to serve it.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use dashmap::DashMap;
use log::{debug, info, warn};
use matrix_core::{
    ClientId, RequestHandle, RequestId, RequestKind, SingletonSlot, Timestamp,
};
use matrix_ports::{EventSink, Session, SessionEvent};
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

/// How long the callback thread blocks before re-checking its shutdown flag
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One open session and everything correlated with it
pub struct SessionHandle {
    client_id: ClientId,
    name: String,
    transport: Arc<dyn Session>,
    kinds: Vec<RequestKind>,
    requests: DashMap<RequestId, RequestHandle>,
    singletons: Mutex<HashMap<SingletonSlot, RequestHandle>>,
    /// Execution id -> order id, for commission routing
    executions: DashMap<String, RequestId>,
    needs_reconnect: AtomicBool,
    last_activity: Mutex<Option<Timestamp>>,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    fn new(
        client_id: ClientId,
        name: String,
        transport: Arc<dyn Session>,
        kinds: Vec<RequestKind>,
    ) -> Self {
        Self {
            client_id,
            name,
            transport,
            kinds,
            requests: DashMap::new(),
            singletons: Mutex::new(HashMap::new()),
            executions: DashMap::new(),
            needs_reconnect: AtomicBool::new(false),
            last_activity: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<dyn Session> {
        &self.transport
    }

    pub fn kinds(&self) -> &[RequestKind] {
        &self.kinds
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    // Correlation table

    pub fn register(&self, request: RequestHandle) {
        self.requests.insert(request.id(), request);
    }

    pub fn request(&self, request_id: RequestId) -> Option<RequestHandle> {
        self.requests.get(&request_id).map(|entry| entry.value().clone())
    }

    pub fn requests(&self) -> Vec<RequestHandle> {
        self.requests
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Evict terminal requests; returns how many were removed
    pub fn prune_terminal(&self) -> usize {
        let before = self.requests.len();
        self.requests.retain(|_, request| !request.is_terminal());
        self.singletons
            .lock()
            .retain(|_, request| !request.is_terminal());
        let live: std::collections::HashSet<RequestId> =
            self.requests.iter().map(|entry| *entry.key()).collect();
        self.executions.retain(|_, order_id| live.contains(order_id));
        before - self.requests.len()
    }

    // Singleton slots

    /// The non-terminal request occupying `slot`, or the one `create` builds.
    ///
    /// Returns `(request, created)`.
    pub fn singleton_or_insert(
        &self,
        slot: SingletonSlot,
        create: impl FnOnce() -> RequestHandle,
    ) -> (RequestHandle, bool) {
        let mut slots = self.singletons.lock();
        if let Some(existing) = slots.get(&slot).filter(|request| !request.is_terminal()) {
            return (existing.clone(), false);
        }
        let request = create();
        slots.insert(slot, request.clone());
        (request, true)
    }

    pub fn singleton(&self, slot: SingletonSlot) -> Option<RequestHandle> {
        self.singletons.lock().get(&slot).cloned()
    }

    // Executions

    pub fn record_execution(&self, exec_id: &str, order_id: RequestId) {
        self.executions.insert(exec_id.to_string(), order_id);
    }

    pub fn order_for_execution(&self, exec_id: &str) -> Option<RequestId> {
        self.executions.get(exec_id).map(|entry| *entry.value())
    }

    // Health

    pub fn flag_reconnect(&self) {
        self.needs_reconnect.store(true, Ordering::SeqCst);
    }

    pub fn clear_reconnect(&self) {
        self.needs_reconnect.store(false, Ordering::SeqCst);
    }

    pub fn needs_reconnect(&self) -> bool {
        self.needs_reconnect.load(Ordering::SeqCst)
    }

    pub fn touch(&self, now: Timestamp) {
        *self.last_activity.lock() = Some(now);
    }

    pub fn last_activity(&self) -> Option<Timestamp> {
        *self.last_activity.lock()
    }

    // Callback thread

    fn spawn_callbacks<F>(self: &Arc<Self>, events: Receiver<SessionEvent>, on_event: F)
    where
        F: Fn(ClientId, SessionEvent) + Send + 'static,
    {
        let client_id = self.client_id;
        let shutdown = self.shutdown.clone();

        let handle = thread::Builder::new()
            .name(format!("matrix-session-{}", client_id))
            .spawn(move || Self::callback_loop(client_id, events, on_event, shutdown))
            .expect("Failed to spawn session callback thread");

        *self.thread.lock() = Some(handle);
    }

    fn callback_loop<F>(
        client_id: ClientId,
        events: Receiver<SessionEvent>,
        on_event: F,
        shutdown: Arc<AtomicBool>,
    ) where
        F: Fn(ClientId, SessionEvent),
    {
        debug!("Session {} callback thread started", client_id);
        let mut delivered: u64 = 0;

        while !shutdown.load(Ordering::Relaxed) {
            match events.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(event) => {
                    on_event(client_id, event);
                    delivered += 1;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!(
            "Session {} callback thread stopped after {} events",
            client_id, delivered
        );
    }

    /// Disconnect and stop the callback thread
    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.transport.disconnect();

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            // Closing from inside a callback must not join itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Session {} callback thread panicked", self.client_id);
            }
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("client_id", &self.client_id)
            .field("name", &self.name)
            .field("kinds", &self.kinds)
            .field("requests", &self.requests.len())
            .field("needs_reconnect", &self.needs_reconnect())
            .finish()
    }
}

/// All open sessions and the kind -> eligible sessions map
pub struct SessionPool {
    sessions: DashMap<ClientId, Arc<SessionHandle>>,
    eligible: RwLock<HashMap<RequestKind, Vec<ClientId>>>,
    next_client_id: AtomicU32,
}

impl SessionPool {
    pub fn new(first_client_id: u32) -> Self {
        Self {
            sessions: DashMap::new(),
            eligible: RwLock::new(HashMap::new()),
            next_client_id: AtomicU32::new(first_client_id),
        }
    }

    /// Connect `transport`, start its callback thread and make it eligible
    /// for `kinds`. Without an explicit id the next sequential one is used.
    pub fn create_session<F>(
        &self,
        name: &str,
        kinds: &[RequestKind],
        transport: Arc<dyn Session>,
        client_id: Option<ClientId>,
        on_event: F,
    ) -> Result<ClientId>
    where
        F: Fn(ClientId, SessionEvent) + Send + 'static,
    {
        let client_id = match client_id {
            Some(id) => {
                self.next_client_id
                    .fetch_max(id.0.saturating_add(1), Ordering::SeqCst);
                id
            }
            None => ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst)),
        };
        if self.sessions.contains_key(&client_id) {
            return Err(Error::DuplicateSession { client_id });
        }

        let (sink, events) = EventSink::channel();
        transport.connect(client_id, sink)?;

        let name = if name.is_empty() {
            transport.name().to_string()
        } else {
            name.to_string()
        };
        let session = Arc::new(SessionHandle::new(
            client_id,
            name,
            transport,
            kinds.to_vec(),
        ));
        session.spawn_callbacks(events, on_event);
        self.sessions.insert(client_id, session.clone());

        {
            let mut eligible = self.eligible.write();
            for kind in kinds {
                let ids = eligible.entry(*kind).or_default();
                if !ids.contains(&client_id) {
                    ids.push(client_id);
                }
            }
        }

        info!(
            "Opened session {} ({}) for {:?}",
            client_id,
            session.name(),
            kinds
        );
        Ok(client_id)
    }

    /// Pick a session for `kind`: the only one, or uniformly at random
    pub fn select(&self, kind: RequestKind) -> Result<Arc<SessionHandle>> {
        let client_id = {
            let eligible = self.eligible.read();
            let ids = eligible
                .get(&kind)
                .filter(|ids| !ids.is_empty())
                .ok_or(Error::NoSession(kind))?;
            match ids.as_slice() {
                [only] => *only,
                many => *many
                    .choose(&mut rand::thread_rng())
                    .ok_or(Error::NoSession(kind))?,
            }
        };
        self.get(client_id)
    }

    pub fn get(&self, client_id: ClientId) -> Result<Arc<SessionHandle>> {
        self.sessions
            .get(&client_id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::UnknownSession(client_id))
    }

    pub fn sessions(&self) -> Vec<Arc<SessionHandle>> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|session| session.client_id());
        sessions
    }

    pub fn eligible(&self, kind: RequestKind) -> Vec<ClientId> {
        self.eligible.read().get(&kind).cloned().unwrap_or_default()
    }

    /// Disconnect a session and remove it from every kind's eligible set
    pub fn close_session(&self, client_id: ClientId) -> Result<()> {
        let (_, session) = self
            .sessions
            .remove(&client_id)
            .ok_or(Error::UnknownSession(client_id))?;

        for ids in self.eligible.write().values_mut() {
            ids.retain(|id| *id != client_id);
        }
        session.shutdown();
        info!("Closed session {} ({})", client_id, session.name());
        Ok(())
    }

    pub fn close_all(&self) {
        let ids: Vec<ClientId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for client_id in ids {
            if let Err(e) = self.close_session(client_id) {
                debug!("Session {} already closed: {}", client_id, e);
            }
        }
    }

    /// `(client id, connected)` for every open session
    pub fn connection_statuses(&self) -> Vec<(ClientId, bool)> {
        self.sessions()
            .iter()
            .map(|session| (session.client_id(), session.is_connected()))
            .collect()
    }

    pub fn sessions_needing_reconnect(&self) -> Vec<ClientId> {
        self.sessions()
            .iter()
            .filter(|session| session.needs_reconnect())
            .map(|session| session.client_id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use matrix_core::{BodyShape, Request, RequestKey, RequestParams};
    use matrix_ports::{SessionError, SessionResult};
    use std::sync::atomic::AtomicI64;

    /// Minimal transport: connects, counts ids, never answers
    #[derive(Default)]
    struct NullSession {
        connected: AtomicBool,
        ids: AtomicI64,
        refuse: bool,
    }

    impl Session for NullSession {
        fn connect(&self, _client_id: ClientId, _sink: EventSink) -> SessionResult<()> {
            if self.refuse {
                return Err(SessionError::Connect("refused".into()));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn next_request_id(&self) -> RequestId {
            RequestId(self.ids.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn send(&self, _request_id: RequestId, _params: &RequestParams) -> SessionResult<()> {
            Ok(())
        }

        fn cancel(&self, _kind: RequestKind, _request_id: RequestId) -> SessionResult<()> {
            Ok(())
        }
    }

    fn open(pool: &SessionPool, kinds: &[RequestKind], id: Option<ClientId>) -> ClientId {
        pool.create_session("", kinds, Arc::new(NullSession::default()), id, |_, _| {})
            .unwrap()
    }

    #[test]
    fn test_sequential_client_ids() {
        let pool = SessionPool::new(123001);
        let a = open(&pool, &[RequestKind::HistoricalData], None);
        let b = open(&pool, &[RequestKind::MarketData], Some(ClientId(200000)));
        let c = open(&pool, &[RequestKind::MarketData], None);
        assert_eq!(a, ClientId(123001));
        assert_eq!(b, ClientId(200000));
        assert_eq!(c, ClientId(200001));
        pool.close_all();
    }

    #[test]
    fn test_select_requires_eligible_session() {
        let pool = SessionPool::new(1);
        assert!(matches!(
            pool.select(RequestKind::Positions),
            Err(Error::NoSession(RequestKind::Positions))
        ));

        let id = open(&pool, &[RequestKind::Positions], None);
        assert_eq!(pool.select(RequestKind::Positions).unwrap().client_id(), id);
        pool.close_all();
    }

    #[test]
    fn test_select_spreads_across_sessions() {
        let pool = SessionPool::new(1);
        let a = open(&pool, &[RequestKind::MarketData], None);
        let b = open(&pool, &[RequestKind::MarketData], None);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(pool.select(RequestKind::MarketData).unwrap().client_id());
        }
        assert_eq!(seen, [a, b].into_iter().collect());
        pool.close_all();
    }

    #[test]
    fn test_close_removes_from_every_kind() {
        let pool = SessionPool::new(1);
        let id = open(
            &pool,
            &[RequestKind::MarketData, RequestKind::PlaceOrder],
            None,
        );
        assert_eq!(pool.connection_statuses(), vec![(id, true)]);

        pool.close_session(id).unwrap();
        assert!(pool.eligible(RequestKind::MarketData).is_empty());
        assert!(pool.eligible(RequestKind::PlaceOrder).is_empty());
        assert!(matches!(
            pool.close_session(id),
            Err(Error::UnknownSession(_))
        ));
    }

    #[test]
    fn test_refused_connect_registers_nothing() {
        let pool = SessionPool::new(1);
        let transport = Arc::new(NullSession {
            refuse: true,
            ..Default::default()
        });
        let result = pool.create_session("", &[RequestKind::MarketData], transport, None, |_, _| {});
        assert!(matches!(result, Err(Error::Session(_))));
        assert!(pool.eligible(RequestKind::MarketData).is_empty());
    }

    #[test]
    fn test_singleton_slot_dedupes_until_terminal() {
        let pool = SessionPool::new(1);
        let id = open(&pool, &[RequestKind::Positions], None);
        let session = pool.get(id).unwrap();

        let make = |n: i64| {
            move || {
                Arc::new(Request::new(
                    RequestKey::new(id, RequestId(n)),
                    RequestParams::Positions,
                    BodyShape::Plain,
                    Utc::now(),
                ))
            }
        };

        let (first, created) = session.singleton_or_insert(SingletonSlot::Positions, make(1));
        assert!(created);
        let (again, created) = session.singleton_or_insert(SingletonSlot::Positions, make(2));
        assert!(!created);
        assert_eq!(again.id(), first.id());

        first.start(Utc::now());
        first.finish(Utc::now());
        let (fresh, created) = session.singleton_or_insert(SingletonSlot::Positions, make(3));
        assert!(created);
        assert_eq!(fresh.id(), RequestId(3));
        pool.close_all();
    }

    #[test]
    fn test_prune_terminal() {
        let pool = SessionPool::new(1);
        let id = open(&pool, &[RequestKind::Positions], None);
        let session = pool.get(id).unwrap();

        let done = Arc::new(Request::new(
            RequestKey::new(id, RequestId(1)),
            RequestParams::Positions,
            BodyShape::Plain,
            Utc::now(),
        ));
        done.start(Utc::now());
        done.finish(Utc::now());
        let live = Arc::new(Request::new(
            RequestKey::new(id, RequestId(2)),
            RequestParams::OpenOrders,
            BodyShape::Plain,
            Utc::now(),
        ));
        live.start(Utc::now());
        session.register(done);
        session.register(live);
        session.record_execution("e1", RequestId(1));

        assert_eq!(session.prune_terminal(), 1);
        assert!(session.request(RequestId(1)).is_none());
        assert!(session.request(RequestId(2)).is_some());
        assert_eq!(session.order_for_execution("e1"), None);
        pool.close_all();
    }
}
