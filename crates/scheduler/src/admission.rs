//! Per-kind admission control
//!
//! Each limited kind owns one [`AdmissionRecord`]: its ceiling and a mutex
//! guarding the in-flight set and the FIFO queue together. There is no lock
//! across kinds. The set of limited kinds is fixed at construction, so
//! looking a record up never locks anything.
//!
//! The in-flight set is keyed by request, which makes release idempotent: a
//! request is counted when its send succeeds and uncounted by whichever
//! terminal path removes it first.

use log::trace;
use matrix_core::{InstrumentKey, RequestHandle, RequestKey, RequestKind};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};

/// Counter and queue of one limited kind
#[derive(Debug, Default)]
pub struct AdmissionState {
    in_flight: HashMap<RequestKey, RequestHandle>,
    queue: VecDeque<RequestHandle>,
    last_dispatched: Option<RequestKey>,
}

impl AdmissionState {
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn last_dispatched(&self) -> Option<RequestKey> {
        self.last_dispatched
    }

    pub fn pop_next(&mut self) -> Option<RequestHandle> {
        self.queue.pop_front()
    }

    pub fn admit(&mut self, request: RequestHandle) {
        self.last_dispatched = Some(request.key());
        self.in_flight.insert(request.key(), request);
    }

    /// Drop `key` from the in-flight set; false if it was not counted
    pub fn release(&mut self, key: &RequestKey) -> bool {
        self.in_flight.remove(key).is_some()
    }

    /// Take a still-queued request out of the queue
    pub fn withdraw(&mut self, key: &RequestKey) -> Option<RequestHandle> {
        let position = self.queue.iter().position(|request| request.key() == *key)?;
        self.queue.remove(position)
    }

    pub fn in_flight_requests(&self) -> Vec<RequestHandle> {
        self.in_flight.values().cloned().collect()
    }

    pub fn queued_requests(&self) -> Vec<RequestHandle> {
        self.queue.iter().cloned().collect()
    }
}

#[derive(Debug)]
pub struct AdmissionRecord {
    kind: RequestKind,
    ceiling: usize,
    state: Mutex<AdmissionState>,
}

impl AdmissionRecord {
    pub fn new(kind: RequestKind, ceiling: usize) -> Self {
        Self {
            kind,
            ceiling,
            state: Mutex::new(AdmissionState::default()),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        self.state.lock()
    }

    /// Whether a slot is free in `state`
    pub fn has_capacity(&self, state: &AdmissionState) -> bool {
        state.in_flight() < self.ceiling
    }

    /// Whether reclaiming an overdue request would unblock anyone: the kind
    /// is at its ceiling minus one or more, or something is waiting.
    pub fn under_pressure(&self, state: &AdmissionState) -> bool {
        state.in_flight() + 1 >= self.ceiling || state.queued() > 0
    }
}

/// All admission records, one per limited kind
#[derive(Debug, Default)]
pub struct Admission {
    records: HashMap<RequestKind, AdmissionRecord>,
}

impl Admission {
    pub fn new(ceilings: &HashMap<RequestKind, usize>) -> Self {
        let records = ceilings
            .iter()
            .map(|(kind, ceiling)| (*kind, AdmissionRecord::new(*kind, *ceiling)))
            .collect();
        Self { records }
    }

    pub fn record(&self, kind: RequestKind) -> Option<&AdmissionRecord> {
        self.records.get(&kind)
    }

    pub fn is_limited(&self, kind: RequestKind) -> bool {
        self.records.contains_key(&kind)
    }

    pub fn ceiling(&self, kind: RequestKind) -> Option<usize> {
        self.record(kind).map(AdmissionRecord::ceiling)
    }

    /// Limited kinds in a stable order
    pub fn limited_kinds(&self) -> Vec<RequestKind> {
        let mut kinds: Vec<_> = self.records.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Append to the kind's FIFO; false if the kind is unlimited
    pub fn enqueue(&self, request: RequestHandle) -> bool {
        let Some(record) = self.record(request.kind()) else {
            return false;
        };
        let mut state = record.lock();
        trace!(
            "queue {} {} behind {}",
            request.kind(),
            request.key(),
            state.queued()
        );
        state.queue.push_back(request);
        true
    }

    /// Uncount a request that reached a terminal state; returns true if it
    /// had been counted
    pub fn release(&self, kind: RequestKind, key: &RequestKey) -> bool {
        self.record(kind)
            .is_some_and(|record| record.lock().release(key))
    }

    /// Remove a request from its kind's queue; true if it was waiting there
    pub fn withdraw(&self, kind: RequestKind, key: &RequestKey) -> bool {
        self.record(kind)
            .is_some_and(|record| record.lock().withdraw(key).is_some())
    }

    pub fn in_flight(&self, kind: RequestKind) -> usize {
        self.record(kind).map_or(0, |record| record.lock().in_flight())
    }

    pub fn queued(&self, kind: RequestKind) -> usize {
        self.record(kind).map_or(0, |record| record.lock().queued())
    }

    pub fn last_dispatched(&self, kind: RequestKind) -> Option<RequestKey> {
        self.record(kind)
            .and_then(|record| record.lock().last_dispatched())
    }

    /// Whether a request for `instrument` is still waiting in the kind's queue
    pub fn is_queued_for(&self, kind: RequestKind, instrument: &InstrumentKey) -> bool {
        self.record(kind).is_some_and(|record| {
            record
                .lock()
                .queue
                .iter()
                .any(|request| request.instrument_key().as_ref() == Some(instrument))
        })
    }
}
