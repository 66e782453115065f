//! Periodic sweep: dispatch queued requests and reclaim overdue ones
//!
//! For each limited kind the sweep first fills free slots from the FIFO
//! queue, then reclaims overdue requests, but only while that kind is under
//! pressure. An overdue request is left alone when nobody is waiting for its
//! slot. Unlimited kinds are scanned afterwards and their overdue requests
//! are timed out unconditionally.

use log::{debug, info, warn};
use matrix_core::{CancelReason, RequestHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::admission::AdmissionRecord;
use crate::engine::Engine;

/// What one sweep pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Queued requests sent to the venue
    pub dispatched: usize,
    /// Overdue requests finalized as timed out
    pub reclaimed: usize,
    /// Queued requests the session refused
    pub rejected: usize,
}

impl SweepReport {
    fn absorb(&mut self, other: SweepReport) {
        self.dispatched += other.dispatched;
        self.reclaimed += other.reclaimed;
        self.rejected += other.rejected;
    }
}

impl Engine {
    /// Run one sweep over every kind
    pub(crate) fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for kind in self.admission.limited_kinds() {
            let Some(record) = self.admission.record(kind) else {
                continue;
            };
            report.absorb(self.dispatch_queued(record));
            report.reclaimed += self.reclaim_limited(record);
        }
        report.reclaimed += self.reclaim_unlimited();

        if report != SweepReport::default() {
            debug!(
                "Sweep: {} dispatched, {} reclaimed, {} rejected",
                report.dispatched, report.reclaimed, report.rejected
            );
        }
        report
    }

    /// Send queued requests, oldest first, while the kind has free slots.
    ///
    /// A request is counted only once its send succeeds. Refused sends are
    /// finalized after the lock is dropped so their hooks run unlocked.
    fn dispatch_queued(&self, record: &AdmissionRecord) -> SweepReport {
        let mut report = SweepReport::default();
        let mut refused: Vec<(RequestHandle, String)> = Vec::new();
        {
            let mut state = record.lock();
            while record.has_capacity(&state) {
                let Some(request) = state.pop_next() else {
                    break;
                };
                let session = match self.pool.get(request.client_id()) {
                    Ok(session) => session,
                    Err(e) => {
                        refused.push((request, e.to_string()));
                        continue;
                    }
                };
                if !request.start(self.now()) {
                    continue;
                }
                match session.transport().send(request.id(), request.params()) {
                    Ok(()) => {
                        debug!("Dispatched {} {}", request.kind(), request.key());
                        state.admit(request);
                        report.dispatched += 1;
                    }
                    Err(e) => refused.push((request, e.to_string())),
                }
            }
        }

        report.rejected = refused.len();
        for (request, message) in refused {
            self.reject(&request, &message);
        }
        report
    }

    /// Reclaim overdue, non-busy requests of a limited kind while it stays
    /// under pressure. Candidates are gathered without the lock, earliest
    /// deadline first with ties broken by key, then re-checked under it.
    fn reclaim_limited(&self, record: &AdmissionRecord) -> usize {
        let now = self.now();
        let mut candidates = record.lock().in_flight_requests();
        candidates.retain(|request| {
            request.is_active() && request.is_overdue(now) && !request.is_busy()
        });
        if candidates.is_empty() {
            return 0;
        }
        candidates.sort_by_key(|request| (request.deadline(), request.key()));

        let mut reclaimed = Vec::new();
        {
            let mut state = record.lock();
            for request in candidates {
                if !record.under_pressure(&state) {
                    break;
                }
                if !request.cancel(CancelReason::TimedOut, now) {
                    continue;
                }
                state.release(&request.key());
                self.send_venue_cancel(&request);
                reclaimed.push(request);
            }
        }

        for request in &reclaimed {
            info!(
                "Reclaimed overdue {} {} (in flight {}, queued {})",
                request.kind(),
                request.key(),
                self.admission.in_flight(request.kind()),
                self.admission.queued(request.kind())
            );
            self.cascade_to_child(request, CancelReason::TimedOut);
        }
        reclaimed.len()
    }

    /// Time out overdue requests of unlimited kinds. Kinds the venue cannot
    /// cancel are finalized locally.
    fn reclaim_unlimited(&self) -> usize {
        let now = self.now();
        let overdue: Vec<RequestHandle> = self
            .requests()
            .into_iter()
            .filter(|request| {
                !self.is_limited(request.kind())
                    && request.is_active()
                    && request.is_overdue(now)
                    && !request.is_busy()
            })
            .collect();

        overdue
            .iter()
            .filter(|request| self.cancel(*request, CancelReason::TimedOut))
            .count()
    }
}

/// Background thread driving [`Engine::sweep_once`] at a fixed interval
pub(crate) struct SweepThread {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl SweepThread {
    pub(crate) fn spawn(engine: Weak<Engine>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::Builder::new()
            .name("matrix-sweep".to_string())
            .spawn(move || Self::sweep_loop(engine, interval, shutdown_clone))
            .expect("Failed to spawn sweep thread");

        Self {
            handle: Some(handle),
            shutdown,
        }
    }

    fn sweep_loop(engine: Weak<Engine>, interval: Duration, shutdown: Arc<AtomicBool>) {
        info!("Sweep thread started ({:?} interval)", interval);
        let mut passes: u64 = 0;

        while !shutdown.load(Ordering::Relaxed) {
            let tick_start = Instant::now();

            let Some(engine) = engine.upgrade() else {
                break;
            };
            engine.sweep_once();
            drop(engine);
            passes += 1;

            // Park out the rest of the tick; stop() unparks
            let elapsed = tick_start.elapsed();
            if elapsed < interval {
                thread::park_timeout(interval - elapsed);
            }
        }

        info!("Sweep thread stopped after {} passes", passes);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the thread and wait for it
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Sweep thread panicked");
            }
        }
    }
}

impl Drop for SweepThread {
    fn drop(&mut self) {
        self.stop();
    }
}
