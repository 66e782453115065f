//! Shared fixtures: a scheduler on a manual clock with one simulated session
//! eligible for every kind. Events are routed by hand, so nothing arrives
//! unless the test delivers it.

#![allow(dead_code)]

use chrono::Utc;
use matrix_clock::ManualClock;
use matrix_core::requests::{
    BarSize, HistoricalDuration, HistoricalParams, MarketDataParams, OrderStatusUpdate,
};
use matrix_core::{ClientId, Contract, RequestKind};
use matrix_gateway::SimulatedSession;
use matrix_scheduler::{Scheduler, SchedulerConfig};
use rust_decimal_macros::dec;
use std::sync::Arc;

pub struct Harness {
    pub scheduler: Scheduler,
    pub session: Arc<SimulatedSession>,
    pub clock: Arc<ManualClock>,
    pub client: ClientId,
}

impl Harness {
    pub fn new(config: SchedulerConfig) -> Self {
        let _ = env_logger::try_init();

        let clock = ManualClock::new(None);
        let scheduler = Scheduler::new(config, clock.clone()).unwrap();
        let session = Arc::new(SimulatedSession::new(0).with_name("sim"));
        let client = scheduler
            .open_session("sim", &RequestKind::ALL, session.clone(), None)
            .unwrap();

        Self {
            scheduler,
            session,
            clock,
            client,
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

pub fn quotes(symbol: &str) -> MarketDataParams {
    MarketDataParams::streaming(Contract::stock(symbol))
}

pub fn daily_bars(symbol: &str) -> HistoricalParams {
    HistoricalParams::new(
        Contract::stock(symbol),
        HistoricalDuration::days(5),
        BarSize::Day1,
    )
}

pub fn order_status(status: &str) -> OrderStatusUpdate {
    OrderStatusUpdate {
        time: Utc::now(),
        status: status.to_string(),
        filled: dec!(0),
        remaining: dec!(10),
        avg_fill_price: dec!(0),
        last_fill_price: dec!(0),
        perm_id: 1,
        parent_id: 0,
        why_held: String::new(),
    }
}
