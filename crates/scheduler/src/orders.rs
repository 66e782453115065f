//! Order index by instrument and bucket
//!
//! Lets callers find every order placed on an instrument, for bulk
//! cancellation or to avoid stacking a second order on the same side.

use dashmap::DashMap;
use matrix_core::{InstrumentKey, Order, RequestHandle, Side};
use serde::{Deserialize, Serialize};

/// Which side of an instrument an order sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderBucket {
    /// Stop and trailing-stop orders
    Protective,
    Buy,
    Sell,
}

impl OrderBucket {
    pub fn of(order: &Order) -> Self {
        if order.is_protective() {
            return OrderBucket::Protective;
        }
        match order.action {
            Side::Buy => OrderBucket::Buy,
            Side::Sell => OrderBucket::Sell,
        }
    }
}

#[derive(Debug, Default)]
pub struct OrderIndex {
    orders: DashMap<(InstrumentKey, OrderBucket), Vec<RequestHandle>>,
}

impl OrderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an order request; requests without order params are ignored
    pub fn insert(&self, request: &RequestHandle) -> bool {
        let (Some(instrument), Some(order)) = (request.instrument_key(), request.params().order())
        else {
            return false;
        };
        self.orders
            .entry((instrument, OrderBucket::of(order)))
            .or_default()
            .push(request.clone());
        true
    }

    /// Every order ever indexed for the pair, oldest first
    pub fn get(&self, instrument: &InstrumentKey, bucket: OrderBucket) -> Vec<RequestHandle> {
        self.orders
            .get(&(instrument.clone(), bucket))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn active(&self, instrument: &InstrumentKey, bucket: OrderBucket) -> Vec<RequestHandle> {
        self.get(instrument, bucket)
            .into_iter()
            .filter(|request| request.is_active())
            .collect()
    }

    pub fn has_active(&self, instrument: &InstrumentKey, bucket: OrderBucket) -> bool {
        self.orders
            .get(&(instrument.clone(), bucket))
            .is_some_and(|entry| entry.value().iter().any(|request| request.is_active()))
    }

    pub fn prune_terminal(&self) -> usize {
        let mut removed = 0;
        for mut entry in self.orders.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|request| !request.is_terminal());
            removed += before - entry.value().len();
        }
        self.orders.retain(|_, requests| !requests.is_empty());
        removed
    }
}
