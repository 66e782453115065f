//! Request model: kinds, parameters, inbound payloads and the lifecycle
//! state machine.

mod kind;
pub mod params;
pub mod payload;
mod request;
mod state;

pub use kind::{RequestKind, SingletonSlot};
pub use params::{
    BarSize, DurationUnit, HistoricalDuration, HistoricalParams, MarketDataParams,
    OptionChainQuery, ParseError, RequestParams, WhatToShow,
};
pub use payload::{
    AccountValue, Bar, CommissionReport, ContractDetails, Execution, OpenOrderEntry, OptionChain,
    OrderStatusUpdate, Payload, PositionEntry, Tick,
};
pub use request::{
    BodyShape, BusyCheck, CompleteHook, DataHook, ErrorHook, OrderTrail, Request, RequestHandle,
    RequestHooks,
};
pub use state::{CancelReason, RequestState};
