//! Matrix Core Domain
//!
//! Pure domain types for the matrix request scheduler: contracts, orders,
//! request parameters, inbound payloads and the request state machine.
//! No I/O lives here.

pub mod entities;
pub mod remote;
pub mod requests;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    Contract, InstrumentKey, OptionRight, Order, OrderType, SecType, Side, TimeInForce, Trail,
    TriggerMethod,
};
pub use remote::{RemoteError, RemoteErrorClass};
pub use requests::{
    BodyShape, CancelReason, Payload, Request, RequestHandle, RequestHooks, RequestKind,
    RequestParams, RequestState, SingletonSlot,
};
pub use values::{ClientId, Price, Quantity, RequestId, RequestIdSeq, RequestKey, Symbol, Timestamp};
