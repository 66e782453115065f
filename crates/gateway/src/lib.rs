//! Matrix Gateway
//!
//! Session adapters for the matrix request scheduler. Each adapter implements
//! the [`Session`](matrix_ports::Session) port: outbound sends and cancels go
//! to the venue, inbound callbacks come back as
//! [`SessionEvent`](matrix_ports::SessionEvent)s on the sink handed over at
//! connect time.
//!
//! ## Architecture
//!
//! ```text
//!    ┌───────────┐
//!    │ Scheduler │
//!    └──┬─────▲──┘
//!  send │     │ SessionEvent (callback thread)
//!  cancel     │
//!    ┌──▼─────┴──┐
//!    │  Session  │  simulator / live venue
//!    └───────────┘
//! ```
//!
//! Only the in-memory simulator ships here; it records outbound traffic and
//! lets a driver push inbound events, so scheduling behaviour can be exercised
//! without a live venue.

pub mod adapters;

pub use adapters::simulator::{Outbound, Responder, SimulatedSession};
