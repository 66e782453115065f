//! In-memory simulator session
//!
//! Stands in for a venue connection in tests and offline runs.

mod outbound;
mod session;

pub use outbound::Outbound;
pub use session::{Responder, SimulatedSession};
