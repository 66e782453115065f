//! Matrix Ports
//!
//! Port definitions (traits) for the matrix request scheduler.
//! These define the boundaries between the scheduler and the venue transport.

mod clock;
mod error;
mod events;
mod session;

pub use clock::Clock;
pub use error::{SessionError, SessionResult};
pub use events::{EventSink, SessionEvent};
pub use session::Session;
