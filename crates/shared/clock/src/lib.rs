//! Matrix Clock Infrastructure
//!
//! Time sources for the scheduler:
//!
//! - [`SystemClock`]: wall-clock time, for production
//! - [`ManualClock`]: time that only moves when told to, for deterministic
//!   timeout tests
//!
//! ## Usage
//!
//! ```ignore
//! use matrix_clock::{Clock, ManualClock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(None);
//! let before = clock.now();
//! clock.advance(Duration::seconds(21));
//! assert_eq!(clock.now() - before, Duration::seconds(21));
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use matrix_ports::Clock;
