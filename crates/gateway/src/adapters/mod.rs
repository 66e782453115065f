//! Session adapters
//!
//! Adapters translate scheduler sends and cancels into venue calls and venue
//! callbacks into `SessionEvent`s.

pub mod simulator;

pub use simulator::SimulatedSession;
