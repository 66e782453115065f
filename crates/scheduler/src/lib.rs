//! Matrix Scheduler
//!
//! Client-side request scheduler for a callback-driven trading venue:
//! - **Admission**: per-kind ceilings on in-flight requests, FIFO queue behind them
//! - **Sweep**: a 1 s pass that dispatches queued work and reclaims overdue
//!   requests while their kind is under pressure
//! - **Session Pool**: several venue sessions, random selection per kind
//! - **Routing**: inbound callbacks matched to requests by id, singleton slot
//!   or execution id
//!
//! ## Architecture
//!
//! ```text
//! caller ──► Scheduler ──► Admission ──(sweep)──► Session::send
//!               │              ▲                       │
//!               │        release once                  │ callbacks
//!               ▼              │                       ▼
//!         RequestHandle ◄── Request ◄──── Router ◄── session thread
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use matrix_scheduler::{Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default(), Arc::new(SystemClock::new()))?;
//! scheduler.open_session("hist", &[RequestKind::HistoricalData], session, None)?;
//! scheduler.start();
//!
//! let bars = scheduler.request_historical_data(params, 1, RequestHooks::new())?;
//! bars.wait(Duration::from_secs(60));
//! ```

pub mod admission;
pub mod config;
pub mod error;
pub mod orders;
pub mod pool;
pub mod timeout;

mod engine;
mod router;
mod scheduler;
mod sweep;

// Re-export main types
pub use admission::{Admission, AdmissionRecord, AdmissionState};
pub use config::{HistoricalTimeoutConfig, SchedulerConfig, SessionPlan, TimeoutConfig};
pub use engine::CommissionHook;
pub use error::{ConfigError, Error, Result};
pub use orders::{OrderBucket, OrderIndex};
pub use pool::{SessionHandle, SessionPool};
pub use scheduler::{MarketDataReconcile, Scheduler};
pub use sweep::SweepReport;
pub use timeout::{HeuristicTimeout, TimeoutPolicy};

pub use matrix_clock::{ManualClock, SystemClock};
