//! Scheduler errors
//!
//! Only synchronous failures surface here. Remote rejections and timeouts land
//! in the request's own error log and terminal state.

use matrix_core::{ClientId, RequestKind};
use matrix_ports::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No session serves {0}")]
    NoSession(RequestKind),

    #[error("Unknown session: {0}")]
    UnknownSession(ClientId),

    #[error("Session {client_id} already registered")]
    DuplicateSession { client_id: ClientId },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failure to load or validate a [`SchedulerConfig`](crate::SchedulerConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid ceiling for {0}: must be at least 1")]
    ZeroCeiling(RequestKind),

    #[error("Invalid sweep interval: must be at least 1 ms")]
    ZeroSweepInterval,

    #[error("Session plan {0} lists no request kinds")]
    EmptySessionPlan(ClientId),
}

pub type Result<T> = std::result::Result<T, Error>;
