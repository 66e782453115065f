use matrix_core::RequestKind;
use thiserror::Error;

/// Failures reported synchronously by a session transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Session not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("No cancel operation for {0}")]
    NotCancellable(RequestKind),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
