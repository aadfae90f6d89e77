//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] rsplink_protocol::ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("connection is closed")]
    NotConnected,

    #[error("listener is not started")]
    NotListening,

    #[error("read size must be non-zero")]
    ZeroSizeRead,

    #[error("stream desynchronized: {faults} consecutive framing faults")]
    Desynchronized { faults: usize },

    #[error("handler error: {0}")]
    Handler(String),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns whether the connection this error came from is unusable.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            ServerError::Io(_) | ServerError::NotConnected | ServerError::Desynchronized { .. }
        )
    }
}
