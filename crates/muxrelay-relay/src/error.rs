use std::net::SocketAddr;

use muxrelay_client::MuxError;

/// Errors that can occur while setting up or running a relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A port pair could not be parsed.
    #[error("invalid port spec '{spec}': {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    /// A local port could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },

    /// Device selection or stream setup failed.
    #[error(transparent)]
    Mux(#[from] MuxError),

    /// I/O error on a local socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub(crate) fn port_spec(spec: &str, reason: impl Into<String>) -> Self {
        RelayError::InvalidPortSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
