use crate::address::DaemonAddress;

/// Errors that can occur on the daemon transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the daemon.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: DaemonAddress,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream (or accepted zero bytes) mid-transfer.
    #[error("connection broken")]
    ConnectionBroken,

    /// The daemon address could not be parsed.
    #[error("invalid daemon address '{0}'")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
