/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Transport-level failure while reading or writing a frame.
    #[error(transparent)]
    Transport(#[from] muxrelay_transport::TransportError),

    /// The frame was produced for a different protocol version.
    ///
    /// Kept separate from [`FrameError::Protocol`]: this is the signal that
    /// drives version negotiation fallback.
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Malformed frame, unexpected message kind or missing fields.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The declared frame length is shorter than the fixed header.
    #[error("invalid frame length {0} (minimum 16)")]
    InvalidLength(u32),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The property-list payload could not be parsed or serialized.
    #[error("property list error: {0}")]
    Plist(#[from] plist::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
