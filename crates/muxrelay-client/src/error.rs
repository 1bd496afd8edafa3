use muxrelay_frame::FrameError;
use muxrelay_transport::TransportError;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Transport-level failure: connect refused, broken pipe, premature close.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// Malformed frame, unexpected message kind or tag mismatch.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The daemon answered in a different protocol version.
    ///
    /// Consumed by version negotiation; fatal anywhere else.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// The daemon rejected a connect request.
    #[error("connect failed: daemon returned {name} ({code})", name = code_name(.0), code = .0)]
    Connect(u32),

    /// The daemon rejected a listen request.
    #[error("listen failed: daemon returned {name} ({code})", name = code_name(.0), code = .0)]
    ListenRejected(u32),

    /// Neither the binary nor the property-list protocol was accepted.
    #[error("daemon speaks no supported protocol version")]
    NoUsableProtocol,

    /// No device was available when one was required.
    #[error("no device attached")]
    NoDevice,

    /// A control request was issued on a connection that is now a data stream.
    #[error("connection is streaming, cannot issue control packets")]
    Streaming,
}

impl From<FrameError> for MuxError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Transport(err) => MuxError::Connection(err),
            FrameError::VersionMismatch { expected, actual } => {
                MuxError::VersionMismatch { expected, actual }
            }
            FrameError::Protocol(msg) => MuxError::Protocol(msg),
            other => MuxError::Protocol(other.to_string()),
        }
    }
}

/// Human-readable name of a daemon result code.
pub fn describe_result_code(code: u32) -> &'static str {
    match code {
        0 => "ok",
        2 => "bad device",
        3 => "connection refused",
        6 => "bad version",
        _ => "unknown error",
    }
}

fn code_name(code: &u32) -> &'static str {
    describe_result_code(*code)
}

pub type Result<T> = std::result::Result<T, MuxError>;
