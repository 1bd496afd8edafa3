use std::fmt;
use std::sync::Arc;

use crate::binary::BinaryCodec;
use crate::codec::RawFrame;
use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::property_list::PlistCodec;

/// A daemon protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Fixed binary structs (version 0).
    Binary,
    /// XML property lists inside the envelope (version 1).
    Plist,
}

impl ProtocolVersion {
    /// Versions in the order negotiation tries them.
    pub const NEGOTIATION_ORDER: [ProtocolVersion; 2] =
        [ProtocolVersion::Binary, ProtocolVersion::Plist];

    /// Numeric value carried in the envelope's version field.
    pub fn as_u32(self) -> u32 {
        match self {
            ProtocolVersion::Binary => 0,
            ProtocolVersion::Plist => 1,
        }
    }

    /// The codec that speaks this version.
    pub fn codec(self) -> Arc<dyn WireCodec> {
        match self {
            ProtocolVersion::Binary => Arc::new(BinaryCodec),
            ProtocolVersion::Plist => Arc::new(PlistCodec::default()),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Binary => write!(f, "binary (v0)"),
            ProtocolVersion::Plist => write!(f, "plist (v1)"),
        }
    }
}

/// Converts [`Message`]s to and from envelopes for one protocol version.
///
/// Implementations are symmetric: every message kind can be encoded and
/// decoded, whichever side of the conversation it normally comes from.
pub trait WireCodec: Send + Sync + fmt::Debug {
    /// The protocol version this codec writes and accepts.
    fn version(&self) -> ProtocolVersion;

    /// Encode `message` with correlation `tag`.
    fn encode(&self, message: &Message, tag: u32) -> Result<RawFrame>;

    /// Decode a received frame into its message and tag.
    ///
    /// Fails with [`FrameError::VersionMismatch`] before looking at anything
    /// else if the frame was produced for another version.
    fn decode(&self, frame: &RawFrame) -> Result<(Message, u32)>;
}

/// Reject frames that were produced for a different protocol version.
pub fn check_version(expected: ProtocolVersion, frame: &RawFrame) -> Result<()> {
    let expected = expected.as_u32();
    if frame.version != expected {
        return Err(FrameError::VersionMismatch {
            expected,
            actual: frame.version,
        });
    }
    Ok(())
}
