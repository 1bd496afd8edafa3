use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: length (4) + version (4) + kind (4) + tag (4) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// Default maximum payload size: 1 MiB.
///
/// usbmuxd control payloads are small (the largest are device property
/// lists of a few KiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// One undecoded envelope as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Protocol version the sender used.
    pub version: u32,
    /// Message kind identifier (codec-specific).
    pub kind: u32,
    /// Request/reply correlation tag.
    pub tag: u32,
    /// Codec-specific payload.
    pub payload: Bytes,
}

impl RawFrame {
    /// Create a new raw frame.
    pub fn new(version: u32, kind: u32, tag: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            version,
            kind,
            tag,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all fields little-endian):
/// ```text
/// ┌──────────────┬─────────────┬────────────┬───────────┬─────────────────┐
/// │ Length (4B)  │ Version(4B) │ Kind (4B)  │ Tag (4B)  │ Payload         │
/// │ 16 + payload │ 0 or 1      │            │           │ (Length-16 B)   │
/// └──────────────┴─────────────┴────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(frame: &RawFrame, dst: &mut BytesMut) -> Result<()> {
    let max = u32::MAX as usize - HEADER_SIZE;
    if frame.payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max,
        });
    }
    dst.reserve(frame.wire_size());
    dst.put_u32_le(frame.wire_size() as u32);
    dst.put_u32_le(frame.version);
    dst.put_u32_le(frame.kind);
    dst.put_u32_le(frame.tag);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Validate a declared total length against the payload budget.
///
/// Returns the payload length implied by `total_len`.
pub fn check_length(total_len: u32, max_payload: usize) -> Result<usize> {
    let total = total_len as usize;
    if total < HEADER_SIZE {
        return Err(FrameError::InvalidLength(total_len));
    }
    let payload_len = total - HEADER_SIZE;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    Ok(payload_len)
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<RawFrame>> {
    if src.len() < 4 {
        return Ok(None);
    }

    let total_len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
    let payload_len = check_length(total_len, max_payload)?;

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(4);
    let version = src.get_u32_le();
    let kind = src.get_u32_le();
    let tag = src.get_u32_le();
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(RawFrame {
        version,
        kind,
        tag,
        payload,
    }))
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
