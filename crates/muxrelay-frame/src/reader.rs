use std::io::Read;

use bytes::{BufMut, BytesMut};
use muxrelay_transport::{recv_exact, DaemonStream};
use tracing::trace;

use crate::codec::{check_length, decode_frame, FrameConfig, RawFrame, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` stream.
///
/// Reads the 4-byte length prefix, then exactly the rest of the frame, and
/// nothing more. The stream position after `read_frame` is therefore always
/// a frame boundary, which matters once a connection stops carrying frames
/// and is handed over as a raw data pipe.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::Transport(ConnectionBroken))` when the stream
    /// ends before a whole frame arrived.
    pub fn read_frame(&mut self) -> Result<RawFrame> {
        let prefix = recv_exact(&mut self.inner, 4)?;
        let total_len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let payload_len = check_length(total_len, self.config.max_payload_size)?;

        let body = recv_exact(&mut self.inner, HEADER_SIZE - 4 + payload_len)?;

        let mut wire = BytesMut::with_capacity(HEADER_SIZE + payload_len);
        wire.put_slice(&prefix);
        wire.put_slice(&body);

        let frame = decode_frame(&mut wire, self.config.max_payload_size)?
            .ok_or_else(|| FrameError::Protocol("incomplete frame after exact read".to_string()))?;
        trace!(
            version = frame.version,
            kind = frame.kind,
            tag = frame.tag,
            len = frame.payload.len(),
            "frame read"
        );
        Ok(frame)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<DaemonStream> {
    /// Create a frame reader for `DaemonStream` and apply read timeout from config.
    pub fn with_config_daemon(inner: DaemonStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
