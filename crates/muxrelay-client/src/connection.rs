use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;

use muxrelay_frame::{
    Device, FrameConfig, FrameReader, FrameWriter, Message, ProtocolVersion, WireCodec,
};
use muxrelay_transport::{DaemonAddress, DaemonStream};
use tracing::{debug, info};

use crate::config::MuxConfig;
use crate::error::{MuxError, Result};
use crate::registry::{DeviceRegistry, SharedRegistry};

/// Lifecycle of a [`ControlConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Requests and device events can be exchanged.
    Control,
    /// A `Connect` succeeded; the socket now belongs to the caller as a raw pipe.
    Streaming,
}

struct ControlIo {
    reader: FrameReader<DaemonStream>,
    writer: FrameWriter<DaemonStream>,
}

/// One connection to the daemon speaking the control protocol.
///
/// Requests carry tags starting at 1 and increasing by one per request. A
/// connection that has been put in listening mode receives device events
/// through [`pump`](Self::pump) and applies them to its registry. After a
/// successful [`connect`](Self::connect) the socket is handed to the caller
/// and every further control call fails with [`MuxError::Streaming`].
pub struct ControlConnection {
    codec: Arc<dyn WireCodec>,
    io: Option<ControlIo>,
    next_tag: u32,
    listening: bool,
    registry: SharedRegistry,
}

impl ControlConnection {
    /// Connect to the daemon at `address` and speak `version`.
    pub fn open(
        address: &DaemonAddress,
        version: ProtocolVersion,
        config: &MuxConfig,
    ) -> Result<Self> {
        let stream = DaemonStream::connect(address)?;
        Self::from_stream(stream, version.codec(), config.frame_config())
    }

    /// Wrap an already connected stream.
    pub fn from_stream(
        stream: DaemonStream,
        codec: Arc<dyn WireCodec>,
        frame_config: FrameConfig,
    ) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let reader = FrameReader::with_config_daemon(reader_stream, frame_config.clone())?;
        let writer = FrameWriter::with_config_daemon(stream, frame_config)?;

        Ok(Self {
            codec,
            io: Some(ControlIo { reader, writer }),
            next_tag: 1,
            listening: false,
            registry: Arc::new(RwLock::new(DeviceRegistry::new())),
        })
    }

    /// Feed device events into `registry` instead of a private one.
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.codec.version()
    }

    pub fn state(&self) -> ConnectionState {
        if self.io.is_some() {
            ConnectionState::Control
        } else {
            ConnectionState::Streaming
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Tag the next request will carry.
    pub fn next_tag(&self) -> u32 {
        self.next_tag
    }

    /// Shared handle to the device registry fed by [`pump`](Self::pump).
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Snapshot of the devices seen so far.
    pub fn devices(&self) -> Vec<Device> {
        match self.registry.read() {
            Ok(registry) => registry.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        }
    }

    /// Subscribe to device attach and detach events.
    pub fn listen(&mut self) -> Result<()> {
        if self.io.is_none() {
            return Err(MuxError::Streaming);
        }
        if self.listening {
            return Err(MuxError::Protocol(
                "connection is already listening".to_string(),
            ));
        }

        let code = self.exchange(&Message::Listen)?;
        if code != 0 {
            return Err(MuxError::ListenRejected(code));
        }
        self.listening = true;
        debug!(version = %self.version(), "listening for device events");
        Ok(())
    }

    /// Wait up to `timeout` for one incoming event and apply it.
    ///
    /// `None` waits indefinitely. Returns `false` if nothing arrived in time.
    pub fn pump(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let io = self.io.as_mut().ok_or(MuxError::Streaming)?;
        if !io.reader.get_ref().wait_readable(timeout)? {
            return Ok(false);
        }

        let frame = io.reader.read_frame()?;
        let (message, _tag) = self.codec.decode(&frame)?;
        match message {
            Message::DeviceAttach(device) => {
                info!(
                    device_id = device.device_id,
                    serial = %device.serial_number,
                    "device attached"
                );
                write_registry(&self.registry).attach(device);
            }
            Message::DeviceRemove { device_id } => {
                info!(device_id, "device detached");
                write_registry(&self.registry).detach(device_id);
            }
            Message::Result { code } => {
                return Err(MuxError::Protocol(format!(
                    "unexpected result (code {code})"
                )));
            }
            other => {
                return Err(MuxError::Protocol(format!(
                    "invalid incoming message kind {}",
                    other.kind()
                )));
            }
        }
        Ok(true)
    }

    /// Ask the daemon to connect to `port` on the device and take the socket.
    ///
    /// On success the connection enters [`ConnectionState::Streaming`] and
    /// the returned stream carries raw bytes to and from the device port,
    /// with no timeouts set.
    pub fn connect(&mut self, device_id: u32, port: u16) -> Result<DaemonStream> {
        let code = self.exchange(&Message::Connect { device_id, port })?;
        if code != 0 {
            return Err(MuxError::Connect(code));
        }

        let ControlIo { reader, writer } = self.io.take().ok_or(MuxError::Streaming)?;
        drop(reader);
        let stream = writer.into_inner();
        stream.set_read_timeout(None)?;
        stream.set_write_timeout(None)?;

        debug!(device_id, port, "stream established");
        Ok(stream)
    }

    fn exchange(&mut self, request: &Message) -> Result<u32> {
        let io = self.io.as_mut().ok_or(MuxError::Streaming)?;

        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);

        let frame = self.codec.encode(request, tag)?;
        debug!(kind = %request.kind(), tag, "sending request");
        io.writer.write_frame(&frame)?;

        let reply = io.reader.read_frame()?;
        let (reply, reply_tag) = self.codec.decode(&reply)?;
        match reply {
            Message::Result { code } if reply_tag == tag => Ok(code),
            Message::Result { .. } => Err(MuxError::Protocol(format!(
                "reply tag {reply_tag} does not match request tag {tag}"
            ))),
            other => Err(MuxError::Protocol(format!(
                "expected Result reply, got {}",
                other.kind()
            ))),
        }
    }
}

impl std::fmt::Debug for ControlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlConnection")
            .field("version", &self.version())
            .field("state", &self.state())
            .field("next_tag", &self.next_tag)
            .field("listening", &self.listening)
            .finish()
    }
}

fn write_registry(registry: &RwLock<DeviceRegistry>) -> RwLockWriteGuard<'_, DeviceRegistry> {
    match registry.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
