use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use muxrelay_frame::{Device, ProtocolVersion};
use muxrelay_transport::DaemonStream;
use tracing::{debug, info, warn};

use crate::config::{DeviceSelection, MuxConfig};
use crate::connection::ControlConnection;
use crate::error::{MuxError, Result};
use crate::registry::SharedRegistry;

/// Entry point for talking to the daemon.
///
/// Holds one listening [`ControlConnection`] that tracks attached devices,
/// and opens a fresh connection in the negotiated protocol version for
/// every stream. Safe to share between threads.
#[derive(Debug)]
pub struct Multiplexer {
    config: MuxConfig,
    version: ProtocolVersion,
    listener: Mutex<ControlConnection>,
    registry: SharedRegistry,
}

impl Multiplexer {
    /// Connect, negotiate a protocol version and start listening for devices.
    ///
    /// The binary protocol is tried first; if the daemon answers in another
    /// version the property-list protocol is tried on a new connection.
    pub fn connect(config: MuxConfig) -> Result<Self> {
        let listener = negotiate(&config)?;
        let version = listener.version();
        let registry = listener.registry();
        info!(address = %config.address, %version, "connected to daemon");

        Ok(Self {
            config,
            version,
            listener: Mutex::new(listener),
            registry,
        })
    }

    /// Protocol version every connection of this multiplexer speaks.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Snapshot of the attached devices, in attachment order.
    pub fn devices(&self) -> Vec<Device> {
        match self.registry.read() {
            Ok(registry) => registry.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        }
    }

    /// Process at most one device event, waiting up to `timeout`.
    pub fn pump(&self, timeout: Option<Duration>) -> Result<bool> {
        self.lock_listener().pump(timeout)
    }

    /// Apply every device event the daemon has already sent, without waiting.
    ///
    /// Returns the number of events processed.
    pub fn refresh(&self) -> Result<usize> {
        let mut listener = self.lock_listener();
        let mut processed = 0;
        while listener.pump(Some(Duration::ZERO))? {
            processed += 1;
        }
        Ok(processed)
    }

    /// Pump events until at least one device is attached or `timeout` passes.
    ///
    /// Once a device shows up, events already queued by the daemon are
    /// applied too, so the returned list reflects everything announced so far.
    pub fn wait_for_devices(&self, timeout: Duration) -> Result<Vec<Device>> {
        let deadline = Instant::now() + timeout;
        let mut listener = self.lock_listener();

        while self.devices().is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            listener.pump(Some(remaining))?;
        }
        loop {
            match listener.pump(Some(Duration::ZERO)) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    debug!(error = %err, "stopped draining device events");
                    break;
                }
            }
        }

        Ok(self.devices())
    }

    /// First attached device, waiting up to `timeout` for one to appear.
    pub fn wait_for_device(&self, timeout: Duration) -> Result<Option<Device>> {
        Ok(self.wait_for_devices(timeout)?.into_iter().next())
    }

    /// Pick a device according to `selection`.
    ///
    /// Waits up to `wait` if no device is known yet and fails with
    /// [`MuxError::NoDevice`] if none turns up. If the listening connection
    /// was lost it is reopened; when that fails too, the devices tracked so
    /// far are used.
    pub fn select_device(&self, selection: DeviceSelection, wait: Duration) -> Result<Device> {
        if let Err(err) = self.refresh() {
            warn!(error = %err, "device refresh failed");
            if matches!(err, MuxError::Connection(_)) {
                if let Err(err) = self.reopen_listener() {
                    warn!(error = %err, "could not reopen listening connection, using tracked devices");
                }
            }
        }
        let mut devices = self.devices();
        if devices.is_empty() {
            devices = self.wait_for_devices(wait)?;
        }
        let device = selection.select(&devices).cloned().ok_or(MuxError::NoDevice)?;
        debug!(%selection, device_id = device.device_id, "selected device");
        Ok(device)
    }

    /// Open a raw stream to `port` on `device`.
    ///
    /// Uses a new control connection in the already negotiated version.
    pub fn open_stream(&self, device: &Device, port: u16) -> Result<DaemonStream> {
        let mut conn = ControlConnection::open(&self.config.address, self.version, &self.config)?;
        conn.connect(device.device_id, port)
    }

    /// Replace the listening connection with a fresh one in the negotiated
    /// version. The registry is emptied and refilled by the daemon's
    /// announcements on the new connection.
    fn reopen_listener(&self) -> Result<()> {
        let mut conn = ControlConnection::open(&self.config.address, self.version, &self.config)?
            .with_registry(Arc::clone(&self.registry));
        conn.listen()?;

        let mut listener = self.lock_listener();
        match self.registry.write() {
            Ok(mut registry) => registry.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        *listener = conn;
        info!(address = %self.config.address, "listening connection reopened");
        Ok(())
    }

    fn lock_listener(&self) -> MutexGuard<'_, ControlConnection> {
        match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn negotiate(config: &MuxConfig) -> Result<ControlConnection> {
    for (attempt, version) in ProtocolVersion::NEGOTIATION_ORDER.into_iter().enumerate() {
        match open_listening(config, version) {
            Ok(conn) => return Ok(conn),
            Err(MuxError::VersionMismatch { expected, actual }) => {
                debug!(%version, expected, actual, "daemon rejected protocol version");
            }
            // A fallback version the daemon cannot parse counts as unsupported.
            Err(MuxError::Protocol(reason)) if attempt > 0 => {
                debug!(%version, %reason, "protocol negotiation failed");
            }
            Err(err) => return Err(err),
        }
    }
    Err(MuxError::NoUsableProtocol)
}

fn open_listening(config: &MuxConfig, version: ProtocolVersion) -> Result<ControlConnection> {
    let mut conn = ControlConnection::open(&config.address, version, config)?;
    conn.listen()?;
    Ok(conn)
}
