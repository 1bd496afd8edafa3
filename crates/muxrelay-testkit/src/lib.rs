//! In-process fake usbmuxd for tests.
//!
//! [`FakeDaemon`] listens on a Unix domain socket in a fresh temporary
//! directory and answers the control protocol with the same codecs the
//! client uses. Successful `Connect` requests turn the connection into a
//! stand-in for the device-side port, an echo service by default.

#![cfg(unix)]

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use muxrelay_frame::{
    Device, FrameReader, FrameWriter, Message, ProtocolVersion, RawFrame, WireCodec,
};
use muxrelay_transport::{DaemonAddress, DaemonStream};
use tracing::debug;

/// Result code for a request against an unknown device.
pub const RESULT_BAD_DEVICE: u32 = 2;
/// Result code for a refused device-side connection.
pub const RESULT_CONNECTION_REFUSED: u32 = 3;
/// Result code for a request in an unsupported protocol version.
pub const RESULT_BAD_VERSION: u32 = 6;

/// Envelope version used to reject clients when no known version is enabled.
const FOREIGN_VERSION: u32 = 7;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

/// Create a unique, empty directory under the system temp dir.
pub fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "muxrelay-{tag}-{}-{}",
        std::process::id(),
        NEXT_DIR.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// A device record with plausible values derived from `id`.
pub fn sample_device(id: u32) -> Device {
    Device {
        device_id: id,
        product_id: 0x12a8,
        serial_number: format!("{id:08x}-0000000000000000000000000000000000"),
        location_id: 0x0014_0000 + id,
    }
}

/// How the fake device answers a `Connect` to one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortBehavior {
    /// Accept and echo every byte back until the client closes.
    Echo,
    /// Reject with this result code.
    Refuse(u32),
    /// Accept, send these bytes, then close the device side.
    Banner(Vec<u8>),
}

/// Configures a [`FakeDaemon`] before it starts listening.
#[derive(Debug, Clone)]
pub struct FakeDaemonBuilder {
    versions: Vec<ProtocolVersion>,
    devices: Vec<Device>,
    ports: HashMap<u16, PortBehavior>,
}

impl Default for FakeDaemonBuilder {
    fn default() -> Self {
        Self {
            versions: vec![ProtocolVersion::Binary, ProtocolVersion::Plist],
            devices: Vec::new(),
            ports: HashMap::new(),
        }
    }
}

impl FakeDaemonBuilder {
    /// Protocol versions the daemon accepts. An empty list accepts none.
    pub fn versions(mut self, versions: &[ProtocolVersion]) -> Self {
        self.versions = versions.to_vec();
        self
    }

    /// A device that is attached from the start.
    pub fn device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    /// Answer `Connect` requests for `port` with result `code`.
    pub fn port_result(mut self, port: u16, code: u32) -> Self {
        self.ports.insert(port, PortBehavior::Refuse(code));
        self
    }

    /// Send `banner` on streams to `port`, then close them from the device side.
    pub fn port_banner(mut self, port: u16, banner: &[u8]) -> Self {
        self.ports.insert(port, PortBehavior::Banner(banner.to_vec()));
        self
    }

    pub fn start(self) -> FakeDaemon {
        FakeDaemon::start(self)
    }
}

#[derive(Default)]
struct Counter {
    value: Mutex<usize>,
    changed: Condvar,
}

impl Counter {
    fn bump(&self) {
        *lock(&self.value) += 1;
        self.changed.notify_all();
    }

    fn wait_for(&self, target: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut value = lock(&self.value);
        while *value < target {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            value = match self.changed.wait_timeout(value, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

struct Shared {
    versions: Vec<ProtocolVersion>,
    ports: HashMap<u16, PortBehavior>,
    devices: Mutex<Vec<Device>>,
    subscribers: Mutex<Vec<Sender<Message>>>,
    connects: Mutex<Vec<(u32, u16)>>,
    opened_streams: Counter,
    closed_streams: Counter,
    listens: Counter,
    listen_result: AtomicU32,
    shutdown: AtomicBool,
}

/// A fake usbmuxd listening on a temporary Unix domain socket.
///
/// Stops accepting when dropped and removes its socket directory.
pub struct FakeDaemon {
    dir: PathBuf,
    path: PathBuf,
    shared: Arc<Shared>,
    accept: Option<JoinHandle<()>>,
}

impl FakeDaemon {
    pub fn builder() -> FakeDaemonBuilder {
        FakeDaemonBuilder::default()
    }

    fn start(builder: FakeDaemonBuilder) -> Self {
        let dir = unique_temp_dir("daemon");
        let path = dir.join("usbmuxd.sock");
        let listener = UnixListener::bind(&path).expect("fake daemon should bind");
        listener
            .set_nonblocking(true)
            .expect("listener should become nonblocking");

        let shared = Arc::new(Shared {
            versions: builder.versions,
            ports: builder.ports,
            devices: Mutex::new(builder.devices),
            subscribers: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            opened_streams: Counter::default(),
            closed_streams: Counter::default(),
            listens: Counter::default(),
            listen_result: AtomicU32::new(0),
            shutdown: AtomicBool::new(false),
        });

        let accept_shared = Arc::clone(&shared);
        let accept = thread::spawn(move || accept_loop(listener, accept_shared));

        Self {
            dir,
            path,
            shared,
            accept: Some(accept),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    pub fn address(&self) -> DaemonAddress {
        DaemonAddress::Unix(self.path.clone())
    }

    /// Attach a device and announce it to every listening client.
    pub fn attach(&self, device: Device) {
        let mut devices = lock(&self.shared.devices);
        devices.retain(|d| d.device_id != device.device_id);
        devices.push(device.clone());
        self.broadcast(Message::DeviceAttach(device));
    }

    /// Detach a device and announce it to every listening client.
    pub fn detach(&self, device_id: u32) {
        let mut devices = lock(&self.shared.devices);
        devices.retain(|d| d.device_id != device_id);
        self.broadcast(Message::DeviceRemove { device_id });
    }

    /// Every `Connect` request seen so far as `(device_id, port)`.
    pub fn connects(&self) -> Vec<(u32, u16)> {
        lock(&self.shared.connects).clone()
    }

    /// Wait until `count` streams have been handed over to clients.
    pub fn wait_for_streams(&self, count: usize, timeout: Duration) -> bool {
        self.shared.opened_streams.wait_for(count, timeout)
    }

    /// Wait until `count` device-side streams have been closed by clients.
    pub fn wait_for_closed_streams(&self, count: usize, timeout: Duration) -> bool {
        self.shared.closed_streams.wait_for(count, timeout)
    }

    /// Close every listening connection, as a restarting daemon would.
    pub fn hang_up_listeners(&self) {
        let _devices = lock(&self.shared.devices);
        lock(&self.shared.subscribers).clear();
    }

    /// Answer later `Listen` requests with result `code` (0 accepts).
    pub fn set_listen_result(&self, code: u32) {
        self.shared.listen_result.store(code, Ordering::SeqCst);
    }

    /// Wait until `count` `Listen` requests have been accepted.
    pub fn wait_for_listens(&self, count: usize, timeout: Duration) -> bool {
        self.shared.listens.wait_for(count, timeout)
    }

    // Caller holds the devices lock so that snapshots and events stay ordered.
    fn broadcast(&self, message: Message) {
        lock(&self.shared.subscribers).retain(|tx| tx.send(message.clone()).is_ok());
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        lock(&self.shared.subscribers).clear();
        if let Some(handle) = self.accept.take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn accept_loop(listener: UnixListener, shared: Arc<Shared>) {
    while !shared.shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let shared = Arc::clone(&shared);
                thread::spawn(move || serve_client(stream, shared));
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(_) => break,
        }
    }
}

fn serve_client(stream: UnixStream, shared: Arc<Shared>) {
    let stream = DaemonStream::from(stream);
    let Ok(reader_stream) = stream.try_clone() else {
        return;
    };
    let mut reader = FrameReader::new(reader_stream);
    let mut writer = FrameWriter::new(stream);

    let Ok(request) = reader.read_frame() else {
        return;
    };

    let Some(version) = shared
        .versions
        .iter()
        .copied()
        .find(|v| v.as_u32() == request.version)
    else {
        reject_version(&mut writer, &shared, request.tag);
        return;
    };
    let codec = version.codec();

    let Ok((message, tag)) = codec.decode(&request) else {
        return;
    };
    debug!(kind = %message.kind(), tag, %version, "fake daemon request");

    match message {
        Message::Listen => serve_listener(writer, codec, &shared, tag),
        Message::Connect { device_id, port } => {
            lock(&shared.connects).push((device_id, port));
            let known = lock(&shared.devices).iter().any(|d| d.device_id == device_id);
            let behavior = shared.ports.get(&port).cloned().unwrap_or(PortBehavior::Echo);
            let code = match (&behavior, known) {
                (_, false) => RESULT_BAD_DEVICE,
                (PortBehavior::Refuse(code), true) => *code,
                _ => 0,
            };
            if reply(&mut writer, codec.as_ref(), code, tag).is_err() || code != 0 {
                return;
            }
            drop(reader);
            shared.opened_streams.bump();
            let mut stream = writer.into_inner();
            match behavior {
                PortBehavior::Banner(banner) => {
                    let _ = stream.write_all(&banner);
                    let _ = stream.shutdown();
                }
                _ => echo(stream),
            }
            shared.closed_streams.bump();
        }
        _ => {}
    }
}

fn reject_version(writer: &mut FrameWriter<DaemonStream>, shared: &Shared, tag: u32) {
    let frame = match shared.versions.first() {
        Some(version) => match version
            .codec()
            .encode(&Message::Result { code: RESULT_BAD_VERSION }, tag)
        {
            Ok(frame) => frame,
            Err(_) => return,
        },
        None => RawFrame::new(
            FOREIGN_VERSION,
            1,
            tag,
            RESULT_BAD_VERSION.to_le_bytes().to_vec(),
        ),
    };
    let _ = writer.write_frame(&frame);
}

fn reply(
    writer: &mut FrameWriter<DaemonStream>,
    codec: &dyn WireCodec,
    code: u32,
    tag: u32,
) -> Result<(), ()> {
    let frame = codec
        .encode(&Message::Result { code }, tag)
        .map_err(|_| ())?;
    writer.write_frame(&frame).map_err(|_| ())
}

fn serve_listener(
    mut writer: FrameWriter<DaemonStream>,
    codec: Arc<dyn WireCodec>,
    shared: &Shared,
    tag: u32,
) {
    let code = shared.listen_result.load(Ordering::SeqCst);
    if reply(&mut writer, codec.as_ref(), code, tag).is_err() || code != 0 {
        return;
    }

    let (snapshot, events): (Vec<Device>, Receiver<Message>) = {
        let devices = lock(&shared.devices);
        let (tx, rx) = mpsc::channel();
        lock(&shared.subscribers).push(tx);
        (devices.clone(), rx)
    };
    shared.listens.bump();

    let initial = snapshot.into_iter().map(Message::DeviceAttach);
    for message in initial.chain(events) {
        let Ok(frame) = codec.encode(&message, 0) else {
            return;
        };
        if writer.write_frame(&frame).is_err() {
            return;
        }
    }
    let _ = writer.get_ref().shutdown();
}

fn echo(mut stream: DaemonStream) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
        }
    }
    let _ = stream.shutdown();
}
