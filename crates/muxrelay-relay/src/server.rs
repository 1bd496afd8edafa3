use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use muxrelay_client::{DaemonStream, DeviceSelection, Multiplexer};
use tracing::{debug, info, warn};

use crate::config::{RelayConfig, RelayPair};
use crate::error::{RelayError, Result};
use crate::forward::splice;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Per-connection settings shared by every accept loop.
#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    selection: DeviceSelection,
    device_wait: Duration,
    buffer_size: usize,
}

impl From<&RelayConfig> for ConnectionSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            selection: config.selection,
            device_wait: config.device_wait,
            buffer_size: config.buffer_size,
        }
    }
}

/// Accept loop for one bound port pair.
#[derive(Debug)]
pub struct PortRelay {
    pair: RelayPair,
    listener: TcpListener,
    local_addr: SocketAddr,
    mux: Arc<Multiplexer>,
    settings: ConnectionSettings,
}

impl PortRelay {
    /// Bind the local side of `pair`.
    pub fn bind(mux: Arc<Multiplexer>, pair: RelayPair, config: &RelayConfig) -> Result<Self> {
        let address = SocketAddr::new(config.bind_address, pair.local_port);
        let listener =
            TcpListener::bind(address).map_err(|source| RelayError::Bind { address, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, remote_port = pair.remote_port, "relay listening");
        Ok(Self {
            pair,
            listener,
            local_addr,
            mux,
            settings: ConnectionSettings::from(config),
        })
    }

    pub fn pair(&self) -> RelayPair {
        self.pair
    }

    /// Address actually bound, with the OS-assigned port if `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` is set.
    ///
    /// Each accepted connection is handled on its own thread; failures there
    /// are logged and never end the loop.
    pub fn serve(&self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((client, peer)) => {
                    if let Err(err) = client.set_nonblocking(false) {
                        warn!(%peer, error = %err, "dropping connection");
                        continue;
                    }
                    let _ = client.set_nodelay(true);
                    let mux = Arc::clone(&self.mux);
                    let settings = self.settings;
                    let remote_port = self.pair.remote_port;
                    thread::spawn(move || {
                        handle_connection(&mux, settings, remote_port, client, peer)
                    });
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(local_addr = %self.local_addr, error = %err, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        debug!(local_addr = %self.local_addr, "relay stopped accepting");
        Ok(())
    }
}

/// Serves every configured port pair through one [`Multiplexer`].
#[derive(Debug)]
pub struct RelayServer {
    relays: Vec<PortRelay>,
}

impl RelayServer {
    /// Bind every pair up front. Any bind failure aborts the whole server.
    pub fn bind(mux: Arc<Multiplexer>, config: RelayConfig) -> Result<Self> {
        let relays = config
            .pairs
            .iter()
            .map(|pair| PortRelay::bind(Arc::clone(&mux), *pair, &config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { relays })
    }

    /// Bound local addresses, one per pair, in configuration order.
    pub fn local_addrs(&self) -> Vec<(RelayPair, SocketAddr)> {
        self.relays
            .iter()
            .map(|relay| (relay.pair(), relay.local_addr()))
            .collect()
    }

    /// Run one accept loop per pair and return once all have stopped.
    pub fn serve(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        thread::scope(|scope| {
            let loops: Vec<_> = self
                .relays
                .iter()
                .map(|relay| {
                    let shutdown = Arc::clone(&shutdown);
                    scope.spawn(move || relay.serve(&shutdown))
                })
                .collect();

            let mut result = Ok(());
            for handle in loops {
                let outcome = handle
                    .join()
                    .unwrap_or_else(|_| Err(std::io::Error::other("accept loop panicked").into()));
                if result.is_ok() {
                    result = outcome;
                }
            }
            result
        })
    }
}

fn handle_connection(
    mux: &Multiplexer,
    settings: ConnectionSettings,
    remote_port: u16,
    client: TcpStream,
    peer: SocketAddr,
) {
    let device_stream = match open_device_stream(mux, settings, remote_port) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%peer, remote_port, error = %err, "could not reach device, closing client");
            let _ = client.shutdown(Shutdown::Both);
            return;
        }
    };

    info!(%peer, remote_port, "relaying connection");
    match splice(client, device_stream, settings.buffer_size) {
        Ok(stats) => info!(
            %peer,
            to_device = stats.to_device,
            to_client = stats.to_client,
            "connection closed"
        ),
        Err(err) => warn!(%peer, error = %err, "relay failed"),
    }
}

fn open_device_stream(
    mux: &Multiplexer,
    settings: ConnectionSettings,
    remote_port: u16,
) -> Result<DaemonStream> {
    let device = mux.select_device(settings.selection, settings.device_wait)?;
    debug!(device_id = device.device_id, remote_port, "opening device stream");
    Ok(mux.open_stream(&device, remote_port)?)
}
