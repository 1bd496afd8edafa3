use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;

use muxrelay_transport::{DaemonStream, TransportError};
use tracing::debug;

/// A socket that can be split into independent read and write halves.
pub trait RelayStream: Read + Write + Send + Sized + 'static {
    /// Another handle to the same socket.
    fn try_clone_stream(&self) -> io::Result<Self>;

    /// Shut down both directions, for every handle of the socket.
    fn shutdown_both(&self) -> io::Result<()>;
}

impl RelayStream for TcpStream {
    fn try_clone_stream(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_both(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl RelayStream for DaemonStream {
    fn try_clone_stream(&self) -> io::Result<Self> {
        self.try_clone().map_err(into_io)
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown().map_err(into_io)
    }
}

fn into_io(err: TransportError) -> io::Error {
    match err {
        TransportError::Io(err) => err,
        other => io::Error::other(other),
    }
}

/// Byte counts of one finished relay connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the local client to the device.
    pub to_device: u64,
    /// Bytes copied from the device to the local client.
    pub to_client: u64,
}

/// Copy bytes between `client` and `device` until either side closes.
///
/// Each direction runs on its own thread; the caller blocks until both have
/// ended. When one direction ends, both sockets are shut down so the other
/// direction stops too.
pub fn splice<A, B>(client: A, device: B, buffer_size: usize) -> io::Result<RelayStats>
where
    A: RelayStream,
    B: RelayStream,
{
    let client_reader = client.try_clone_stream()?;
    let device_reader = device.try_clone_stream()?;
    let buffer_size = buffer_size.max(1);

    let upstream =
        thread::spawn(move || forward(client_reader, device, buffer_size, "to_device"));
    let downstream =
        thread::spawn(move || forward(device_reader, client, buffer_size, "to_client"));

    let to_device = upstream
        .join()
        .map_err(|_| io::Error::other("forwarding thread panicked"))?;
    let to_client = downstream
        .join()
        .map_err(|_| io::Error::other("forwarding thread panicked"))?;

    Ok(RelayStats {
        to_device,
        to_client,
    })
}

fn forward<R, W>(mut src: R, mut dst: W, buffer_size: usize, direction: &'static str) -> u64
where
    R: RelayStream,
    W: RelayStream,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!(direction, error = %err, "read ended");
                break;
            }
        };
        if let Err(err) = dst.write_all(&buf[..n]) {
            debug!(direction, error = %err, "write ended");
            break;
        }
        total += n as u64;
    }

    let _ = src.shutdown_both();
    let _ = dst.shutdown_both();
    debug!(direction, bytes = total, "forwarding finished");
    total
}
