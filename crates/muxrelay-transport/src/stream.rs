use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::address::DaemonAddress;
use crate::error::{Result, TransportError};

/// A connected stream to the daemon.
///
/// Starts life carrying control frames; after a successful `Connect` the same
/// stream becomes a raw duplex pipe to a device-side port.
pub struct DaemonStream {
    inner: DaemonStreamInner,
}

enum DaemonStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Read for DaemonStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            DaemonStreamInner::Unix(stream) => stream.read(buf),
            DaemonStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for DaemonStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            DaemonStreamInner::Unix(stream) => stream.write(buf),
            DaemonStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            DaemonStreamInner::Unix(stream) => stream.flush(),
            DaemonStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for DaemonStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: DaemonStreamInner::Unix(stream),
        }
    }
}

impl From<TcpStream> for DaemonStream {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: DaemonStreamInner::Tcp(stream),
        }
    }
}

impl DaemonStream {
    /// Connect to the daemon (blocking).
    pub fn connect(address: &DaemonAddress) -> Result<Self> {
        let stream = match address {
            #[cfg(unix)]
            DaemonAddress::Unix(path) => std::os::unix::net::UnixStream::connect(path)
                .map(Self::from)
                .map_err(|e| TransportError::Connect {
                    address: address.clone(),
                    source: e,
                })?,
            #[cfg(not(unix))]
            DaemonAddress::Unix(_) => {
                return Err(TransportError::Connect {
                    address: address.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "unix domain sockets are not available on this platform",
                    ),
                })
            }
            DaemonAddress::Tcp(addr) => {
                let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
                    address: address.clone(),
                    source: e,
                })?;
                stream.set_nodelay(true)?;
                Self::from(stream)
            }
        };
        debug!(%address, transport = address.transport_name(), "connected to daemon");
        Ok(stream)
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            DaemonStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            DaemonStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            DaemonStreamInner::Unix(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
            DaemonStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            DaemonStreamInner::Unix(stream) => Ok(Self::from(stream.try_clone()?)),
            DaemonStreamInner::Tcp(stream) => Ok(Self::from(stream.try_clone()?)),
        }
    }

    /// Shut down both directions; affects every clone of this stream.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            #[cfg(unix)]
            DaemonStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            DaemonStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            // Already torn down by the peer.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Block until the stream has data (or EOF/error) to read.
    ///
    /// Returns `false` if `timeout` elapses first. `None` waits indefinitely.
    /// Does not consume any bytes.
    #[cfg(unix)]
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            DaemonStreamInner::Unix(stream) => stream.as_raw_fd(),
            DaemonStreamInner::Tcp(stream) => stream.as_raw_fd(),
        };
        let timeout_ms: libc::c_int = match timeout {
            Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        loop {
            // SAFETY: `pfd` is a valid pollfd for the duration of the call and `fd`
            // is an open socket descriptor owned by this stream.
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }
            // POLLHUP/POLLERR count as readable: the next read reports the failure.
            return Ok(rc > 0);
        }
    }

    /// Block until the stream has data (or EOF/error) to read.
    ///
    /// Returns `false` if `timeout` elapses first. `None` waits indefinitely.
    /// Does not consume any bytes.
    #[cfg(not(unix))]
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        let DaemonStreamInner::Tcp(stream) = &self.inner;
        let previous = stream.read_timeout()?;
        let immediate = timeout.is_some_and(|t| t.is_zero());
        if immediate {
            stream.set_nonblocking(true)?;
        } else {
            stream.set_read_timeout(timeout)?;
        }
        let mut probe = [0u8; 1];
        let result = stream.peek(&mut probe);
        if immediate {
            stream.set_nonblocking(false)?;
        } else {
            stream.set_read_timeout(previous)?;
        }
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for DaemonStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            DaemonStreamInner::Unix(_) => f
                .debug_struct("DaemonStream")
                .field("type", &"unix")
                .finish(),
            DaemonStreamInner::Tcp(_) => {
                f.debug_struct("DaemonStream").field("type", &"tcp").finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;
    use crate::io::{recv_exact, send_all};

    #[test]
    #[cfg(unix)]
    fn connect_over_unix_socket() {
        let dir = std::env::temp_dir().join(format!("muxrelay-transport-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("daemon.sock");
        let _ = std::fs::remove_file(&sock_path);
        let listener = std::os::unix::net::UnixListener::bind(&sock_path).unwrap();

        let handle = std::thread::spawn(move || {
            let (mut server, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            server.read_exact(&mut buf).unwrap();
            server.write_all(&buf).unwrap();
        });

        let address = DaemonAddress::Unix(sock_path.clone());
        let mut client = DaemonStream::connect(&address).unwrap();
        send_all(&mut client, b"hello").unwrap();
        let echoed = recv_exact(&mut client, 5).unwrap();
        assert_eq!(echoed.as_ref(), b"hello");

        handle.join().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn connect_over_loopback_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (mut server, _) = listener.accept().unwrap();
            server.write_all(b"pong").unwrap();
        });

        let mut client = DaemonStream::connect(&DaemonAddress::Tcp(addr)).unwrap();
        let reply = recv_exact(&mut client, 4).unwrap();
        assert_eq!(reply.as_ref(), b"pong");
        handle.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn connect_missing_socket_fails() {
        let address = DaemonAddress::Unix(std::path::PathBuf::from(
            "/tmp/muxrelay-definitely-missing/daemon.sock",
        ));
        let err = DaemonStream::connect(&address).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn wait_readable_times_out_then_sees_data() {
        let (left, mut right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = DaemonStream::from(left);

        let ready = stream
            .wait_readable(Some(Duration::from_millis(20)))
            .unwrap();
        assert!(!ready);

        right.write_all(b"x").unwrap();
        let ready = stream.wait_readable(Some(Duration::from_secs(2))).unwrap();
        assert!(ready);
    }

    #[test]
    #[cfg(unix)]
    fn wait_readable_reports_hangup() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut stream = DaemonStream::from(left);
        drop(right);

        assert!(stream.wait_readable(Some(Duration::from_secs(2))).unwrap());
        let err = recv_exact(&mut stream, 1).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionBroken));
    }

    #[test]
    #[cfg(unix)]
    fn shutdown_unblocks_clone_reader() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = DaemonStream::from(left);
        let mut reader = stream.try_clone().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            reader.read(&mut buf).unwrap()
        });

        std::thread::sleep(Duration::from_millis(20));
        stream.shutdown().unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }
}
