use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Well-known usbmuxd socket path on Unix platforms.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/usbmuxd";

/// Loopback port usbmuxd listens on where domain sockets are unavailable.
pub const DEFAULT_TCP_PORT: u16 = 27015;

/// Where the multiplexing daemon can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonAddress {
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
    /// Loopback (or otherwise reachable) TCP endpoint.
    Tcp(SocketAddr),
}

impl DaemonAddress {
    /// The platform default daemon address.
    pub fn platform_default() -> Self {
        if cfg!(unix) {
            Self::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
        } else {
            Self::Tcp(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::LOCALHOST,
                DEFAULT_TCP_PORT,
            )))
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Unix(_) => "unix-domain-socket",
            Self::Tcp(_) => "tcp",
        }
    }
}

impl Default for DaemonAddress {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl fmt::Display for DaemonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// Accepts `unix:/path`, a bare absolute path, `tcp:host:port` or `host:port`.
/// The `unix:` / `tcp:` prefixes are case-insensitive.
impl FromStr for DaemonAddress {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidAddress(input.to_string()));
        }

        if let Some(path) = strip_prefix_ignore_case(input, "unix:") {
            if path.is_empty() {
                return Err(TransportError::InvalidAddress(input.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if input.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(input)));
        }

        let endpoint = strip_prefix_ignore_case(input, "tcp:").unwrap_or(input);
        if let Ok(addr) = endpoint.parse::<SocketAddr>() {
            return Ok(Self::Tcp(addr));
        }
        endpoint
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(Self::Tcp)
            .ok_or_else(|| TransportError::InvalidAddress(input.to_string()))
    }
}

fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let head = input.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&input[prefix.len()..])
    } else {
        None
    }
}
