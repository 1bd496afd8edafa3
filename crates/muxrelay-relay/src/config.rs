use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use muxrelay_client::DeviceSelection;

use crate::error::RelayError;

/// Default chunk size for each forwarding direction.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default wait for a device when a connection arrives and none is attached.
pub const DEFAULT_DEVICE_WAIT: Duration = Duration::from_secs(1);

/// A local TCP port relayed to a port on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayPair {
    /// Port bound on the host. `0` lets the OS pick one.
    pub local_port: u16,
    /// Port connected to on the device for every accepted connection.
    pub remote_port: u16,
}

impl RelayPair {
    pub fn new(local_port: u16, remote_port: u16) -> Self {
        Self {
            local_port,
            remote_port,
        }
    }
}

impl fmt::Display for RelayPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.local_port, self.remote_port)
    }
}

/// Parses `PORT` (same port on both ends) or `LOCAL:REMOTE`.
impl FromStr for RelayPair {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        let (local, remote) = match spec.split_once(':') {
            Some((local, remote)) => (parse_port(s, local)?, parse_port(s, remote)?),
            None => {
                let port = parse_port(s, spec)?;
                (port, port)
            }
        };
        if remote == 0 {
            return Err(RelayError::port_spec(s, "device port must not be 0"));
        }
        Ok(Self::new(local, remote))
    }
}

fn parse_port(spec: &str, text: &str) -> Result<u16, RelayError> {
    text.trim()
        .parse::<u16>()
        .map_err(|err| RelayError::port_spec(spec, format!("'{text}' is not a port: {err}")))
}

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Port pairs to serve.
    pub pairs: Vec<RelayPair>,
    /// Host address local ports are bound on. Default: 127.0.0.1.
    pub bind_address: IpAddr,
    /// Which device new connections go to.
    pub selection: DeviceSelection,
    /// How long a new connection waits for a device to attach.
    pub device_wait: Duration,
    /// Read chunk size per forwarding direction.
    pub buffer_size: usize,
}

impl RelayConfig {
    pub fn new(pairs: Vec<RelayPair>) -> Self {
        Self {
            pairs,
            ..Self::default()
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            selection: DeviceSelection::default(),
            device_wait: DEFAULT_DEVICE_WAIT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_port_maps_to_itself() {
        let pair: RelayPair = "2222".parse().expect("port should parse");
        assert_eq!(pair, RelayPair::new(2222, 2222));
    }

    #[test]
    fn local_remote_pair() {
        let pair: RelayPair = "2222:22".parse().expect("pair should parse");
        assert_eq!(pair, RelayPair::new(2222, 22));
        assert_eq!(pair.to_string(), "2222:22");
    }

    #[test]
    fn ephemeral_local_port_allowed() {
        let pair: RelayPair = "0:22".parse().expect("pair should parse");
        assert_eq!(pair.local_port, 0);
    }

    #[test]
    fn rejects_bad_specs() {
        for spec in ["", "abc", "22:", ":22", "70000", "1:2:3", "22:0", "0"] {
            let err = spec.parse::<RelayPair>().unwrap_err();
            assert!(
                matches!(err, RelayError::InvalidPortSpec { .. }),
                "spec {spec:?} gave {err}"
            );
        }
    }

    #[test]
    fn defaults() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(cfg.selection, DeviceSelection::Last);
        assert_eq!(cfg.device_wait, Duration::from_secs(1));
        assert_eq!(cfg.buffer_size, 4096);
    }
}
