use std::fmt;
use std::io;

use muxrelay_client::MuxError;
use muxrelay_relay::RelayError;
use muxrelay_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const NO_DEVICE: i32 = 2;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { address, source } => {
            io_error(&format!("{context}: daemon at {address}"), source)
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidAddress(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::Connection(err) => transport_error(context, err),
        MuxError::NoDevice => CliError::new(NO_DEVICE, format!("{context}: {err}")),
        MuxError::Protocol(_)
        | MuxError::VersionMismatch { .. }
        | MuxError::NoUsableProtocol => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        MuxError::Connect(_) | MuxError::ListenRejected(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        MuxError::Streaming => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn relay_error(context: &str, err: RelayError) -> CliError {
    match err {
        RelayError::InvalidPortSpec { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        RelayError::Bind { address, source } => {
            io_error(&format!("{context}: bind {address}"), source)
        }
        RelayError::Mux(err) => mux_error(context, err),
        RelayError::Io(source) => io_error(context, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_device_has_its_own_code() {
        assert_eq!(mux_error("relay", MuxError::NoDevice).code, NO_DEVICE);
    }

    #[test]
    fn protocol_failures_are_data_invalid() {
        assert_eq!(
            mux_error("connect", MuxError::NoUsableProtocol).code,
            DATA_INVALID
        );
        assert_eq!(
            mux_error("connect", MuxError::Protocol("bad".to_string())).code,
            DATA_INVALID
        );
    }

    #[test]
    fn missing_daemon_socket_is_transport_error() {
        let err = MuxError::Connection(TransportError::Connect {
            address: muxrelay_transport::DaemonAddress::platform_default(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        let cli = mux_error("connect", err);
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.contains("daemon at"));
    }

    #[test]
    fn permission_denied_maps_through_relay_errors() {
        let err = RelayError::Bind {
            address: "127.0.0.1:22".parse().expect("address should parse"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(relay_error("bind", err).code, PERMISSION_DENIED);
    }

    #[test]
    fn bad_port_spec_is_usage() {
        let err = "x:1".parse::<muxrelay_relay::RelayPair>().unwrap_err();
        assert_eq!(relay_error("ports", err).code, USAGE);
    }
}
