//! Byte-stream transport to the local multiplexing daemon.
//!
//! Provides a unified stream type over the two ways usbmuxd is reachable:
//! - Unix domain sockets (Linux/macOS, `/var/run/usbmuxd`)
//! - Loopback TCP (platforms without domain sockets, `127.0.0.1:27015`)
//!
//! This is the lowest layer of muxrelay. Framing, the control protocol and
//! the relay all build on [`DaemonStream`] and the exact-I/O helpers here.

pub mod address;
pub mod error;
pub mod io;
pub mod stream;

pub use address::DaemonAddress;
pub use error::{Result, TransportError};
pub use io::{recv_exact, send_all};
pub use stream::DaemonStream;
