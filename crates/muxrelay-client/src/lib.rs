//! usbmuxd protocol client.
//!
//! [`ControlConnection`] speaks the request/reply protocol on one daemon
//! connection and tracks device events. [`Multiplexer`] negotiates the
//! protocol version once, keeps a listening connection for device tracking,
//! and opens a fresh connection for every device-side stream.

pub mod config;
pub mod connection;
pub mod error;
pub mod mux;
pub mod registry;

pub use config::{DeviceSelection, MuxConfig};
pub use connection::{ConnectionState, ControlConnection};
pub use error::{describe_result_code, MuxError, Result};
pub use mux::Multiplexer;
pub use registry::{DeviceRegistry, SharedRegistry};

pub use muxrelay_frame::{Device, ProtocolVersion};
pub use muxrelay_transport::{DaemonAddress, DaemonStream};
