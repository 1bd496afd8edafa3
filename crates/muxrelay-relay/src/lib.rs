//! Relays local TCP connections to ports on a USB-attached device.
//!
//! Every accepted connection gets its own multiplexed stream to the device,
//! opened through a shared [`muxrelay_client::Multiplexer`]. Bytes are copied
//! in both directions until either side closes.

pub mod config;
pub mod error;
pub mod forward;
pub mod server;

pub use config::{RelayConfig, RelayPair, DEFAULT_BUFFER_SIZE, DEFAULT_DEVICE_WAIT};
pub use error::{RelayError, Result};
pub use forward::{splice, RelayStats, RelayStream};
pub use server::{PortRelay, RelayServer};
