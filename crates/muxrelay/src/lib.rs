//! Reach TCP services on USB-attached devices through usbmuxd.
//!
//! muxrelay talks to the local multiplexing daemon (usbmuxd), tracks which
//! devices are attached, opens byte streams to ports on them, and relays
//! local TCP ports to device ports.
//!
//! # Crate Structure
//!
//! - [`transport`]: daemon socket addressing and exact-length I/O
//! - [`frame`]: the 16-byte envelope plus binary and property-list codecs
//! - [`client`]: control connections, device tracking and the [`client::Multiplexer`]
//! - [`relay`]: the TCP relay server (behind the `relay` feature)

/// Re-export transport types.
pub mod transport {
    pub use muxrelay_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use muxrelay_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use muxrelay_client::*;
}

/// Re-export relay types (requires `relay` feature).
#[cfg(feature = "relay")]
pub mod relay {
    pub use muxrelay_relay::*;
}
