//! usbmuxd wire framing.
//!
//! Every control message travels in a 16-byte little-endian envelope:
//! - total length (header + payload)
//! - protocol version (0 = binary, 1 = property list)
//! - message kind
//! - request tag
//!
//! Two interchangeable [`WireCodec`]s turn [`Message`]s into envelopes and
//! back. Which one a connection uses is decided once by version negotiation.

pub mod binary;
pub mod codec;
pub mod error;
pub mod message;
pub mod property_list;
pub mod reader;
pub mod wire;
pub mod writer;

pub use binary::BinaryCodec;
pub use codec::{
    decode_frame, encode_frame, FrameConfig, RawFrame, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{swap_port, Device, Message, MessageKind, SERIAL_FIELD_LEN};
pub use property_list::PlistCodec;
pub use reader::FrameReader;
pub use wire::{ProtocolVersion, WireCodec};
pub use writer::FrameWriter;
