use std::fmt;

/// Width of the NUL-padded serial field in binary device records.
pub const SERIAL_FIELD_LEN: usize = 256;

/// A device reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    /// Daemon-assigned identifier, reused only after the device is removed.
    pub device_id: u32,
    /// USB product id.
    pub product_id: u16,
    /// Device serial (UDID).
    pub serial_number: String,
    /// USB location id.
    pub location_id: u32,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Device: ID {} ProdID 0x{:04x} Serial '{}' Location 0x{:x}>",
            self.device_id, self.product_id, self.serial_number, self.location_id
        )
    }
}

/// Logical kind of a control message, independent of codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Result,
    Connect,
    Listen,
    DeviceAttach,
    DeviceRemove,
}

impl MessageKind {
    /// Stable name used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Result => "Result",
            MessageKind::Connect => "Connect",
            MessageKind::Listen => "Listen",
            MessageKind::DeviceAttach => "Attached",
            MessageKind::DeviceRemove => "Detached",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control message exchanged with the daemon.
///
/// `Connect` and `Listen` are requests, `Result` is a reply, and the device
/// variants are unsolicited events on a listening connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Reply to a request. `code == 0` means success.
    Result { code: u32 },
    /// Ask the daemon to connect to `port` on the device. `port` is in host order.
    Connect { device_id: u32, port: u16 },
    /// Subscribe to device attach/detach events.
    Listen,
    /// A device was attached.
    DeviceAttach(Device),
    /// A device was detached.
    DeviceRemove { device_id: u32 },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Result { .. } => MessageKind::Result,
            Message::Connect { .. } => MessageKind::Connect,
            Message::Listen => MessageKind::Listen,
            Message::DeviceAttach(_) => MessageKind::DeviceAttach,
            Message::DeviceRemove { .. } => MessageKind::DeviceRemove,
        }
    }
}

/// Swap the two bytes of a port number.
///
/// The daemon expects `Connect` ports in the opposite byte order from host
/// order: 8080 (0x1F90) travels as 0x901F. Applying it twice is the identity.
pub fn swap_port(port: u16) -> u16 {
    port.swap_bytes()
}
