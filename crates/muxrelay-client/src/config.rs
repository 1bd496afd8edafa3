use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use muxrelay_frame::{Device, FrameConfig, DEFAULT_MAX_PAYLOAD};
use muxrelay_transport::DaemonAddress;

/// Default bound on how long a control request waits for its reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Client configuration shared by every connection a [`crate::Multiplexer`] opens.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Where the daemon listens.
    pub address: DaemonAddress,
    /// Bound on reply waits for `Listen` and `Connect`. `None` waits forever.
    pub reply_timeout: Option<Duration>,
    /// Largest frame payload accepted from the daemon.
    pub max_payload_size: usize,
}

impl MuxConfig {
    /// Configuration for a daemon at `address`, defaults elsewhere.
    pub fn new(address: DaemonAddress) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Frame limits and timeouts for control traffic.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: self.reply_timeout,
            write_timeout: self.reply_timeout,
        }
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            address: DaemonAddress::platform_default(),
            reply_timeout: Some(DEFAULT_REPLY_TIMEOUT),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Which attached device a new stream goes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceSelection {
    /// The device attached earliest.
    First,
    /// The device attached most recently.
    #[default]
    Last,
}

impl DeviceSelection {
    /// Pick a device from `devices`, which must be in attachment order.
    pub fn select(self, devices: &[Device]) -> Option<&Device> {
        match self {
            DeviceSelection::First => devices.first(),
            DeviceSelection::Last => devices.last(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceSelection::First => "first",
            DeviceSelection::Last => "last",
        }
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(DeviceSelection::First),
            "last" => Ok(DeviceSelection::Last),
            other => Err(format!(
                "unknown device selection '{other}' (expected first or last)"
            )),
        }
    }
}
