use std::sync::{Arc, RwLock};

use muxrelay_frame::Device;

/// Registry shared between the listening connection (sole writer) and readers.
pub type SharedRegistry = Arc<RwLock<DeviceRegistry>>;

/// Attached devices in attachment order, unique by `device_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attached device.
    ///
    /// A device whose id is already tracked replaces the existing entry and
    /// keeps its position.
    pub fn attach(&mut self, device: Device) {
        match self
            .devices
            .iter_mut()
            .find(|d| d.device_id == device.device_id)
        {
            Some(slot) => *slot = device,
            None => self.devices.push(device),
        }
    }

    /// Forget a device. Unknown ids are ignored.
    pub fn detach(&mut self, device_id: u32) -> Option<Device> {
        let index = self
            .devices
            .iter()
            .position(|d| d.device_id == device_id)?;
        Some(self.devices.remove(index))
    }

    /// Forget every device.
    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn get(&self, device_id: u32) -> Option<&Device> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Owned copy of the current device list.
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.clone()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
