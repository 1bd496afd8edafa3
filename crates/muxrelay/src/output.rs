use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use muxrelay_client::Device;
use muxrelay_relay::RelayPair;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DeviceOutput {
    pub device_id: u32,
    pub product_id: String,
    pub serial_number: String,
    pub location_id: String,
}

impl From<&Device> for DeviceOutput {
    fn from(device: &Device) -> Self {
        Self {
            device_id: device.device_id,
            product_id: format!("0x{:04x}", device.product_id),
            serial_number: device.serial_number.clone(),
            location_id: format!("0x{:x}", device.location_id),
        }
    }
}

#[derive(Serialize)]
struct DeviceListOutput {
    devices: Vec<DeviceOutput>,
    count: usize,
}

/// Attach/detach notification printed by `devices --watch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceEvent {
    Attached,
    Detached,
}

#[derive(Serialize)]
struct DeviceEventOutput {
    event: DeviceEvent,
    device: DeviceOutput,
    timestamp: String,
}

#[derive(Serialize)]
struct RelayOutput {
    device: DeviceOutput,
    listeners: Vec<ListenerOutput>,
}

#[derive(Serialize)]
struct ListenerOutput {
    local_address: String,
    remote_port: u16,
}

pub fn print_devices(devices: &[Device], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DeviceListOutput {
                devices: devices.iter().map(DeviceOutput::from).collect(),
                count: devices.len(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = table_with_header(&["ID", "PRODUCT", "SERIAL", "LOCATION"]);
            for device in devices {
                table.add_row(device_row(device));
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if devices.is_empty() {
                println!("no devices attached");
            }
            for device in devices {
                println!("{device}");
            }
        }
    }
}

pub fn print_device_event(event: DeviceEvent, device: &Device, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DeviceEventOutput {
            event,
            device: DeviceOutput::from(device),
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table =
                table_with_header(&["EVENT", "ID", "PRODUCT", "SERIAL", "LOCATION"]);
            let mut row = vec![format!("{event:?}").to_uppercase()];
            row.extend(device_row(device));
            table.add_row(row);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let verb = match event {
                DeviceEvent::Attached => "attached",
                DeviceEvent::Detached => "detached",
            };
            println!("{verb}: {device}");
        }
    }
}

pub fn print_relay_started(
    device: &Device,
    listeners: &[(RelayPair, SocketAddr)],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&RelayOutput {
            device: DeviceOutput::from(device),
            listeners: listeners
                .iter()
                .map(|(pair, addr)| ListenerOutput {
                    local_address: addr.to_string(),
                    remote_port: pair.remote_port,
                })
                .collect(),
        }),
        OutputFormat::Table => {
            println!("device: {device}");
            let mut table = table_with_header(&["LOCAL", "DEVICE PORT"]);
            for (pair, addr) in listeners {
                table.add_row(vec![addr.to_string(), pair.remote_port.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("device: {device}");
            for (pair, addr) in listeners {
                println!("forwarding {addr} -> device port {}", pair.remote_port);
            }
        }
    }
}

fn table_with_header(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn device_row(device: &Device) -> Vec<String> {
    let out = DeviceOutput::from(device);
    vec![
        out.device_id.to_string(),
        out.product_id,
        out.serial_number,
        out.location_id,
    ]
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_output_uses_hex_ids() {
        let device = Device {
            device_id: 3,
            product_id: 0x12a8,
            serial_number: "abc".to_string(),
            location_id: 0x14_1000,
        };
        let out = DeviceOutput::from(&device);
        assert_eq!(out.product_id, "0x12a8");
        assert_eq!(out.location_id, "0x141000");

        let json = serde_json::to_value(&out).expect("output should serialize");
        assert_eq!(json["device_id"], 3);
        assert_eq!(json["serial_number"], "abc");
    }

    #[test]
    fn event_serializes_lowercase() {
        let json = serde_json::to_value(DeviceEvent::Detached).expect("event should serialize");
        assert_eq!(json, "detached");
    }
}
