//! Print devices as they attach and detach.
//!
//! Run with:
//!   cargo run --example watch-devices
//!
//! Set `USBMUXD_SOCKET_ADDRESS` to point at a non-default daemon.

use std::time::Duration;

use muxrelay::client::{DaemonAddress, MuxConfig, Multiplexer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = match std::env::var("USBMUXD_SOCKET_ADDRESS") {
        Ok(value) => value.parse()?,
        Err(_) => DaemonAddress::platform_default(),
    };

    let mux = Multiplexer::connect(MuxConfig::new(address))?;
    eprintln!("Connected (protocol {})", mux.version());

    let mut known = mux.wait_for_devices(Duration::from_secs(1))?;
    for device in &known {
        println!("present:  {device}");
    }

    loop {
        if !mux.pump(Some(Duration::from_secs(1)))? {
            continue;
        }
        let current = mux.devices();
        for device in current.iter().filter(|d| !known.contains(d)) {
            println!("attached: {device}");
        }
        for device in known.iter().filter(|d| !current.contains(d)) {
            println!("detached: {device}");
        }
        known = current;
    }
}
