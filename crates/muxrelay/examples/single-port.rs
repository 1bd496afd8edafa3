//! Relay one local port to a device port until interrupted.
//!
//! Run with:
//!   cargo run --example single-port -- 2222:22
//!
//! Then, in another terminal:
//!   ssh -p 2222 root@127.0.0.1

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use muxrelay::client::{DaemonAddress, MuxConfig, Multiplexer};
use muxrelay::relay::{RelayConfig, RelayPair, RelayServer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let spec = std::env::args().nth(1).unwrap_or_else(|| "2222:22".to_string());
    let pair: RelayPair = spec.parse()?;

    let mux = Multiplexer::connect(MuxConfig::new(DaemonAddress::platform_default()))?;
    let config = RelayConfig::new(vec![pair]);
    let device = mux.select_device(config.selection, config.device_wait)?;
    eprintln!("Relaying to {device}");

    let server = RelayServer::bind(Arc::new(mux), config)?;
    for (pair, addr) in server.local_addrs() {
        eprintln!("Listening on {addr} -> device port {}", pair.remote_port);
    }

    // Never set; stop with Ctrl-C.
    server.serve(Arc::new(AtomicBool::new(false)))?;
    Ok(())
}
