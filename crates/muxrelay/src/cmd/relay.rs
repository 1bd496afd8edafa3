use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use muxrelay_client::{DaemonAddress, MuxConfig, Multiplexer};
use muxrelay_relay::{RelayConfig, RelayPair, RelayServer};

use crate::cmd::{install_ctrlc_handler, parse_duration, RelayArgs};
use crate::exit::{mux_error, relay_error, CliResult, SUCCESS};
use crate::output::{print_relay_started, OutputFormat};

pub fn run(args: RelayArgs, format: OutputFormat, daemon: DaemonAddress) -> CliResult<i32> {
    let pairs = parse_pairs(&args.ports)?;
    let device_wait = parse_duration("device-wait", &args.device_wait)?;
    let selection = args.selection();

    let mux = Multiplexer::connect(MuxConfig::new(daemon))
        .map_err(|err| mux_error("daemon connection failed", err))?;
    tracing::info!(version = %mux.version(), "waiting for devices");

    let device = mux
        .select_device(selection, device_wait)
        .map_err(|err| mux_error("device discovery failed", err))?;

    let config = RelayConfig {
        pairs,
        bind_address: args.bind,
        selection,
        device_wait,
        ..RelayConfig::default()
    };
    let server =
        RelayServer::bind(Arc::new(mux), config).map_err(|err| relay_error("bind failed", err))?;
    print_relay_started(&device, &server.local_addrs(), format);

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&shutdown))?;

    server
        .serve(shutdown)
        .map_err(|err| relay_error("relay failed", err))?;
    tracing::info!("relay stopped");

    Ok(SUCCESS)
}

fn parse_pairs(specs: &[String]) -> CliResult<Vec<RelayPair>> {
    specs
        .iter()
        .map(|spec| {
            spec.parse::<RelayPair>()
                .map_err(|err| relay_error("invalid port pair", err))
        })
        .collect()
}
