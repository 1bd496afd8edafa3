use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use muxrelay_client::{DaemonAddress, Device, MuxConfig, Multiplexer};

use crate::cmd::{install_ctrlc_handler, parse_duration, DevicesArgs};
use crate::exit::{mux_error, CliResult, SUCCESS};
use crate::output::{print_device_event, print_devices, DeviceEvent, OutputFormat};

const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: DevicesArgs, format: OutputFormat, daemon: DaemonAddress) -> CliResult<i32> {
    let timeout = parse_duration("timeout", &args.timeout)?;

    let mux = Multiplexer::connect(MuxConfig::new(daemon))
        .map_err(|err| mux_error("daemon connection failed", err))?;
    let mut known = mux
        .wait_for_devices(timeout)
        .map_err(|err| mux_error("device discovery failed", err))?;
    print_devices(&known, format);

    if !args.watch {
        return Ok(SUCCESS);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&shutdown))?;

    while !shutdown.load(Ordering::SeqCst) {
        let changed = mux
            .pump(Some(WATCH_POLL_INTERVAL))
            .map_err(|err| mux_error("device watch failed", err))?;
        if !changed {
            continue;
        }

        let current = mux.devices();
        for (event, device) in diff_devices(&known, &current) {
            print_device_event(event, &device, format);
        }
        known = current;
    }

    Ok(SUCCESS)
}

/// Changes between two registry snapshots, detaches first.
fn diff_devices(before: &[Device], after: &[Device]) -> Vec<(DeviceEvent, Device)> {
    let detached = before
        .iter()
        .filter(|old| !after.iter().any(|new| new.device_id == old.device_id))
        .map(|d| (DeviceEvent::Detached, d.clone()));
    let attached = after
        .iter()
        .filter(|new| !before.contains(new))
        .map(|d| (DeviceEvent::Attached, d.clone()));
    detached.chain(attached).collect()
}
