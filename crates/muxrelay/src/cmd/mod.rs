use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use muxrelay_client::{DaemonAddress, DeviceSelection};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod devices;
pub mod relay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Relay local TCP ports to ports on the device.
    Relay(RelayArgs),
    /// List attached devices.
    Devices(DevicesArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, daemon: DaemonAddress) -> CliResult<i32> {
    match command {
        Command::Relay(args) => relay::run(args, format, daemon),
        Command::Devices(args) => devices::run(args, format, daemon),
        Command::Version(args) => version::run(args),
    }
}

/// Device selection policy as a CLI value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SelectArg {
    /// Earliest attached device.
    First,
    /// Most recently attached device.
    #[default]
    Last,
}

impl From<SelectArg> for DeviceSelection {
    fn from(arg: SelectArg) -> Self {
        match arg {
            SelectArg::First => DeviceSelection::First,
            SelectArg::Last => DeviceSelection::Last,
        }
    }
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Port pairs to relay: PORT or LOCAL:REMOTE.
    #[arg(required = true, value_name = "PORTS")]
    pub ports: Vec<String>,
    /// Which device new connections go to.
    #[arg(long, value_name = "POLICY", default_value = "last")]
    pub select: SelectArg,
    /// Use the first attached device (same as --select first).
    #[arg(short = 't', long)]
    pub first: bool,
    /// Host address to bind local ports on.
    #[arg(long, value_name = "ADDR", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,
    /// How long to wait for a device to attach (e.g. 1s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "1s")]
    pub device_wait: String,
}

impl RelayArgs {
    pub fn selection(&self) -> DeviceSelection {
        if self.first {
            DeviceSelection::First
        } else {
            self.select.into()
        }
    }
}

#[derive(Args, Debug)]
pub struct DevicesArgs {
    /// Keep running and print attach/detach events until interrupted.
    #[arg(long)]
    pub watch: bool,
    /// How long to wait for the first device (e.g. 1s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a duration flag such as `5s`, `150ms` or a bare number of seconds.
pub fn parse_duration(flag: &str, input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, format!("{flag} must not be empty")));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid {flag} value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, format!("{flag} must be greater than zero")));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Set `shutdown` on Ctrl-C.
pub fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
