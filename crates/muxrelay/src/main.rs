mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use muxrelay_client::DaemonAddress;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "muxrelay",
    version,
    about = "Relay local TCP ports to USB-attached devices"
)]
struct Cli {
    /// usbmuxd address (unix:/path, /path, tcp:host:port or host:port).
    #[arg(
        long,
        value_name = "ADDRESS",
        env = "USBMUXD_SOCKET_ADDRESS",
        global = true
    )]
    socket: Option<DaemonAddress>,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let daemon = cli.socket.unwrap_or_default();
    tracing::debug!(daemon = %daemon, "using daemon address");
    let result = cmd::run(cli.command, format, daemon);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::SelectArg;
    use std::path::PathBuf;

    #[test]
    fn parses_relay_subcommand() {
        let cli = Cli::try_parse_from(["muxrelay", "relay", "2222:22", "8080", "--first"])
            .expect("relay args should parse");

        match cli.command {
            Command::Relay(args) => {
                assert_eq!(args.ports, vec!["2222:22", "8080"]);
                assert!(args.first);
                assert_eq!(args.select, SelectArg::Last);
                assert_eq!(args.device_wait, "1s");
            }
            other => panic!("expected relay command, got {other:?}"),
        }
    }

    #[test]
    fn relay_requires_ports() {
        let err = Cli::try_parse_from(["muxrelay", "relay"])
            .expect_err("relay without ports should fail");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn parses_global_socket_after_subcommand() {
        let cli = Cli::try_parse_from([
            "muxrelay",
            "devices",
            "--socket",
            "unix:/tmp/usbmuxd-test",
            "--timeout",
            "250ms",
        ])
        .expect("devices args should parse");

        assert_eq!(
            cli.socket,
            Some(DaemonAddress::Unix(PathBuf::from("/tmp/usbmuxd-test")))
        );
        assert!(matches!(cli.command, Command::Devices(_)));
    }

    #[test]
    fn rejects_unknown_select_policy() {
        let err = Cli::try_parse_from(["muxrelay", "relay", "22", "--select", "random"])
            .expect_err("unknown policy should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
