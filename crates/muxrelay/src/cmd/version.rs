use muxrelay_frame::ProtocolVersion;
use muxrelay_transport::DaemonAddress;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("muxrelay {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: muxrelay");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("MUXRELAY_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("default_daemon: {}", DaemonAddress::platform_default());
    let protocols: Vec<String> = ProtocolVersion::NEGOTIATION_ORDER
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("protocols: {}", protocols.join(", "));
    println!("features: relay={}, cli=true", cfg!(feature = "relay"));

    Ok(SUCCESS)
}
