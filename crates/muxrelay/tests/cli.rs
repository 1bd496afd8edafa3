#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

use muxrelay_testkit::{sample_device, FakeDaemon};

fn muxrelay(daemon: &FakeDaemon) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_muxrelay"));
    cmd.env_remove("USBMUXD_SOCKET_ADDRESS")
        .arg("--log-level")
        .arg("error")
        .arg("--socket")
        .arg(daemon.address().to_string());
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("muxrelay should run")
}

struct KillOnDrop(Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn devices_json_lists_attached_device() {
    let daemon = FakeDaemon::builder().device(sample_device(7)).start();

    let output = run(muxrelay(&daemon)
        .args(["--format", "json", "devices", "--timeout", "2s"]));
    assert!(
        output.status.success(),
        "devices should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON");
    assert_eq!(json["count"], 1);
    assert_eq!(json["devices"][0]["device_id"], 7);
    assert_eq!(
        json["devices"][0]["serial_number"],
        sample_device(7).serial_number
    );
}

#[test]
fn devices_json_reports_empty_list() {
    let daemon = FakeDaemon::builder().start();

    let output = run(muxrelay(&daemon)
        .args(["--format", "json", "devices", "--timeout", "200ms"]));
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON");
    assert_eq!(json["count"], 0);
    assert_eq!(json["devices"], serde_json::json!([]));
}

#[test]
fn relay_without_device_exits_with_no_device_code() {
    let daemon = FakeDaemon::builder().start();

    let output = run(muxrelay(&daemon)
        .args(["relay", "0:22", "--device-wait", "200ms"]));
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn relay_rejects_bad_port_spec_as_usage_error() {
    let daemon = FakeDaemon::builder().device(sample_device(1)).start();

    let output = run(muxrelay(&daemon).args(["relay", "22:ssh"]));
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("22:ssh"));
}

#[test]
fn missing_daemon_is_transport_error() {
    let daemon = FakeDaemon::builder().start();
    let missing = daemon.socket_path().with_file_name("absent.sock");

    let output = run(Command::new(env!("CARGO_BIN_EXE_muxrelay"))
        .env_remove("USBMUXD_SOCKET_ADDRESS")
        .arg("--socket")
        .arg(&missing)
        .args(["devices", "--timeout", "200ms"]));
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn relay_forwards_to_device_port() {
    let daemon = FakeDaemon::builder().device(sample_device(3)).start();

    let child = muxrelay(&daemon)
        .args(["--format", "json", "relay", "0:22", "--device-wait", "2s"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("relay should start");
    let mut child = KillOnDrop(child);

    let stdout = child.0.stdout.take().expect("stdout should be piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("relay should report its listeners");
    let started: serde_json::Value =
        serde_json::from_str(&line).expect("startup line should be JSON");
    assert_eq!(started["device"]["device_id"], 3);
    assert_eq!(started["listeners"][0]["remote_port"], 22);
    let local = started["listeners"][0]["local_address"]
        .as_str()
        .expect("local address should be a string")
        .to_string();

    let mut client = TcpStream::connect(&local).expect("client should connect");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should apply");
    client.write_all(b"SSH-2.0-test\r\n").expect("write should succeed");

    let mut echoed = [0u8; 14];
    client.read_exact(&mut echoed).expect("echo should arrive");
    assert_eq!(&echoed, b"SSH-2.0-test\r\n");
    assert_eq!(daemon.connects(), vec![(3, 22)]);
}

#[test]
fn version_prints_package_version() {
    let output = run(Command::new(env!("CARGO_BIN_EXE_muxrelay")).arg("version"));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("muxrelay {}", env!("CARGO_PKG_VERSION"))
    );
}
