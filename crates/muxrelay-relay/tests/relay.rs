#![cfg(unix)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use muxrelay_client::{MuxConfig, Multiplexer};
use muxrelay_relay::{RelayConfig, RelayError, RelayPair, RelayServer};
use muxrelay_testkit::{sample_device, FakeDaemon, RESULT_CONNECTION_REFUSED};

struct RunningRelay {
    addrs: Vec<SocketAddr>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<muxrelay_relay::Result<()>>>,
}

impl RunningRelay {
    fn start(daemon: &FakeDaemon, pairs: &[&str]) -> Self {
        let mux = Multiplexer::connect(MuxConfig::new(daemon.address()))
            .expect("mux should connect");
        let pairs = pairs
            .iter()
            .map(|spec| spec.parse::<RelayPair>().expect("pair should parse"))
            .collect();
        let config = RelayConfig {
            device_wait: Duration::from_secs(2),
            ..RelayConfig::new(pairs)
        };

        let server = RelayServer::bind(Arc::new(mux), config).expect("relay should bind");
        let addrs = server.local_addrs().into_iter().map(|(_, a)| a).collect();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || server.serve(flag));

        Self {
            addrs,
            shutdown,
            handle: Some(handle),
        }
    }

    fn connect(&self, index: usize) -> TcpStream {
        let stream = TcpStream::connect(self.addrs[index]).expect("client should connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout should apply");
        stream
    }

    fn stop(mut self) -> muxrelay_relay::Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.handle
            .take()
            .expect("relay should be running")
            .join()
            .expect("relay thread should finish")
    }
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[test]
fn forwards_bytes_intact() {
    let daemon = FakeDaemon::builder().device(sample_device(1)).start();
    let relay = RunningRelay::start(&daemon, &["0:8080"]);

    let mut client = relay.connect(0);
    let data = payload(256 * 1024, 7);

    let mut writer = client.try_clone().expect("client clone");
    let to_send = data.clone();
    let sender = thread::spawn(move || writer.write_all(&to_send));

    let mut echoed = vec![0u8; data.len()];
    client.read_exact(&mut echoed).expect("echo should arrive");
    sender
        .join()
        .expect("sender should finish")
        .expect("send should succeed");

    assert_eq!(echoed, data);
    assert_eq!(daemon.connects(), vec![(1, 8080)]);
}

#[test]
fn local_client_close_closes_device_stream() {
    let daemon = FakeDaemon::builder().device(sample_device(5)).start();
    let relay = RunningRelay::start(&daemon, &["0:22"]);

    let mut client = relay.connect(0);
    client.write_all(b"SSH-2.0-muxrelay\r\n").expect("write");
    let mut banner = [0u8; 18];
    client.read_exact(&mut banner).expect("echo should arrive");
    assert_eq!(&banner, b"SSH-2.0-muxrelay\r\n");
    drop(client);

    assert!(daemon.wait_for_closed_streams(1, Duration::from_secs(5)));
    assert_eq!(daemon.connects(), vec![(5, 22)]);
}

#[test]
fn device_close_closes_local_client() {
    let daemon = FakeDaemon::builder()
        .device(sample_device(1))
        .port_banner(80, b"bye")
        .start();
    let relay = RunningRelay::start(&daemon, &["0:80"]);

    let mut client = relay.connect(0);
    let mut received = Vec::new();
    client
        .read_to_end(&mut received)
        .expect("client should see orderly close");
    assert_eq!(received, b"bye");
}

#[test]
fn concurrent_connections_are_isolated() {
    let daemon = FakeDaemon::builder().device(sample_device(1)).start();
    let relay = RunningRelay::start(&daemon, &["0:1000", "0:2000"]);

    let clients: Vec<_> = (0..4)
        .map(|i| {
            let mut client = relay.connect(i % 2);
            let data = payload(32 * 1024, i as u8);
            thread::spawn(move || {
                let mut writer = client.try_clone().expect("client clone");
                let to_send = data.clone();
                let sender = thread::spawn(move || writer.write_all(&to_send));
                let mut echoed = vec![0u8; data.len()];
                client.read_exact(&mut echoed).expect("echo should arrive");
                sender
                    .join()
                    .expect("sender should finish")
                    .expect("send should succeed");
                echoed == data
            })
        })
        .collect();

    for client in clients {
        assert!(client.join().expect("client thread should finish"));
    }

    let mut ports: Vec<u16> = daemon.connects().into_iter().map(|(_, p)| p).collect();
    ports.sort_unstable();
    assert_eq!(ports, vec![1000, 1000, 2000, 2000]);
}

#[test]
fn failed_connection_does_not_affect_others() {
    let daemon = FakeDaemon::builder()
        .device(sample_device(1))
        .port_result(22, RESULT_CONNECTION_REFUSED)
        .start();
    let relay = RunningRelay::start(&daemon, &["0:22", "0:8080"]);

    let mut good = relay.connect(1);
    good.write_all(b"first").expect("write");

    let mut refused = relay.connect(0);
    let mut rest = Vec::new();
    // Closed by the relay: EOF or reset, but never data.
    let _ = refused.read_to_end(&mut rest);
    assert!(rest.is_empty());

    let mut echoed = [0u8; 5];
    good.read_exact(&mut echoed).expect("echo should arrive");
    assert_eq!(&echoed, b"first");
}

#[test]
fn no_device_closes_client() {
    let daemon = FakeDaemon::builder().start();
    let relay = RunningRelay::start(&daemon, &["0:8080"]);

    let mut client = relay.connect(0);
    let mut rest = Vec::new();
    let _ = client.read_to_end(&mut rest);
    assert!(rest.is_empty());
    assert!(daemon.connects().is_empty());
}

#[test]
fn device_attached_later_is_used() {
    let daemon = FakeDaemon::builder().start();
    let relay = RunningRelay::start(&daemon, &["0:8080"]);

    let mut client = relay.connect(0);
    thread::sleep(Duration::from_millis(100));
    daemon.attach(sample_device(9));

    client.write_all(b"late").expect("write");
    let mut echoed = [0u8; 4];
    client.read_exact(&mut echoed).expect("echo should arrive");
    assert_eq!(&echoed, b"late");
    assert_eq!(daemon.connects(), vec![(9, 8080)]);
}

#[test]
fn serve_returns_after_shutdown() {
    let daemon = FakeDaemon::builder().device(sample_device(1)).start();
    let relay = RunningRelay::start(&daemon, &["0:8080", "0:8081"]);
    relay.stop().expect("serve should return cleanly");
}

#[test]
fn bind_conflict_is_fatal() {
    let daemon = FakeDaemon::builder().device(sample_device(1)).start();
    let taken = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = taken.local_addr().expect("local addr").port();

    let mux = Multiplexer::connect(MuxConfig::new(daemon.address())).expect("mux should connect");
    let config = RelayConfig::new(vec![RelayPair::new(0, 80), RelayPair::new(port, 22)]);
    let err = RelayServer::bind(Arc::new(mux), config).unwrap_err();

    assert!(
        matches!(err, RelayError::Bind { address, .. } if address.port() == port),
        "got {err}"
    );
}

#[test]
fn closing_one_connection_leaves_another_streaming() {
    let daemon = FakeDaemon::builder().device(sample_device(2)).start();
    let relay = RunningRelay::start(&daemon, &["0:22"]);

    let mut first = relay.connect(0);
    let mut second = relay.connect(0);
    let round = |client: &mut TcpStream, seed: u8| {
        let data = payload(8 * 1024, seed);
        client.write_all(&data).expect("write should succeed");
        let mut echoed = vec![0u8; data.len()];
        client.read_exact(&mut echoed).expect("echo should arrive");
        assert_eq!(echoed, data);
    };

    for seed in 0..2 {
        round(&mut first, seed);
        round(&mut second, seed + 100);
    }

    drop(first);
    assert!(daemon.wait_for_closed_streams(1, Duration::from_secs(5)));

    for seed in 2..6 {
        round(&mut second, seed + 100);
    }
    assert!(!daemon.wait_for_closed_streams(2, Duration::from_millis(100)));
    assert_eq!(daemon.connects(), vec![(2, 22), (2, 22)]);
}
