// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end tests over a real TCP connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

use scangate_core::config::{GatewayConfig, MonitorConfig};
use scangate_core::protocol::{
    ResponseEnvelope, MSG_PRINT_COMPLETED, MSG_PRINT_FAILED_PREFIX, MSG_PRINT_STARTED,
};
use scangate_device::{CapabilityCache, DeviceFacade, StubBackend};
use scangate_print::{stub_printer, PrintOrchestrator, StubEngine, StubSpool};
use scangate_server::{Dispatcher, GatewayServer};

fn fast_monitor() -> MonitorConfig {
    MonitorConfig {
        discovery_interval: Duration::from_millis(5),
        discovery_timeout: Duration::from_millis(50),
        grace_period: Duration::from_millis(10),
        status_interval: Duration::from_millis(5),
        status_timeout: Duration::from_millis(200),
        assume_success_when_invisible: true,
    }
}

/// Start a gateway on an ephemeral port with simulated devices.
async fn start_gateway() -> (GatewayServer, SocketAddr) {
    let backend = Arc::new(StubBackend::simulated(vec!["Test Scanner".into()]));
    let capability = Arc::new(CapabilityCache::new(backend.clone()));
    let facade = Arc::new(DeviceFacade::new(
        backend,
        Arc::clone(&capability),
        Duration::from_secs(5),
    ));
    let orchestrator = Arc::new(PrintOrchestrator::new(
        Arc::new(StubEngine::with_pages(2)),
        Arc::new(StubSpool::empty(vec![stub_printer("Test Printer", true)])),
        fast_monitor(),
    ));
    let config = GatewayConfig {
        port: 0,
        monitor: fast_monitor(),
        ..GatewayConfig::default()
    };
    let dispatcher = Arc::new(Dispatcher::new(
        config.clone(),
        facade,
        capability,
        orchestrator,
    ));
    let mut server = GatewayServer::new(config, dispatcher);
    server.start().await.expect("server start");
    let addr = server.local_addr().expect("bound address");
    (server, addr)
}

async fn read_envelope(reader: &mut BufReader<OwnedReadHalf>) -> ResponseEnvelope {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("frame within deadline")
        .expect("read");
    serde_json::from_str(line.trim()).expect("valid response envelope")
}

#[tokio::test]
async fn greeting_then_ping_round_trip() {
    let (mut server, addr) = start_gateway().await;

    let stream = TcpStream::connect(addr).await.expect("connect");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let greeting = read_envelope(&mut reader).await;
    assert!(greeting.success);
    assert_eq!(greeting.message.as_deref(), Some("connected"));
    assert_eq!(greeting.id, "");

    write_half
        .write_all(b"{\"id\":\"req-1\",\"action\":\"ping\"}\n")
        .await
        .expect("write");
    let pong = read_envelope(&mut reader).await;
    assert_eq!(pong.id, "req-1");
    assert!(pong.success);
    assert_eq!(pong.message.as_deref(), Some("pong"));

    server.stop().await.expect("server stop");
}

#[tokio::test]
async fn async_print_streams_to_completion_over_tcp() {
    let (mut server, addr) = start_gateway().await;

    let stream = TcpStream::connect(addr).await.expect("connect");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let _greeting = read_envelope(&mut reader).await;

    let doc = STANDARD.encode(b"%PDF-1.7 integration");
    let command = serde_json::json!({
        "id": "print-1",
        "action": "printPdfAsync",
        "data": { "printerName": "Test Printer", "documentData": doc },
    });
    write_half
        .write_all(format!("{command}\n").as_bytes())
        .await
        .expect("write");

    let ack = read_envelope(&mut reader).await;
    assert_eq!(ack.id, "print-1");
    assert_eq!(ack.message.as_deref(), Some(MSG_PRINT_STARTED));

    let mut percentages = vec![0u8];
    let terminal = loop {
        let frame = read_envelope(&mut reader).await;
        assert_eq!(frame.id, "print-1");
        if let Some(data) = &frame.data {
            if let Some(pct) = data["percentage"].as_u64() {
                percentages.push(pct as u8);
            }
        }
        let message = frame.message.clone().unwrap_or_default();
        if message == MSG_PRINT_COMPLETED || message.starts_with(MSG_PRINT_FAILED_PREFIX) {
            break frame;
        }
    };

    assert!(terminal.success, "simulated job should complete");
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]), "{percentages:?}");
    assert_eq!(*percentages.last().unwrap(), 100);

    server.stop().await.expect("server stop");
}

#[tokio::test]
async fn malformed_frame_does_not_kill_the_connection() {
    let (mut server, addr) = start_gateway().await;

    let stream = TcpStream::connect(addr).await.expect("connect");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let _greeting = read_envelope(&mut reader).await;

    write_half
        .write_all(b"this is not json\n")
        .await
        .expect("write");
    let failure = read_envelope(&mut reader).await;
    assert!(!failure.success);
    assert_eq!(failure.id, "");

    // The connection survives and keeps serving commands.
    write_half
        .write_all(b"{\"id\":\"after\",\"action\":\"getScanners\"}\n")
        .await
        .expect("write");
    let scanners = read_envelope(&mut reader).await;
    assert!(scanners.success);
    assert_eq!(scanners.data.unwrap()["scanners"][0], "Test Scanner");

    server.stop().await.expect("server stop");
}

#[tokio::test]
async fn two_connections_are_served_concurrently() {
    let (mut server, addr) = start_gateway().await;

    let a = TcpStream::connect(addr).await.expect("connect a");
    let b = TcpStream::connect(addr).await.expect("connect b");

    for stream in [a, b] {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let _greeting = read_envelope(&mut reader).await;
        write_half
            .write_all(b"{\"id\":\"p\",\"action\":\"ping\"}\n")
            .await
            .expect("write");
        let pong = read_envelope(&mut reader).await;
        assert!(pong.success);
    }

    server.stop().await.expect("server stop");
}
