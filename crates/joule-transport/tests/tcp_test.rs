//! Integration tests for the TCP bridge transport against a local fake bridge.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use crossbeam_channel::unbounded;
use joule_protocol::{
    encode, live_feed_message, parse_notification, DeviceAddress, FrameCodec, ProgramStep,
    TelemetryDataPoint, WireMessage, HOST_TO_DEVICE,
};
use joule_transport::{TcpTransport, Transport, TransportError};

const TIMEOUT: Duration = Duration::from_secs(2);

fn data_point(bath_temp_c: f32) -> Vec<u8> {
    encode(&WireMessage::Telemetry(TelemetryDataPoint {
        bath_temp_c,
        step: ProgramStep::Cook,
        ..TelemetryDataPoint::default()
    }))
}

/// A bridge that answers every host frame with one data point frame.
fn spawn_echo_bridge() -> (String, thread::JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut codec = FrameCodec::with_header(HOST_TO_DEVICE);
        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            codec.push(&buf[..n]);
            while let Some(frame) = codec.decode() {
                received.push(frame);
                let reply = FrameCodec::encode_device(&data_point(58.0 + received.len() as f32))
                    .unwrap();
                if stream.write_all(&reply).is_err() {
                    return received;
                }
            }
        }
        received
    });

    (addr, handle)
}

fn feed_request() -> Vec<u8> {
    live_feed_message(1, DeviceAddress::default(), DeviceAddress::default())
}

#[test]
fn test_write_and_receive_notification() {
    let (addr, bridge) = spawn_echo_bridge();
    let mut transport = TcpTransport::new(addr, TIMEOUT);

    transport.ensure_connected().unwrap();
    assert!(transport.is_connected());

    let (tx, rx) = unbounded();
    transport
        .subscribe(Box::new(move |data| {
            let _ = tx.send(data.to_vec());
        }))
        .unwrap();

    transport.write(&feed_request()).unwrap();
    let frame = rx.recv_timeout(TIMEOUT).unwrap();
    let point = parse_notification(&frame).unwrap();
    assert_relative_eq!(point.bath_temp_c, 59.0);

    transport.disconnect();
    let received = bridge.join().unwrap();
    assert_eq!(received, vec![feed_request()]);
}

#[test]
fn test_read_without_subscriber() {
    let (addr, _bridge) = spawn_echo_bridge();
    let mut transport = TcpTransport::new(addr, TIMEOUT);
    transport.ensure_connected().unwrap();

    transport.write(&feed_request()).unwrap();
    let frame = transport.read(TIMEOUT).unwrap();
    assert!(parse_notification(&frame).is_some());

    assert!(matches!(
        transport.read(Duration::from_millis(50)),
        Err(TransportError::Timeout)
    ));
}

#[test]
fn test_subscribe_replaces_callback() {
    let (addr, _bridge) = spawn_echo_bridge();
    let mut transport = TcpTransport::new(addr, TIMEOUT);
    transport.ensure_connected().unwrap();

    let (first_tx, first_rx) = unbounded();
    let (second_tx, second_rx) = unbounded();
    transport
        .subscribe(Box::new(move |data| {
            let _ = first_tx.send(data.to_vec());
        }))
        .unwrap();
    transport
        .subscribe(Box::new(move |data| {
            let _ = second_tx.send(data.to_vec());
        }))
        .unwrap();

    transport.write(&feed_request()).unwrap();
    assert!(second_rx.recv_timeout(TIMEOUT).is_ok());
    assert!(first_rx.try_recv().is_err());
}

#[test]
fn test_write_when_disconnected() {
    let mut transport = TcpTransport::new("127.0.0.1:1", TIMEOUT);
    assert!(matches!(
        transport.write(&feed_request()),
        Err(TransportError::NotConnected)
    ));
    assert!(matches!(
        transport.subscribe(Box::new(|_| {})),
        Err(TransportError::NotConnected)
    ));
}

#[test]
fn test_connect_refused() {
    // Grab a free port, then close it
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let mut transport = TcpTransport::new(addr, Duration::from_millis(500));
    assert!(matches!(
        transport.ensure_connected(),
        Err(TransportError::ConnectFailed { .. })
    ));
    assert!(!transport.is_connected());
}

#[test]
fn test_oversized_write_rejected() {
    let mut transport = TcpTransport::new("127.0.0.1:1", TIMEOUT);
    assert!(matches!(
        transport.write(&vec![0u8; 4096]),
        Err(TransportError::FrameTooLarge(4096))
    ));
    assert!(matches!(
        transport.write(&vec![0u8; 65_540]),
        Err(TransportError::FrameTooLarge(65_540))
    ));
}

#[test]
fn test_disconnect_is_idempotent_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let acceptor = thread::spawn(move || {
        let mut streams: Vec<TcpStream> = Vec::new();
        for _ in 0..2 {
            let (stream, _) = listener.accept().unwrap();
            streams.push(stream);
        }
        streams.len()
    });

    let mut transport = TcpTransport::new(addr, TIMEOUT);
    transport.ensure_connected().unwrap();
    transport.disconnect();
    transport.disconnect();
    assert!(!transport.is_connected());

    transport.ensure_connected().unwrap();
    assert!(transport.is_connected());
    assert_eq!(acceptor.join().unwrap(), 2);
}

#[test]
fn test_bridge_close_detected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let bridge = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });

    let mut transport = TcpTransport::new(addr, TIMEOUT);
    transport.ensure_connected().unwrap();
    bridge.join().unwrap();

    // The reader notices EOF shortly after the bridge closes
    let mut closed = false;
    for _ in 0..100 {
        if !transport.is_connected() {
            closed = true;
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(closed);
}
