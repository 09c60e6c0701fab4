//! Integration tests for framelink.
//!
//! Every test runs a real listener and talks to it over loopback TCP, either
//! through a client session or through a raw socket.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use framelink::codec::{AckEnvelope, RequestEnvelope, CMD_NONE, CMD_SET_INTERVAL};
use framelink::protocol::{build_frame, ParseEvent, StreamParser, DEFAULT_VERSION};
use framelink::server::{ConnectionStatus, ConnectionTable};
use framelink::{ClientBuilder, ClientEvent, ClientState, FrameError, Listener, ServerEvent};

const WAIT: Duration = Duration::from_secs(5);

async fn next_matching<T, F>(events: &mut UnboundedReceiver<T>, mut pred: F) -> T
where
    F: FnMut(&T) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Events up to and including `Stopped`.
async fn collect_until_stopped(events: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut seen = Vec::new();
    timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            let done = event == ServerEvent::Stopped;
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for Stopped");
    seen
}

async fn opened_id(events: &mut UnboundedReceiver<ServerEvent>) -> String {
    match next_matching(events, |e| {
        matches!(e, ServerEvent::ConnectionUpdated(r) if r.status == ConnectionStatus::Connected)
    })
    .await
    {
        ServerEvent::ConnectionUpdated(record) => record.id,
        other => panic!("unexpected event {other:?}"),
    }
}

async fn read_acks(stream: &mut TcpStream, count: usize) -> Vec<AckEnvelope> {
    let mut parser = StreamParser::new();
    let mut acks = Vec::new();
    let mut buf = [0u8; 512];
    while acks.len() < count {
        let n = timeout(WAIT, stream.read(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0, "server closed");
        for event in parser.push(&buf[..n]) {
            if let ParseEvent::Frame(frame) = event {
                acks.push(AckEnvelope::decode(&frame.payload).unwrap());
            }
        }
    }
    acks
}

#[tokio::test]
async fn test_auto_send_reaches_server_and_is_acked() {
    let (mut listener, mut server_events) = Listener::builder().build();
    let port = listener.start(0).await.unwrap();

    let (client, mut events) = ClientBuilder::new()
        .auto_payload("ping")
        .auto_send(true)
        .auto_interval_ms(50)
        .spawn();
    client.connect("127.0.0.1", port);

    let received = next_matching(&mut server_events, |e| matches!(e, ServerEvent::FrameReceived { .. })).await;
    let ServerEvent::FrameReceived { request, payload, .. } = received else {
        unreachable!()
    };
    let request = request.expect("request envelope");
    assert_eq!(request.msg_type, 0x01);
    assert_eq!(request.msg_counter, 1);
    assert_eq!(&request.content[..], b"ping");
    assert_eq!(payload.len(), 7);

    next_matching(&mut events, |e| *e == ClientEvent::StatusChanged(ClientState::AwaitingAck)).await;
    let ack = next_matching(&mut events, |e| matches!(e, ClientEvent::AckReceived(_))).await;
    let ClientEvent::AckReceived(ack) = ack else { unreachable!() };
    assert!(ack.is_ok());
    assert_eq!(ack.cmd_id, CMD_NONE);
    assert_eq!(ack.interval_override, None);

    let status = next_matching(&mut events, |e| matches!(e, ClientEvent::StatusChanged(_))).await;
    assert_eq!(status, ClientEvent::StatusChanged(ClientState::Connected));

    assert!(client.snapshot().received >= 1);
    client.disconnect();
    listener.stop().await;
}

#[tokio::test]
async fn test_forced_interval_reaches_client() {
    let (mut listener, mut server_events) = Listener::builder().forced_interval(9000).build();
    let port = listener.start(0).await.unwrap();

    let (client, mut events) = ClientBuilder::new().spawn();
    client.connect("127.0.0.1", port);
    next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;

    client.send("hello").await.unwrap();
    let updated = next_matching(&mut events, |e| matches!(e, ClientEvent::IntervalUpdated(_))).await;
    assert_eq!(updated, ClientEvent::IntervalUpdated(9000));
    assert_eq!(client.snapshot().auto_interval_ms, 9000);

    let active = next_matching(&mut server_events, |e| {
        matches!(e, ServerEvent::ConnectionUpdated(r) if r.status == ConnectionStatus::Active)
    })
    .await;
    let ServerEvent::ConnectionUpdated(record) = active else { unreachable!() };
    assert_eq!(record.interval_ms, 9000);

    client.disconnect();
    listener.stop().await;
}

#[tokio::test]
async fn test_forced_interval_changes_live() {
    let (mut listener, _server_events) = Listener::builder().build();
    let port = listener.start(0).await.unwrap();

    let (client, mut events) = ClientBuilder::new().spawn();
    client.connect("127.0.0.1", port);
    next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;

    client.send("one").await.unwrap();
    let first = next_matching(&mut events, |e| matches!(e, ClientEvent::AckReceived(_))).await;
    assert!(matches!(first, ClientEvent::AckReceived(ack) if ack.interval_override.is_none()));

    listener.set_forced_interval(Some(1500));
    client.send("two").await.unwrap();
    let updated = next_matching(&mut events, |e| matches!(e, ClientEvent::IntervalUpdated(_))).await;
    assert_eq!(updated, ClientEvent::IntervalUpdated(1500));

    listener.set_forced_interval(None);
    client.send("three").await.unwrap();
    let last = next_matching(&mut events, |e| matches!(e, ClientEvent::AckReceived(_))).await;
    assert!(matches!(last, ClientEvent::AckReceived(ack) if ack.cmd_id == CMD_NONE));
    assert_eq!(client.snapshot().auto_interval_ms, 1500);

    client.disconnect();
    listener.stop().await;
}

#[tokio::test]
async fn test_stop_closes_each_connection_once() {
    let (mut listener, mut events) = Listener::builder()
        .stop_timeout(Duration::from_millis(200))
        .build();
    let port = listener.start(0).await.unwrap();

    let _a = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let _b = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let first = opened_id(&mut events).await;
    let second = opened_id(&mut events).await;
    assert_ne!(first, second);
    assert_eq!(listener.session_count().await, 2);

    listener.stop().await;
    let tail = collect_until_stopped(&mut events).await;

    let mut closed: HashMap<String, usize> = HashMap::new();
    for event in &tail {
        if let ServerEvent::ConnectionClosed { id } = event {
            *closed.entry(id.clone()).or_default() += 1;
        }
    }
    assert_eq!(closed.get(&first), Some(&1));
    assert_eq!(closed.get(&second), Some(&1));
    assert_eq!(listener.session_count().await, 0);

    // The disconnected record precedes the close notification.
    for id in [&first, &second] {
        let update = tail
            .iter()
            .position(|e| matches!(e, ServerEvent::ConnectionUpdated(r) if &r.id == id && !r.is_open()))
            .expect("disconnected record");
        let close = tail
            .iter()
            .position(|e| matches!(e, ServerEvent::ConnectionClosed { id: closed } if closed == id))
            .expect("close notification");
        assert!(update < close);
    }

    listener.stop().await;
    assert_eq!(collect_until_stopped(&mut events).await, vec![ServerEvent::Stopped]);
}

#[tokio::test]
async fn test_stop_racing_peer_close() {
    let (mut listener, mut events) = Listener::builder()
        .stop_timeout(Duration::from_millis(200))
        .build();
    let port = listener.start(0).await.unwrap();

    let leaving = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let _staying = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let first = opened_id(&mut events).await;
    let second = opened_id(&mut events).await;

    drop(leaving);
    listener.stop().await;

    let mut table = ConnectionTable::new();
    let mut closes = 0;
    for event in collect_until_stopped(&mut events).await {
        table.apply(&event);
        if let ServerEvent::ConnectionClosed { id } = &event {
            assert!(id == &first || id == &second);
            closes += 1;
        }
    }
    assert_eq!(closes, 2);
    assert_eq!(table.open_count(), 0);
}

#[tokio::test]
async fn test_peer_close_is_reported() {
    let (mut listener, mut events) = Listener::builder().build();
    let port = listener.start(0).await.unwrap();

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let id = opened_id(&mut events).await;
    drop(stream);

    let closed = next_matching(&mut events, |e| matches!(e, ServerEvent::ConnectionClosed { .. })).await;
    assert_eq!(closed, ServerEvent::ConnectionClosed { id });
    listener.stop().await;
}

#[tokio::test]
async fn test_payload_sizes_roundtrip() {
    let (mut listener, mut events) = Listener::builder().forced_interval(250).build();
    let port = listener.start(0).await.unwrap();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let sizes = [0usize, 1, 2, 3, 4, 255, 1024, 4095, 4096];
    for &size in &sizes {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        stream
            .write_all(&build_frame(DEFAULT_VERSION, &payload).unwrap())
            .await
            .unwrap();
    }

    for &size in &sizes {
        let event = next_matching(&mut events, |e| matches!(e, ServerEvent::FrameReceived { .. })).await;
        let ServerEvent::FrameReceived { payload, request, .. } = event else {
            unreachable!()
        };
        assert_eq!(payload.len(), size);
        assert_eq!(request.is_some(), size >= 3);
    }

    let acks = read_acks(&mut stream, sizes.len()).await;
    for ack in acks {
        assert!(ack.is_ok());
        assert_eq!(ack.cmd_id, CMD_SET_INTERVAL);
        assert_eq!(ack.interval_override, Some(250));
    }
    listener.stop().await;
}

#[tokio::test]
async fn test_server_resyncs_after_corruption() {
    let (mut listener, mut events) = Listener::builder().build();
    let port = listener.start(0).await.unwrap();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let mut corrupted = build_frame(DEFAULT_VERSION, b"hello").unwrap().to_vec();
    let crc_at = corrupted.len() - 3;
    corrupted[crc_at] ^= 0xFF;

    let good = RequestEnvelope::text(42, Bytes::from_static(b"after")).encode();
    let mut wire = vec![0x01, 0x02, 0x03];
    wire.extend_from_slice(&corrupted);
    wire.extend_from_slice(&build_frame(DEFAULT_VERSION, &good).unwrap());
    stream.write_all(&wire).await.unwrap();

    let invalid = next_matching(&mut events, |e| matches!(e, ServerEvent::InvalidPacket { .. })).await;
    assert!(matches!(
        invalid,
        ServerEvent::InvalidPacket { error: FrameError::InvalidCrc { .. }, .. }
    ));

    let received = next_matching(&mut events, |e| matches!(e, ServerEvent::FrameReceived { .. })).await;
    let ServerEvent::FrameReceived { request, .. } = received else { unreachable!() };
    let request = request.unwrap();
    assert_eq!(request.msg_counter, 42);
    assert_eq!(&request.content[..], b"after");

    // Only the valid frame is acked.
    assert_eq!(read_acks(&mut stream, 1).await.len(), 1);
    listener.stop().await;
}

#[tokio::test]
async fn test_bad_eof_reported() {
    let (mut listener, mut events) = Listener::builder().build();
    let port = listener.start(0).await.unwrap();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let mut frame = build_frame(DEFAULT_VERSION, b"abc").unwrap().to_vec();
    let last = frame.len() - 1;
    frame[last] = 0x66;
    stream.write_all(&frame).await.unwrap();

    let invalid = next_matching(&mut events, |e| matches!(e, ServerEvent::InvalidPacket { .. })).await;
    assert!(matches!(
        invalid,
        ServerEvent::InvalidPacket { error: FrameError::InvalidEof(0x66), .. }
    ));
    listener.stop().await;
}

#[tokio::test]
async fn test_client_reconnects_after_listener_restart() {
    let (mut listener, _server_events) = Listener::builder()
        .stop_timeout(Duration::from_millis(100))
        .build();
    let port = listener.start(0).await.unwrap();

    let (client, mut events) = ClientBuilder::new()
        .reconnect_delay(Duration::from_millis(100))
        .spawn();
    client.connect("127.0.0.1", port);
    next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;

    listener.stop().await;
    next_matching(&mut events, |e| matches!(e, ClientEvent::ReconnectScheduled { .. })).await;
    assert_eq!(listener.start(port).await.unwrap(), port);

    next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;
    let status = next_matching(&mut events, |e| matches!(e, ClientEvent::StatusChanged(_))).await;
    assert_eq!(status, ClientEvent::StatusChanged(ClientState::Connected));

    client.disconnect();
    listener.stop().await;
}
