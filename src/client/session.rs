//! Client session actor.
//!
//! All mutable session state lives in [`ClientSession`] and is touched only
//! from its own task. Each loop iteration waits on exactly one wake source:
//! a command, the pending connect, socket readability, or one of the three
//! deadlines. The public state is derived from that data after every wake.

use std::future::pending;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::{ClientEvent, ClientSnapshot, ClientState};
use crate::codec::{AckEnvelope, MessageCounter, RequestEnvelope};
use crate::config::ClientConfig;
use crate::error::{LinkError, Result};
use crate::protocol::{ParseEvent, StreamParser};
use crate::transport;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Requests from [`super::ClientHandle`].
#[derive(Debug)]
pub(crate) enum Command {
    Connect { host: String, port: u16 },
    Disconnect,
    Send {
        content: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    SetAutoPayload(Bytes),
    SetAutoSend(bool),
    SetAutoInterval(u32),
    Shutdown,
}

/// An established connection.
struct Link {
    reader: OwnedReadHalf,
    writer: WriterHandle,
    writer_task: JoinHandle<Result<()>>,
    peer: SocketAddr,
}

impl Link {
    fn close(self) {
        // Dropping the handle ends the writer loop; abort covers a blocked write.
        drop(self.writer);
        self.writer_task.abort();
    }
}

enum Wake {
    Command(Command),
    HandlesDropped,
    Connected(Result<TcpStream>),
    Read(io::Result<usize>),
    AutoSend,
    AckTimeout,
    Reconnect,
}

pub(crate) struct ClientSession {
    config: ClientConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent>,
    snapshot: watch::Sender<ClientSnapshot>,

    target: Option<(String, u16)>,
    should_reconnect: bool,
    connecting: Option<JoinHandle<Result<TcpStream>>>,
    link: Option<Link>,
    parser: StreamParser,
    read_buf: Vec<u8>,
    counter: MessageCounter,

    auto_payload: Bytes,
    auto_send: bool,
    auto_interval_ms: u32,
    awaiting_ack: bool,

    auto_deadline: Option<Instant>,
    ack_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,

    sent: u64,
    received: u64,
    last_state: ClientState,
}

impl ClientSession {
    pub(crate) fn new(
        config: ClientConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<ClientEvent>,
        snapshot: watch::Sender<ClientSnapshot>,
    ) -> Self {
        Self {
            auto_payload: Bytes::from(config.auto_payload.clone().into_bytes()),
            auto_send: config.auto_send,
            auto_interval_ms: config.auto_interval_ms,
            read_buf: vec![0u8; config.read_buffer_size.max(1)],
            config,
            commands,
            events,
            snapshot,
            target: None,
            should_reconnect: false,
            connecting: None,
            link: None,
            parser: StreamParser::new(),
            counter: MessageCounter::new(),
            awaiting_ack: false,
            auto_deadline: None,
            ack_deadline: None,
            reconnect_deadline: None,
            sent: 0,
            received: 0,
            last_state: ClientState::Disconnected,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => Wake::Command(command),
                    None => Wake::HandlesDropped,
                },
                result = connect_outcome(&mut self.connecting) => Wake::Connected(result),
                result = read_link(&mut self.link, &mut self.read_buf) => Wake::Read(result),
                _ = sleep_opt(self.auto_deadline) => Wake::AutoSend,
                _ = sleep_opt(self.ack_deadline) => Wake::AckTimeout,
                _ = sleep_opt(self.reconnect_deadline) => Wake::Reconnect,
            };

            match wake {
                Wake::Command(Command::Shutdown) | Wake::HandlesDropped => {
                    self.disconnect();
                    self.publish();
                    tracing::debug!("client session stopped");
                    return;
                }
                Wake::Command(command) => self.handle_command(command),
                Wake::Connected(result) => {
                    self.connecting = None;
                    match result {
                        Ok(stream) => self.on_connected(stream),
                        Err(e) => self.on_connect_failed(e),
                    }
                }
                Wake::Read(Ok(0)) => self.on_transport_lost(),
                Wake::Read(Ok(n)) => self.on_bytes(n),
                Wake::Read(Err(e)) => {
                    tracing::warn!(error = %e, "socket read failed");
                    self.emit(ClientEvent::TransportError {
                        reason: e.to_string(),
                    });
                    self.on_transport_lost();
                }
                Wake::AutoSend => self.on_auto_send(),
                Wake::AckTimeout => self.on_ack_timeout(),
                Wake::Reconnect => self.on_reconnect_timer(),
            }

            self.publish();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { host, port } => {
                tracing::info!(%host, port, "connecting");
                self.target = Some((host, port));
                self.should_reconnect = true;
                self.reconnect_deadline = None;
                self.start_connect();
            }
            Command::Disconnect => self.disconnect(),
            Command::Send { content, reply } => {
                let result = self.write_request(content);
                if let Err(e) = &result {
                    self.emit(ClientEvent::SendFailed {
                        reason: e.to_string(),
                    });
                }
                let _ = reply.send(result);
            }
            Command::SetAutoPayload(payload) => self.auto_payload = payload,
            Command::SetAutoSend(enabled) => {
                self.auto_send = enabled;
                self.auto_deadline = if enabled && self.link.is_some() {
                    Some(self.next_auto_tick())
                } else {
                    None
                };
            }
            Command::SetAutoInterval(ms) => {
                self.set_auto_interval(ms);
            }
            Command::Shutdown => {}
        }
    }

    fn start_connect(&mut self) {
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        if let Some(link) = self.link.take() {
            link.close();
            self.emit(ClientEvent::Disconnected);
        }
        self.auto_deadline = None;
        self.ack_deadline = None;
        self.awaiting_ack = false;

        let Some((host, port)) = self.target.clone() else {
            return;
        };
        self.connecting = Some(tokio::spawn(async move { transport::connect(&host, port).await }));
    }

    fn on_connected(&mut self, stream: TcpStream) {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                self.on_connect_failed(LinkError::Io(e));
                return;
            }
        };

        let (reader, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half, self.config.writer.clone());
        self.link = Some(Link {
            reader,
            writer,
            writer_task,
            peer,
        });
        self.parser.clear();

        tracing::info!(%peer, "connected");
        self.emit(ClientEvent::Connected { peer });

        self.ack_deadline = None;
        self.awaiting_ack = false;
        self.sent = 0;
        self.received = 0;
        self.emit_statistics();

        if self.auto_send {
            self.auto_deadline = Some(self.next_auto_tick());
        }
    }

    fn on_connect_failed(&mut self, error: LinkError) {
        tracing::warn!(error = %error, "connect failed");
        self.emit(ClientEvent::TransportError {
            reason: error.to_string(),
        });
        if self.should_reconnect && self.reconnect_deadline.is_none() {
            self.schedule_reconnect();
        }
    }

    fn on_transport_lost(&mut self) {
        if let Some(link) = self.link.take() {
            tracing::info!(peer = %link.peer, "disconnected");
            link.close();
            self.emit(ClientEvent::Disconnected);
        }
        self.auto_deadline = None;
        self.ack_deadline = None;
        self.awaiting_ack = false;

        if self.should_reconnect && self.reconnect_deadline.is_none() {
            self.schedule_reconnect();
        }
    }

    fn disconnect(&mut self) {
        self.should_reconnect = false;
        self.auto_deadline = None;
        self.ack_deadline = None;
        self.reconnect_deadline = None;
        self.awaiting_ack = false;

        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        if let Some(link) = self.link.take() {
            tracing::info!(peer = %link.peer, "disconnecting");
            link.close();
            self.emit(ClientEvent::Disconnected);
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.config.reconnect_delay();
        tracing::info!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "reconnect scheduled");
        self.reconnect_deadline = Some(Instant::now() + delay);
        self.emit(ClientEvent::ReconnectScheduled { delay });
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect_deadline = None;
        if !self.should_reconnect {
            return;
        }

        let usable = matches!(&self.target, Some((host, port)) if !host.is_empty() && *port != 0);
        if !usable {
            tracing::warn!("reconnect target missing, giving up");
            self.emit(ClientEvent::ReconnectCancelled);
            return;
        }

        tracing::info!("reconnecting");
        self.start_connect();
    }

    fn on_bytes(&mut self, n: usize) {
        let events = self.parser.push(&self.read_buf[..n]);
        for event in events {
            match event {
                ParseEvent::Malformed(error) => {
                    tracing::warn!(%error, "discarded malformed bytes");
                    self.emit(ClientEvent::MalformedFrame(error));
                }
                ParseEvent::Frame(frame) => {
                    self.received += 1;
                    self.handle_ack(frame.payload);
                    self.emit_statistics();
                }
            }
        }
    }

    fn handle_ack(&mut self, payload: Bytes) {
        self.emit(ClientEvent::ResponseReceived(payload.clone()));

        let ack = match AckEnvelope::decode(&payload) {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring short response");
                self.emit(ClientEvent::MalformedAck { len: payload.len() });
                return;
            }
        };

        if self.awaiting_ack {
            self.awaiting_ack = false;
            self.ack_deadline = None;
        }
        tracing::debug!(
            code = ack.resp_code,
            ts = ack.timestamp_ms,
            cmd = ack.cmd_id,
            "ack received"
        );
        self.emit(ClientEvent::AckReceived(ack));

        if let Some(interval) = ack.interval_override {
            if self.set_auto_interval(interval) {
                self.emit(ClientEvent::IntervalUpdated(interval));
                if self.auto_send && self.link.is_some() {
                    self.auto_deadline = Some(self.next_auto_tick());
                }
            }
        }
    }

    /// Returns false if the interval was rejected.
    fn set_auto_interval(&mut self, ms: u32) -> bool {
        if ms == 0 {
            tracing::warn!("ignoring zero auto-send interval");
            return false;
        }
        self.auto_interval_ms = ms;
        if self.auto_deadline.is_some() {
            self.auto_deadline = Some(self.next_auto_tick());
        }
        tracing::info!(interval_ms = ms, "auto-send interval set");
        true
    }

    fn on_auto_send(&mut self) {
        self.auto_deadline = Some(self.next_auto_tick());
        if self.auto_payload.is_empty() {
            return;
        }

        match self.write_request(self.auto_payload.clone()) {
            Ok(()) => {
                // Measured from the oldest unanswered send.
                self.awaiting_ack = true;
                if self.ack_deadline.is_none() {
                    self.ack_deadline = Some(Instant::now() + self.config.ack_timeout());
                }
            }
            Err(e) => self.emit(ClientEvent::SendFailed {
                reason: e.to_string(),
            }),
        }
    }

    fn on_ack_timeout(&mut self) {
        self.ack_deadline = None;
        if !self.awaiting_ack {
            return;
        }
        self.awaiting_ack = false;

        tracing::warn!("ack timeout, dropping connection");
        self.emit(ClientEvent::AckTimeout);
        self.on_transport_lost();
    }

    fn write_request(&mut self, content: Bytes) -> Result<()> {
        let Some(link) = &self.link else {
            tracing::warn!("send while not connected");
            if self.should_reconnect && self.reconnect_deadline.is_none() {
                self.schedule_reconnect();
            }
            return Err(LinkError::NotConnected);
        };

        let envelope = RequestEnvelope::text(self.counter.peek(), content);
        let frame = OutboundFrame::encode(&envelope.encode())?;
        link.writer.try_send(frame)?;
        self.counter.next_value();

        self.sent += 1;
        tracing::debug!(counter = envelope.msg_counter, bytes = envelope.content.len(), "sent");
        self.emit_statistics();
        Ok(())
    }

    fn next_auto_tick(&self) -> Instant {
        Instant::now() + Duration::from_millis(u64::from(self.auto_interval_ms))
    }

    fn state(&self) -> ClientState {
        if self.link.is_some() {
            if self.awaiting_ack {
                ClientState::AwaitingAck
            } else {
                ClientState::Connected
            }
        } else if self.connecting.is_some() {
            ClientState::Connecting
        } else if self.reconnect_deadline.is_some() {
            ClientState::Reconnecting
        } else {
            ClientState::Disconnected
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn emit_statistics(&self) {
        self.emit(ClientEvent::StatisticsUpdated {
            sent: self.sent,
            received: self.received,
        });
    }

    /// Report a state change and refresh the snapshot.
    fn publish(&mut self) {
        let state = self.state();
        if state != self.last_state {
            tracing::debug!(from = ?self.last_state, to = ?state, "state changed");
            self.last_state = state;
            self.emit(ClientEvent::StatusChanged(state));
        }

        let snapshot = ClientSnapshot {
            state,
            sent: self.sent,
            received: self.received,
            auto_interval_ms: self.auto_interval_ms,
            auto_send: self.auto_send,
            peer: self.link.as_ref().map(|link| link.peer),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn connect_outcome(task: &mut Option<JoinHandle<Result<TcpStream>>>) -> Result<TcpStream> {
    match task {
        Some(task) => match task.await {
            Ok(result) => result,
            Err(e) => Err(LinkError::Io(io::Error::new(io::ErrorKind::Other, e))),
        },
        None => pending().await,
    }
}

async fn read_link(link: &mut Option<Link>, buf: &mut [u8]) -> io::Result<usize> {
    match link {
        Some(link) => link.reader.read(buf).await,
        None => pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::super::ClientBuilder;
    use super::*;
    use crate::codec::{CMD_NONE, RESP_OK};
    use crate::protocol::{build_frame, DEFAULT_VERSION};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_matching<F>(events: &mut mpsc::UnboundedReceiver<ClientEvent>, mut pred: F) -> ClientEvent
    where
        F: FnMut(&ClientEvent) -> bool,
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

    /// Everything emitted within `window`.
    async fn collect_for(events: &mut mpsc::UnboundedReceiver<ClientEvent>, window: Duration) -> Vec<ClientEvent> {
        let mut seen = Vec::new();
        let _ = timeout(window, async {
            while let Some(event) = events.recv().await {
                seen.push(event);
            }
        })
        .await;
        seen
    }

    async fn fake_server() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn read_requests(stream: &mut TcpStream, count: usize) -> Vec<RequestEnvelope> {
        let mut parser = StreamParser::new();
        let mut requests = Vec::new();
        let mut buf = [0u8; 256];
        while requests.len() < count {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed");
            for event in parser.push(&buf[..n]) {
                if let ParseEvent::Frame(frame) = event {
                    requests.push(RequestEnvelope::decode(&frame.payload).unwrap());
                }
            }
        }
        requests
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let (client, mut events) = ClientBuilder::new().spawn();

        assert!(matches!(client.send("ping").await, Err(LinkError::NotConnected)));
        let event = next_matching(&mut events, |e| matches!(e, ClientEvent::SendFailed { .. })).await;
        assert!(matches!(event, ClientEvent::SendFailed { .. }));
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_counter_increments_per_send() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new().spawn();
        client.connect("127.0.0.1", port);

        let (mut stream, _) = listener.accept().await.unwrap();
        next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;

        client.send("a").await.unwrap();
        client.send("b").await.unwrap();

        let requests = read_requests(&mut stream, 2).await;
        assert_eq!(requests[0].msg_counter, 1);
        assert_eq!(&requests[0].content[..], b"a");
        assert_eq!(requests[1].msg_counter, 2);
        assert_eq!(&requests[1].content[..], b"b");
        assert_eq!(client.snapshot().sent, 2);
    }

    #[tokio::test]
    async fn test_ack_clears_awaiting_and_applies_interval() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new()
            .auto_payload("ping")
            .auto_send(true)
            .auto_interval_ms(50)
            .spawn();
        client.connect("127.0.0.1", port);

        let (mut stream, _) = listener.accept().await.unwrap();
        let requests = read_requests(&mut stream, 1).await;
        assert_eq!(&requests[0].content[..], b"ping");

        let ack = AckEnvelope::new(RESP_OK, 42, Some(7000)).encode();
        stream.write_all(&build_frame(DEFAULT_VERSION, &ack).unwrap()).await.unwrap();

        let event = next_matching(&mut events, |e| matches!(e, ClientEvent::IntervalUpdated(_))).await;
        assert_eq!(event, ClientEvent::IntervalUpdated(7000));

        let mut snapshots = client.subscribe();
        timeout(WAIT, snapshots.wait_for(|s| s.auto_interval_ms == 7000 && s.state == ClientState::Connected))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_short_response_reported() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new().spawn();
        client.connect("127.0.0.1", port);

        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(&build_frame(DEFAULT_VERSION, &[RESP_OK, CMD_NONE]).unwrap())
            .await
            .unwrap();

        let event = next_matching(&mut events, |e| matches!(e, ClientEvent::MalformedAck { .. })).await;
        assert_eq!(event, ClientEvent::MalformedAck { len: 2 });
        let event = next_matching(&mut events, |e| matches!(e, ClientEvent::StatisticsUpdated { .. })).await;
        assert_eq!(event, ClientEvent::StatisticsUpdated { sent: 0, received: 1 });
    }

    #[tokio::test]
    async fn test_ack_timeout_drops_and_schedules_reconnect() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new()
            .auto_payload("ping")
            .auto_send(true)
            .auto_interval_ms(20)
            .ack_timeout(Duration::from_millis(100))
            .reconnect_delay(Duration::from_millis(100))
            .spawn();
        client.connect("127.0.0.1", port);

        // Accept and never answer.
        let (_silent, _) = listener.accept().await.unwrap();

        next_matching(&mut events, |e| *e == ClientEvent::AckTimeout).await;
        next_matching(&mut events, |e| *e == ClientEvent::Disconnected).await;
        let event = next_matching(&mut events, |e| matches!(e, ClientEvent::ReconnectScheduled { .. })).await;
        assert_eq!(
            event,
            ClientEvent::ReconnectScheduled {
                delay: Duration::from_millis(100)
            }
        );

        // The retry lands on the same listener.
        let (_again, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;
    }

    #[tokio::test]
    async fn test_peer_close_schedules_reconnect() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new()
            .reconnect_delay(Duration::from_millis(50))
            .spawn();
        client.connect("127.0.0.1", port);

        let (stream, _) = listener.accept().await.unwrap();
        next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;
        drop(stream);

        next_matching(&mut events, |e| *e == ClientEvent::Disconnected).await;
        next_matching(&mut events, |e| *e == ClientEvent::StatusChanged(ClientState::Reconnecting)).await;
        let (_again, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_cancels_retry() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new()
            .reconnect_delay(Duration::from_millis(50))
            .spawn();
        client.connect("127.0.0.1", port);
        let (_stream, _) = listener.accept().await.unwrap();
        next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;

        client.disconnect();
        next_matching(&mut events, |e| *e == ClientEvent::StatusChanged(ClientState::Disconnected)).await;

        assert!(timeout(Duration::from_millis(300), listener.accept()).await.is_err());
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_unusable_target_cancels_reconnect() {
        let (client, mut events) = ClientBuilder::new()
            .reconnect_delay(Duration::from_millis(20))
            .spawn();
        client.connect("127.0.0.1", 0);

        next_matching(&mut events, |e| matches!(e, ClientEvent::TransportError { .. })).await;
        next_matching(&mut events, |e| matches!(e, ClientEvent::ReconnectScheduled { .. })).await;
        next_matching(&mut events, |e| *e == ClientEvent::ReconnectCancelled).await;
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_interval_override_restarts_auto_timer() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new()
            .auto_payload("ping")
            .auto_send(true)
            .auto_interval_ms(50)
            .spawn();
        client.connect("127.0.0.1", port);

        let (mut stream, _) = listener.accept().await.unwrap();
        read_requests(&mut stream, 1).await;

        let ack = AckEnvelope::new(RESP_OK, 42, Some(7000)).encode();
        stream.write_all(&build_frame(DEFAULT_VERSION, &ack).unwrap()).await.unwrap();
        next_matching(&mut events, |e| *e == ClientEvent::IntervalUpdated(7000)).await;

        let mut snapshots = client.subscribe();
        let sent = timeout(WAIT, snapshots.wait_for(|s| s.auto_interval_ms == 7000))
            .await
            .unwrap()
            .unwrap()
            .sent;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(client.snapshot().sent, sent);
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_flood() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new()
            .auto_payload("x")
            .auto_send(true)
            .auto_interval_ms(0)
            .spawn();
        client.connect("127.0.0.1", port);

        let (_stream, _) = listener.accept().await.unwrap();
        next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.snapshot().sent, 0);
        assert_eq!(client.snapshot().auto_interval_ms, crate::config::DEFAULT_AUTO_INTERVAL_MS);
    }

    #[tokio::test]
    async fn test_disconnect_while_awaiting_ack() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new()
            .auto_payload("ping")
            .auto_send(true)
            .auto_interval_ms(30)
            .ack_timeout(Duration::from_millis(150))
            .reconnect_delay(Duration::from_millis(50))
            .spawn();
        client.connect("127.0.0.1", port);

        let (_silent, _) = listener.accept().await.unwrap();
        next_matching(&mut events, |e| *e == ClientEvent::StatusChanged(ClientState::AwaitingAck)).await;

        client.disconnect();
        next_matching(&mut events, |e| *e == ClientEvent::StatusChanged(ClientState::Disconnected)).await;

        let later = collect_for(&mut events, Duration::from_millis(400)).await;
        assert!(!later.contains(&ClientEvent::AckTimeout), "{later:?}");
        assert!(
            !later.iter().any(|e| matches!(e, ClientEvent::ReconnectScheduled { .. })),
            "{later:?}"
        );
        assert!(timeout(Duration::from_millis(100), listener.accept()).await.is_err());
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_while_reconnecting() {
        let (listener, port) = fake_server().await;
        let (client, mut events) = ClientBuilder::new()
            .reconnect_delay(Duration::from_millis(150))
            .spawn();
        client.connect("127.0.0.1", port);

        let (stream, _) = listener.accept().await.unwrap();
        next_matching(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;
        drop(stream);
        next_matching(&mut events, |e| *e == ClientEvent::StatusChanged(ClientState::Reconnecting)).await;

        client.disconnect();
        next_matching(&mut events, |e| *e == ClientEvent::StatusChanged(ClientState::Disconnected)).await;

        let later = collect_for(&mut events, Duration::from_millis(400)).await;
        assert!(
            !later
                .iter()
                .any(|e| matches!(e, ClientEvent::ReconnectScheduled { .. } | ClientEvent::Connected { .. })),
            "{later:?}"
        );
        assert!(timeout(Duration::from_millis(100), listener.accept()).await.is_err());
        assert_eq!(client.state(), ClientState::Disconnected);
    }
}
