//! Reconnecting client session.
//!
//! A [`ClientBuilder`] spawns one actor task that owns the socket, the
//! stream parser and the three timers (auto-send, ack wait, reconnect).
//! The returned [`ClientHandle`] is a cheap, cloneable command surface;
//! everything the session observes comes back as [`ClientEvent`]s and as
//! [`ClientSnapshot`] updates on a watch channel.
//!
//! # Example
//!
//! ```ignore
//! use framelink::client::{ClientBuilder, ClientEvent};
//!
//! let (client, mut events) = ClientBuilder::new()
//!     .auto_payload("ping")
//!     .auto_send(true)
//!     .spawn();
//!
//! client.connect("127.0.0.1", 9000);
//! while let Some(event) = events.recv().await {
//!     if let ClientEvent::IntervalUpdated(ms) = event {
//!         println!("server asked for {ms} ms");
//!     }
//! }
//! ```

mod session;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use crate::codec::AckEnvelope;
use crate::config::ClientConfig;
use crate::error::{FrameError, LinkError, Result};
use crate::writer::WriterConfig;

use session::{ClientSession, Command};

/// Connection state of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Idle with no retry pending.
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Connected and not waiting on an ack.
    Connected,
    /// Connected; an auto-send is waiting for its ack.
    AwaitingAck,
    /// Disconnected with a reconnect timer armed.
    Reconnecting,
}

/// Point-in-time view of a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSnapshot {
    pub state: ClientState,
    /// Frames sent on the current connection.
    pub sent: u64,
    /// Frames received on the current connection.
    pub received: u64,
    pub auto_interval_ms: u32,
    pub auto_send: bool,
    pub peer: Option<SocketAddr>,
}

impl Default for ClientSnapshot {
    fn default() -> Self {
        Self {
            state: ClientState::Disconnected,
            sent: 0,
            received: 0,
            auto_interval_ms: crate::config::DEFAULT_AUTO_INTERVAL_MS,
            auto_send: false,
            peer: None,
        }
    }
}

/// Everything a client session reports.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Derived state changed.
    StatusChanged(ClientState),
    /// Transport established.
    Connected { peer: SocketAddr },
    /// Transport gone (peer close, error, ack timeout or local disconnect).
    Disconnected,
    /// Connect or socket error.
    TransportError { reason: String },
    /// Raw payload of every received frame.
    ResponseReceived(Bytes),
    /// Decoded ack.
    AckReceived(AckEnvelope),
    /// Server-forced auto-send interval applied.
    IntervalUpdated(u32),
    /// Counters changed.
    StatisticsUpdated { sent: u64, received: u64 },
    /// Stream parser dropped bytes while resynchronizing.
    MalformedFrame(FrameError),
    /// A frame arrived whose payload is too short to be an ack.
    MalformedAck { len: usize },
    /// A send could not be written.
    SendFailed { reason: String },
    /// Reconnect timer armed.
    ReconnectScheduled { delay: Duration },
    /// Reconnect timer fired without a usable target.
    ReconnectCancelled,
    /// No ack arrived within the ack timeout.
    AckTimeout,
}

/// Builder for a client session.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Auto-send cadence. Default: 3000 ms
    pub fn auto_interval_ms(mut self, ms: u32) -> Self {
        self.config.auto_interval_ms = ms;
        self
    }

    /// Ack wait after each auto-send. Default: 5 seconds
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay before reconnecting. Default: 3 seconds
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Content sent on each auto-send tick.
    pub fn auto_payload(mut self, payload: impl Into<String>) -> Self {
        self.config.auto_payload = payload.into();
        self
    }

    /// Start with auto-send enabled.
    pub fn auto_send(mut self, enabled: bool) -> Self {
        self.config.auto_send = enabled;
        self
    }

    pub fn writer_config(mut self, config: WriterConfig) -> Self {
        self.config.writer = config;
        self
    }

    /// Spawn the session actor on the current tokio runtime.
    ///
    /// The actor runs until [`ClientHandle::shutdown`] is called or every
    /// handle is dropped.
    pub fn spawn(self) -> (ClientHandle, mpsc::UnboundedReceiver<ClientEvent>) {
        let config = self.config.with_nonzero_timings();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let initial = ClientSnapshot {
            auto_interval_ms: config.auto_interval_ms,
            auto_send: config.auto_send,
            ..ClientSnapshot::default()
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let session = ClientSession::new(config, command_rx, event_tx, snapshot_tx);
        tokio::spawn(session.run());

        let handle = ClientHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        };
        (handle, event_rx)
    }
}

/// Command surface of a running client session.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ClientSnapshot>,
}

impl ClientHandle {
    /// Connect to `host:port` and keep reconnecting after transport loss.
    pub fn connect(&self, host: impl Into<String>, port: u16) {
        self.command(Command::Connect {
            host: host.into(),
            port,
        });
    }

    /// Close the transport and stop all timers; no retry follows.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Send `content` wrapped in a request envelope.
    ///
    /// # Errors
    ///
    /// `NotConnected` if no transport is up (a reconnect is armed if
    /// auto-reconnect is on), `PayloadTooLarge` if the envelope does not fit
    /// one frame, `ConnectionClosed` if the session has shut down.
    pub async fn send(&self, content: impl Into<Bytes>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                content: content.into(),
                reply,
            })
            .map_err(|_| LinkError::ConnectionClosed)?;
        rx.await.map_err(|_| LinkError::ConnectionClosed)?
    }

    pub fn set_auto_payload(&self, payload: impl Into<Bytes>) {
        self.command(Command::SetAutoPayload(payload.into()));
    }

    pub fn set_auto_send(&self, enabled: bool) {
        self.command(Command::SetAutoSend(enabled));
    }

    /// Change the auto-send cadence; an armed timer restarts with it.
    pub fn set_auto_interval(&self, ms: u32) {
        self.command(Command::SetAutoInterval(ms));
    }

    /// Disconnect and stop the actor task.
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> ClientSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> ClientState {
        self.snapshot.borrow().state
    }

    /// Watch receiver for snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshot.clone()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("client session already stopped");
        }
    }
}
