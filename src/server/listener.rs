//! TCP accept loop and session registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::record::ConnectionRecord;
use super::runtime::SharedRuntimeConfig;
use super::session::{SessionContext, SessionEntry, SessionHandler, SessionMap};
use super::ServerEvent;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::transport;
use crate::writer::WriterConfig;

/// Extra time the listener waits beyond a session's own close window.
const STOP_GRACE: Duration = Duration::from_millis(250);

/// Builder for a [`Listener`].
#[derive(Debug, Clone, Default)]
pub struct ListenerBuilder {
    config: ServerConfig,
}

impl ListenerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Advertise `ms` in every ack from the start.
    pub fn forced_interval(mut self, ms: u32) -> Self {
        self.config.interval_control = true;
        self.config.forced_interval_ms = ms;
        self
    }

    /// Per-session close window on stop. Default: 1 second
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.stop_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn writer_config(mut self, config: WriterConfig) -> Self {
        self.config.writer = config;
        self
    }

    /// Create the listener. Nothing is bound until [`Listener::start`].
    pub fn build(self) -> (Listener, mpsc::UnboundedReceiver<ServerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(SharedRuntimeConfig::new(
            self.config.interval_control,
            self.config.forced_interval_ms,
        ));
        let listener = Listener {
            config: self.config,
            runtime,
            events,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            accept: None,
        };
        (listener, rx)
    }
}

struct AcceptLoop {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
    port: u16,
}

/// Accepts connections and owns their sessions.
pub struct Listener {
    config: ServerConfig,
    runtime: Arc<SharedRuntimeConfig>,
    events: mpsc::UnboundedSender<ServerEvent>,
    sessions: SessionMap,
    accept: Option<AcceptLoop>,
}

impl Listener {
    pub fn builder() -> ListenerBuilder {
        ListenerBuilder::new()
    }

    /// Bind `port` (0 picks a free one) and start accepting.
    ///
    /// A running accept loop is replaced; its sessions keep running.
    /// Returns the bound port.
    pub async fn start(&mut self, port: u16) -> Result<u16> {
        if let Some(previous) = self.accept.take() {
            info!(port = previous.port, "replacing running listener");
            close_accept_loop(previous).await;
        }

        let listener = transport::bind(port).await?;
        let port = listener.local_addr()?.port();

        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&shutdown),
            self.session_context(),
        ));
        self.accept = Some(AcceptLoop {
            shutdown,
            task,
            port,
        });

        info!(port, "listening");
        let _ = self.events.send(ServerEvent::Listening { port });
        Ok(port)
    }

    /// Stop accepting and close every session.
    ///
    /// Each session gets a bounded window to close on its own; stragglers
    /// are aborted. Every connection open at the time of the call is
    /// reported closed exactly once. Calling `stop` again is harmless.
    pub async fn stop(&mut self) {
        if let Some(accept) = self.accept.take() {
            close_accept_loop(accept).await;
        }

        let entries: Vec<(String, SessionEntry)> = self.sessions.lock().await.drain().collect();
        if !entries.is_empty() {
            info!(count = entries.len(), "stopping sessions");
        }
        for (_, entry) in &entries {
            entry.stop.notify_one();
        }

        let deadline = Instant::now() + self.config.stop_timeout() + STOP_GRACE;
        for (id, mut entry) in entries {
            if timeout_at(deadline, &mut entry.task).await.is_err() {
                warn!(connection_id = %id, "session did not stop in time, aborting");
                entry.task.abort();
            }
            entry.finish_from_listener(&self.events);
        }

        let _ = self.events.send(ServerEvent::Stopped);
    }

    pub fn is_listening(&self) -> bool {
        self.accept.is_some()
    }

    /// Bound port while listening.
    pub fn local_port(&self) -> Option<u16> {
        self.accept.as_ref().map(|accept| accept.port)
    }

    /// Interval carried by acks, or `None` when interval control is off.
    pub fn forced_interval(&self) -> Option<u32> {
        self.runtime.forced_interval()
    }

    /// Enable interval control with a value, or disable it.
    ///
    /// Takes effect on the next ack of every session.
    pub fn set_forced_interval(&self, interval: Option<u32>) {
        info!(?interval, "forced interval changed");
        self.runtime.set_forced_interval(interval);
    }

    /// Shared runtime settings, for control surfaces that outlive `&self`.
    pub fn runtime(&self) -> Arc<SharedRuntimeConfig> {
        Arc::clone(&self.runtime)
    }

    /// Number of sessions still registered.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            runtime: Arc::clone(&self.runtime),
            events: self.events.clone(),
            sessions: Arc::clone(&self.sessions),
            writer_config: self.config.writer.clone(),
            read_buffer_size: self.config.read_buffer_size,
            stop_timeout: self.config.stop_timeout(),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(accept) = self.accept.take() {
            accept.task.abort();
        }
        if let Ok(sessions) = self.sessions.try_lock() {
            for entry in sessions.values() {
                entry.stop.notify_one();
            }
        }
    }
}

async fn close_accept_loop(accept: AcceptLoop) {
    accept.shutdown.notify_one();
    if let Err(e) = accept.task.await {
        debug!(error = %e, "accept loop ended abnormally");
    }
}

async fn accept_loop(listener: TcpListener, shutdown: Arc<Notify>, ctx: SessionContext) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    if let Err(e) = transport::configure(&stream) {
                        warn!(%peer, error = %e, "failed to configure socket");
                    }

                    let id = Uuid::new_v4().to_string();
                    let record = ConnectionRecord::new(
                        id.clone(),
                        peer.ip(),
                        peer.port(),
                        ctx.runtime.forced_interval_ms(),
                    );
                    info!(connection_id = %id, %peer, "client connected");

                    let (handler, record, stop, latch) = SessionHandler::new(record, ctx.clone());

                    // Registered under the lock so a short-lived session cannot
                    // deregister before it is inserted.
                    let mut sessions = ctx.sessions.lock().await;
                    let task = tokio::spawn(handler.run(stream));
                    sessions.insert(id, SessionEntry { stop, latch, record, task });
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                }
            },
            _ = shutdown.notified() => {
                debug!("accept loop stopping");
                break;
            }
        }
    }
}
