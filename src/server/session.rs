//! Server-side session: one task per accepted connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use super::record::ConnectionRecord;
use super::runtime::SharedRuntimeConfig;
use super::ServerEvent;
use crate::codec::{AckEnvelope, RequestEnvelope, RESP_OK};
use crate::protocol::{ParseEvent, StreamParser};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Live sessions of one listener, by connection id.
pub(crate) type SessionMap = Arc<Mutex<HashMap<String, SessionEntry>>>;

/// One-shot guard for the "connection finished" notification.
#[derive(Debug, Default)]
pub(crate) struct FinishLatch(AtomicBool);

impl FinishLatch {
    /// True for exactly one caller.
    pub(crate) fn fire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[cfg(test)]
    pub(crate) fn is_fired(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Listener-side handle on a running session.
pub(crate) struct SessionEntry {
    pub(crate) stop: Arc<Notify>,
    pub(crate) latch: Arc<FinishLatch>,
    pub(crate) record: watch::Receiver<ConnectionRecord>,
    pub(crate) task: JoinHandle<()>,
}

impl SessionEntry {
    /// Emit the closing record and notification unless the session already did.
    pub(crate) fn finish_from_listener(&self, events: &mpsc::UnboundedSender<ServerEvent>) {
        if !self.latch.fire() {
            return;
        }
        let mut record = self.record.borrow().clone();
        record.mark_disconnected();
        let id = record.id.clone();
        let _ = events.send(ServerEvent::ConnectionUpdated(record));
        let _ = events.send(ServerEvent::ConnectionClosed { id });
    }
}

/// Everything a session needs besides its socket.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) runtime: Arc<SharedRuntimeConfig>,
    pub(crate) events: mpsc::UnboundedSender<ServerEvent>,
    pub(crate) sessions: SessionMap,
    pub(crate) writer_config: WriterConfig,
    pub(crate) read_buffer_size: usize,
    pub(crate) stop_timeout: Duration,
}

enum Exit {
    PeerClosed,
    Stopped,
}

pub(crate) struct SessionHandler {
    id: String,
    record: ConnectionRecord,
    record_tx: watch::Sender<ConnectionRecord>,
    latch: Arc<FinishLatch>,
    stop: Arc<Notify>,
    parser: StreamParser,
    ctx: SessionContext,
}

impl SessionHandler {
    /// Build a handler and the entry the listener keeps for it.
    pub(crate) fn new(
        record: ConnectionRecord,
        ctx: SessionContext,
    ) -> (Self, watch::Receiver<ConnectionRecord>, Arc<Notify>, Arc<FinishLatch>) {
        let (record_tx, record_rx) = watch::channel(record.clone());
        let stop = Arc::new(Notify::new());
        let latch = Arc::new(FinishLatch::default());

        let handler = Self {
            id: record.id.clone(),
            record,
            record_tx,
            latch: Arc::clone(&latch),
            stop: Arc::clone(&stop),
            parser: StreamParser::new(),
            ctx,
        };
        (handler, record_rx, stop, latch)
    }

    pub(crate) async fn run(mut self, stream: TcpStream) {
        self.publish_record();

        let (mut reader, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half, self.ctx.writer_config.clone());

        let exit = self.serve(&mut reader, &writer).await;
        if let Exit::Stopped = exit {
            self.close_gracefully(reader, writer, writer_task).await;
        } else {
            drop(writer);
            writer_task.abort();
        }

        self.finish();
        self.ctx.sessions.lock().await.remove(&self.id);
        tracing::debug!(connection_id = %self.id, "session ended");
    }

    async fn serve(&mut self, reader: &mut OwnedReadHalf, writer: &WriterHandle) -> Exit {
        let mut buf = vec![0u8; self.ctx.read_buffer_size.max(1)];
        let stop = Arc::clone(&self.stop);

        loop {
            let n = tokio::select! {
                _ = stop.notified() => return Exit::Stopped,
                result = reader.read(&mut buf) => match result {
                    Ok(0) => return Exit::PeerClosed,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!(connection_id = %self.id, error = %e, "read failed");
                        return Exit::PeerClosed;
                    }
                },
            };

            for event in self.parser.push(&buf[..n]) {
                match event {
                    ParseEvent::Malformed(error) => {
                        tracing::warn!(connection_id = %self.id, %error, "invalid packet");
                        self.emit(ServerEvent::InvalidPacket {
                            id: self.id.clone(),
                            error,
                        });
                    }
                    ParseEvent::Frame(frame) => {
                        if !self.on_frame(frame.payload, writer).await {
                            return Exit::PeerClosed;
                        }
                    }
                }
            }
        }
    }

    /// Returns false once the write side is gone.
    async fn on_frame(&mut self, payload: Bytes, writer: &WriterHandle) -> bool {
        let ack = AckEnvelope::new(RESP_OK, now_ms(), self.ctx.runtime.forced_interval());
        if let Some(interval) = ack.interval_override {
            self.record.interval_ms = interval;
        }
        self.record.touch();
        self.publish_record();

        let request = RequestEnvelope::decode(&payload).ok();
        self.emit(ServerEvent::FrameReceived {
            id: self.id.clone(),
            payload,
            request,
        });

        let frame = match OutboundFrame::encode(&ack.encode()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(connection_id = %self.id, error = %e, "ack encode failed");
                return true;
            }
        };
        match writer.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(connection_id = %self.id, error = %e, "ack not sent");
                false
            }
        }
    }

    /// Flush queued acks, send FIN, and give the peer a bounded window to close.
    async fn close_gracefully(
        &self,
        mut reader: OwnedReadHalf,
        writer: WriterHandle,
        writer_task: JoinHandle<crate::error::Result<()>>,
    ) {
        let deadline = Instant::now() + self.ctx.stop_timeout;
        drop(writer);

        let mut writer_task = writer_task;
        if timeout_at(deadline, &mut writer_task).await.is_err() {
            writer_task.abort();
        }

        let mut sink = [0u8; 512];
        let drained = timeout_at(deadline, async {
            loop {
                match reader.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::debug!(connection_id = %self.id, "peer did not close in time");
        }
    }

    /// Emit the disconnect exactly once across every path.
    fn finish(&mut self) {
        if !self.latch.fire() {
            return;
        }
        tracing::info!(connection_id = %self.id, "connection closed");
        self.record.mark_disconnected();
        self.publish_record();
        self.emit(ServerEvent::ConnectionClosed {
            id: self.id.clone(),
        });
    }

    fn publish_record(&self) {
        self.record_tx.send_replace(self.record.clone());
        self.emit(ServerEvent::ConnectionUpdated(self.record.clone()));
    }

    fn emit(&self, event: ServerEvent) {
        let _ = self.ctx.events.send(event);
    }
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_fires_once() {
        let latch = FinishLatch::default();
        assert!(!latch.is_fired());
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.is_fired());
    }

    #[test]
    fn test_latch_single_winner_across_threads() {
        let latch = Arc::new(FinishLatch::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = Arc::clone(&latch);
                std::thread::spawn(move || latch.fire())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_now_ms_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_ms() > 1_577_836_800_000);
    }
}
