//! Dedicated writer task for outbound frames.
//!
//! Each connection owns one writer task fed through an mpsc channel, so the
//! socket write half is never shared behind a lock. Frames queued while a
//! write is in flight are coalesced into a single `write_vectored` call.
//!
//! ```text
//! session / actor ─► WriterHandle ─► mpsc<OutboundFrame> ─► writer task ─► TCP write half
//! ```

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{LinkError, Result};
use crate::protocol::{build_frame, DEFAULT_VERSION};

/// Default maximum queued frames before senders wait.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 256;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default time a sender waits for the queue to drain.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_BATCH_SIZE: usize = 32;

/// A fully encoded frame waiting to be written.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    bytes: Bytes,
}

impl OutboundFrame {
    /// Frame `payload` with the default version.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` if the payload does not fit in one frame.
    pub fn encode(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            bytes: build_frame(DEFAULT_VERSION, payload)?,
        })
    }

    /// Wrap bytes that are already a complete wire frame.
    #[inline]
    pub fn from_encoded(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Wire bytes.
    #[inline]
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Size on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Queued frames at which senders start waiting.
    pub max_pending_frames: usize,
    /// Channel capacity.
    pub channel_capacity: usize,
    /// Time a sender waits for the queue to drain.
    #[serde(with = "millis")]
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Cloneable handle for queueing frames on a writer task.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    /// Queue a frame, waiting while the writer is saturated.
    ///
    /// # Errors
    ///
    /// `BackpressureTimeout` if the queue does not drain in time,
    /// `ConnectionClosed` if the writer task has exited.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            LinkError::ConnectionClosed
        })
    }

    /// Queue a frame without waiting.
    ///
    /// # Errors
    ///
    /// `BackpressureTimeout` immediately if at capacity.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(LinkError::BackpressureTimeout);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => LinkError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => LinkError::ConnectionClosed,
            }
        })
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_millis(1);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }
            if start.elapsed() > self.timeout {
                return Err(LinkError::BackpressureTimeout);
            }
            tokio::time::sleep(check_interval).await;
        }
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// True if the writer task has exited.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn a writer task over `writer`.
///
/// The task ends with `Ok(())` once every handle is dropped, or with the
/// first I/O error.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
        max_pending: config.max_pending_frames.max(1),
        timeout: config.backpressure_timeout,
    };

    let task = tokio::spawn(writer_loop(rx, writer, pending));
    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let count = batch.len();
        let result = write_batch(&mut writer, &batch).await;
        pending.fetch_sub(count, Ordering::Release);
        batch.clear();

        if let Err(e) = result {
            tracing::debug!(error = %e, "writer task stopping");
            return Err(e);
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Write a batch of frames with vectored I/O, resuming after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut written = 0;

    while written < total {
        let slices = remaining_slices(batch, written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        written += n;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices covering everything after the first `skip` bytes of the batch.
fn remaining_slices(batch: &[OutboundFrame], skip: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip < end {
            let start = skip.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.bytes[start..]));
        }
        offset = end;
    }

    slices
}
