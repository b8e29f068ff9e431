//! Throttled progress-checkpointing read wrapper (`spec.md` §4.6 step 7,
//! Design Notes §9: "implement as a read-wrapper with throttled side
//! effects, not a callback").
//!
//! The wrapper never buffers more than the underlying reader — it counts
//! bytes as they pass through `poll_read` and, at most once per
//! `interval`, spawns a fire-and-forget task to checkpoint progress. A
//! checkpoint failure is logged and does not affect the read: downloads
//! are pure streams, the checkpoint is a side effect.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, ReadBuf};
use tracing::warn;

use crate::store::TaskStore;

/// Wraps an `AsyncRead` and checkpoints cumulative bytes read to the task
/// store at most every `interval`.
pub struct ProgressReporter<R, S> {
    inner: R,
    store: S,
    task_id: i64,
    temp_path: String,
    initial_bytes: i64,
    bytes_seen: i64,
    last_checkpoint: Instant,
    interval: Duration,
}

impl<R, S> ProgressReporter<R, S>
where
    S: TaskStore + Clone + Send + Sync + 'static,
{
    pub fn new(inner: R, store: S, task_id: i64, temp_path: String, initial_bytes: i64, interval: Duration) -> Self {
        Self {
            inner,
            store,
            task_id,
            temp_path,
            initial_bytes,
            bytes_seen: 0,
            last_checkpoint: Instant::now(),
            interval,
        }
    }

    /// Total bytes observed so far (initial checkpoint + bytes read this
    /// attempt).
    pub fn total_bytes(&self) -> i64 {
        self.initial_bytes + self.bytes_seen
    }

    fn maybe_checkpoint(&mut self) {
        if self.last_checkpoint.elapsed() < self.interval {
            return;
        }
        self.last_checkpoint = Instant::now();

        let store = self.store.clone();
        let task_id = self.task_id;
        let temp_path = self.temp_path.clone();
        let total = self.total_bytes();
        tokio::spawn(async move {
            if let Err(e) = store.update_progress(task_id, total, Some(&temp_path)).await {
                warn!(task_id, error = %e, "progress checkpoint failed, continuing download");
            }
        });
    }
}

impl<R, S> AsyncRead for ProgressReporter<R, S>
where
    R: AsyncRead + Unpin,
    S: TaskStore + Clone + Send + Sync + 'static,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().len() - before;
            if read > 0 {
                this.bytes_seen += read as i64;
                this.maybe_checkpoint();
            }
        }
        poll
    }
}
