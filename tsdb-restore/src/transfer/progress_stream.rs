//! Byte-counting stream wrapper for shard uploads.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::{Duration, Instant};

/// Callback for progress updates
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Stream wrapper that tracks bytes passed through and reports them.
///
/// The running total is published to a shared counter on every chunk so it is
/// readable after the stream has been handed off to the HTTP client. The
/// callback fires at most every `update_interval` and once at end of stream.
pub struct ProgressStream<S> {
    inner: S,
    bytes_transferred: u64,
    counter: Arc<AtomicU64>,
    last_update: Instant,
    update_interval: Duration,
    callback: ProgressCallback,
}

impl<S> ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>>,
{
    /// Create a new progress stream
    pub fn new(inner: S, counter: Arc<AtomicU64>, callback: ProgressCallback) -> Self {
        Self {
            inner,
            bytes_transferred: 0,
            counter,
            last_update: Instant::now(),
            update_interval: Duration::from_secs(5),
            callback,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = Pin::new(&mut self.inner);

        match inner.poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                let chunk_size = bytes.len() as u64;
                self.bytes_transferred += chunk_size;
                self.counter.store(self.bytes_transferred, Ordering::Relaxed);

                let now = Instant::now();
                if now.duration_since(self.last_update) >= self.update_interval {
                    (self.callback)(self.bytes_transferred);
                    self.last_update = now;
                }

                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                // Final update on completion
                (self.callback)(self.bytes_transferred);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
