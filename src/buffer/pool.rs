//! Bounded, lossy pool of reusable buffered readers.
//!
//! # Responsibilities
//! - Hand out a `PoolEntry` bound to a caller-supplied source, never blocking
//! - Discard bytes left over from a previous source before rebinding
//! - Retain at most `capacity` idle entries; extra entries are dropped
//!
//! # Design Decisions
//! - `crossbeam_queue::ArrayQueue` gives non-blocking push/pop with a hard cap
//! - The buffered reader reads through a swappable `PoolSource`, so the
//!   buffer allocation survives across sources
//! - Correctness never depends on reuse: a fresh entry and a reused entry
//!   behave identically

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use crossbeam_queue::ArrayQueue;
use tokio::io::{AsyncBufRead, AsyncRead, BufReader, ReadBuf};

type BoxedSource = Box<dyn AsyncRead + Send + Unpin>;

/// Passthrough reader over whichever source is currently bound.
///
/// Reads from an unbound source report end of stream.
pub struct PoolSource {
    inner: Option<BoxedSource>,
}

impl AsyncRead for PoolSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(source) => Pin::new(source).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// A buffered reader paired with its swappable source.
pub struct PoolEntry {
    reader: BufReader<PoolSource>,
    buffer_size: usize,
}

impl PoolEntry {
    fn new(source: BoxedSource, buffer_size: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size, PoolSource { inner: Some(source) }),
            buffer_size,
        }
    }

    /// The buffered reader over the bound source.
    pub fn reader(&mut self) -> &mut BufReader<PoolSource> {
        &mut self.reader
    }

    /// Bytes read from the source but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.reader.buffer().len()
    }

    /// Capacity of the internal buffer.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_size
    }

    fn rebind(&mut self, source: BoxedSource) {
        let leftover = self.buffered();
        if leftover > 0 {
            Pin::new(&mut self.reader).consume(leftover);
        }
        self.reader.get_mut().inner = Some(source);
    }

    fn unbind(&mut self) {
        self.reader.get_mut().inner = None;
    }
}

impl AsyncRead for PoolEntry {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncBufRead for PoolEntry {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().reader).poll_fill_buf(cx)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.reader).consume(amt)
    }
}

/// Leaky-bucket pool of `PoolEntry` values.
pub struct BufferPool {
    buffer_size: usize,
    idle: Option<ArrayQueue<PoolEntry>>,
    allocated: AtomicUsize,
    reused: AtomicUsize,
}

impl BufferPool {
    /// Create a pool retaining at most `capacity` idle entries, each with a
    /// `buffer_size` byte buffer. A zero capacity retains nothing.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            idle: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    /// Take an entry bound to `source`. Reuses an idle entry when one is
    /// available, otherwise allocates.
    pub fn take<R>(&self, source: R) -> PoolEntry
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let source: BoxedSource = Box::new(source);
        match self.idle.as_ref().and_then(|q| q.pop()) {
            Some(mut entry) => {
                entry.rebind(source);
                self.reused.fetch_add(1, Ordering::Relaxed);
                entry
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                PoolEntry::new(source, self.buffer_size)
            }
        }
    }

    /// Return an entry. Dropped when the pool is already full.
    pub fn give(&self, mut entry: PoolEntry) {
        entry.unbind();
        if let Some(queue) = self.idle.as_ref() {
            let _ = queue.push(entry);
        }
    }

    /// Maximum number of retained idle entries.
    pub fn capacity(&self) -> usize {
        self.idle.as_ref().map_or(0, |q| q.capacity())
    }

    /// Number of idle entries currently retained.
    pub fn idle(&self) -> usize {
        self.idle.as_ref().map_or(0, |q| q.len())
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Entries allocated fresh since creation.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Entries handed out by reuse since creation.
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity())
            .field("idle", &self.idle())
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}
