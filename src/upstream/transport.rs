//! Persistent-connection transport to one backend.
//!
//! # Responsibilities
//! - Dial the pre-resolved backend address, whatever the request URI says
//! - Give each connection a deadline; pending I/O past it fails `TimedOut`
//! - Track the most recently dialed connection's deadline for refresh
//! - Read through a `BufferPool` entry, returned to the pool on drop
//!
//! # Design Decisions
//! - Only the most recent connection's deadline is refreshed per request.
//!   Older pooled connections keep their dial-time deadline and are closed
//!   by hyper once it passes while they sit idle. Best effort, not a
//!   per-connection guarantee
//! - The tracked handle lives in an `ArcSwapOption`, so refreshing never locks

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use axum::http::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::{self, Instant, Sleep};

use crate::buffer::{BufferPool, PoolEntry};
use crate::observability::logging::Logger;

/// Shared, refreshable deadline of one connection.
#[derive(Debug)]
pub struct Deadline {
    base: Instant,
    offset_ms: AtomicU64,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(timeout.as_millis() as u64),
        }
    }

    /// Move the deadline to `timeout` from now.
    pub fn refresh(&self, timeout: Duration) {
        let at = Instant::now() + timeout;
        let offset = at.saturating_duration_since(self.base).as_millis() as u64;
        self.offset_ms.store(offset, Ordering::Relaxed);
    }

    pub fn at(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::Relaxed))
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "upstream connection deadline exceeded")
}

/// Backend socket with pooled buffered reads and a deadline.
pub struct PooledStream {
    reader: Option<PoolEntry>,
    writer: OwnedWriteHalf,
    pool: Arc<BufferPool>,
    deadline: Arc<Deadline>,
    timer: Pin<Box<Sleep>>,
}

impl PooledStream {
    pub fn new(stream: TcpStream, pool: Arc<BufferPool>, deadline: Arc<Deadline>) -> Self {
        let (read, writer) = stream.into_split();
        let reader = pool.take(read);
        let timer = Box::pin(time::sleep_until(deadline.at()));
        Self {
            reader: Some(reader),
            writer,
            pool,
            deadline,
            timer,
        }
    }

    /// Register for the deadline and report whether it has passed.
    fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        let at = self.deadline.at();
        if self.timer.deadline() != at {
            self.timer.as_mut().reset(at);
        }
        self.timer.as_mut().poll(cx).is_ready()
    }
}

impl AsyncRead for PooledStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(reader) = this.reader.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        match Pin::new(reader).poll_read(cx, buf) {
            Poll::Pending if this.poll_expired(cx) => Poll::Ready(Err(deadline_exceeded())),
            other => other,
        }
    }
}

impl AsyncWrite for PooledStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.writer).poll_write(cx, buf) {
            Poll::Pending if this.poll_expired(cx) => Poll::Ready(Err(deadline_exceeded())),
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

impl Drop for PooledStream {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.pool.give(reader);
        }
    }
}

/// hyper-facing wrapper around a [`PooledStream`].
pub struct PooledConnection {
    io: TokioIo<PooledStream>,
}

impl PooledConnection {
    pub fn new(stream: PooledStream) -> Self {
        Self { io: TokioIo::new(stream) }
    }
}

impl hyper::rt::Read for PooledConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        hyper::rt::Read::poll_read(Pin::new(&mut self.io), cx, buf)
    }
}

impl hyper::rt::Write for PooledConnection {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        hyper::rt::Write::poll_write(Pin::new(&mut self.io), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_flush(Pin::new(&mut self.io), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_shutdown(Pin::new(&mut self.io), cx)
    }
}

impl Connection for PooledConnection {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

/// Connector used by the hyper client: always dials the resolved backend.
#[derive(Clone)]
pub struct UpstreamDialer {
    addr: Option<SocketAddr>,
    timeout: Duration,
    pool: Arc<BufferPool>,
    last_dialed: Arc<ArcSwapOption<Deadline>>,
    log: Arc<dyn Logger>,
}

impl UpstreamDialer {
    pub fn new(
        addr: Option<SocketAddr>,
        timeout: Duration,
        pool: Arc<BufferPool>,
        last_dialed: Arc<ArcSwapOption<Deadline>>,
        log: Arc<dyn Logger>,
    ) -> Self {
        Self {
            addr,
            timeout,
            pool,
            last_dialed,
            log,
        }
    }

    async fn dial(self) -> io::Result<PooledConnection> {
        let addr = self.addr.ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "backend address was not resolved")
        })?;
        self.log.fine(format_args!("Dialing connection to {}", addr));

        let stream = match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.log.error(format_args!("Dial Failed: {}", e));
                return Err(e);
            }
            Err(_) => {
                self.log.error(format_args!("Dial Failed: {} timed out after {:?}", addr, self.timeout));
                return Err(io::Error::new(io::ErrorKind::TimedOut, "dial timed out"));
            }
        };
        stream.set_nodelay(true)?;

        let deadline = Arc::new(Deadline::after(self.timeout));
        self.last_dialed.store(Some(deadline.clone()));
        Ok(PooledConnection::new(PooledStream::new(stream, self.pool.clone(), deadline)))
    }
}

impl tower::Service<Uri> for UpstreamDialer {
    type Response = PooledConnection;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<PooledConnection>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _dst: Uri) -> Self::Future {
        let dialer = self.clone();
        Box::pin(dialer.dial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::MemoryLogger;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tower::Service;

    fn dialer(addr: Option<SocketAddr>, timeout: Duration, pool: Arc<BufferPool>) -> UpstreamDialer {
        UpstreamDialer::new(
            addr,
            timeout,
            pool,
            Arc::new(ArcSwapOption::empty()),
            Arc::new(MemoryLogger::new()),
        )
    }

    #[test]
    fn test_deadline_refresh_moves_forward() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        rt.block_on(async {
            let deadline = Deadline::after(Duration::from_millis(10));
            let first = deadline.at();
            time::sleep(Duration::from_millis(5)).await;
            deadline.refresh(Duration::from_secs(1));
            assert!(deadline.at() > first);
        });
    }

    #[tokio::test]
    async fn test_unresolved_address_fails_dial() {
        let pool = Arc::new(BufferPool::new(1, 64));
        let mut dialer = dialer(None, Duration::from_secs(1), pool);
        let err = dialer.call(Uri::from_static("http://backend/")).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AddrNotAvailable);
    }

    #[tokio::test]
    async fn test_dial_records_last_deadline_and_returns_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"pong").await.unwrap();
        });

        let pool = Arc::new(BufferPool::new(1, 64));
        let last = Arc::new(ArcSwapOption::empty());
        let mut dialer = UpstreamDialer::new(
            Some(addr),
            Duration::from_secs(5),
            pool.clone(),
            last.clone(),
            Arc::new(MemoryLogger::new()),
        );
        let conn = dialer.call(Uri::from_static("http://ignored/")).await.unwrap();
        assert!(last.load().is_some());

        let mut stream = conn.io.into_inner();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(stream);
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn test_read_past_deadline_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_secs(5)).await;
        });

        let pool = Arc::new(BufferPool::new(1, 64));
        let stream = TcpStream::connect(addr).await.unwrap();
        let deadline = Arc::new(Deadline::after(Duration::from_millis(100)));
        let mut stream = PooledStream::new(stream, pool, deadline);

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
