//! Forwarding stage for one fixed backend.
//!
//! # Responsibilities
//! - Resolve the backend once, at construction
//! - Forward the in-flight request over persistent connections
//! - Classify failures: timeout → 504, anything else → 502
//! - Probe backend liveness on request
//!
//! # Design Decisions
//! - Errors never escape as `Err`: a failed forward is a response plus a
//!   `Failed` stage status, so the pipeline keeps running post stages
//! - The backend response is streamed through untouched

use std::error::Error as StdError;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri, Version};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::time;

use crate::buffer::BufferPool;
use crate::config::schema::UpstreamConfig;
use crate::http::response::{bad_gateway, gateway_timeout};
use crate::observability::logging::Logger;
use crate::observability::metrics;
use crate::pipeline::context::{RequestContext, StageStatus};
use crate::pipeline::stage::RequestStage;
use crate::upstream::transport::{Deadline, UpstreamDialer};

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Up,
    Down,
    /// No ping path configured.
    NotApplicable,
}

/// Request stage that forwards to a single backend.
pub struct UpstreamConnector {
    name: String,
    authority: String,
    addr: Option<SocketAddr>,
    timeout: Duration,
    force_http: bool,
    ping_path: Option<String>,
    max_idle_per_host: usize,
    dialer: UpstreamDialer,
    client: Client<UpstreamDialer, Body>,
    last_dialed: Arc<ArcSwapOption<Deadline>>,
    log: Arc<dyn Logger>,
}

fn resolve_ipv4(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no IPv4 address"))
}

fn build_client(dialer: UpstreamDialer, max_idle_per_host: usize) -> Client<UpstreamDialer, Body> {
    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(max_idle_per_host)
        .pool_timer(TokioTimer::new())
        .build(dialer)
}

/// Whether `err` or any of its causes is a timeout.
pub fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }
        if e.is::<time::error::Elapsed>() {
            return true;
        }
        current = e.source();
    }
    false
}

impl UpstreamConnector {
    /// Build a connector. An unresolvable host is logged, not fatal: every
    /// forward then fails with 502.
    pub fn new(config: UpstreamConfig, pool: Arc<BufferPool>, log: Arc<dyn Logger>) -> Self {
        let authority = format!("{}:{}", config.host, config.port);
        let addr = match resolve_ipv4(&config.host, config.port) {
            Ok(addr) => Some(addr),
            Err(e) => {
                log.warn(format_args!("Can't get IP addr for {}: {}", authority, e));
                None
            }
        };

        let timeout = config.timeout();
        let last_dialed = Arc::new(ArcSwapOption::empty());
        let dialer = UpstreamDialer::new(addr, timeout, pool, last_dialed.clone(), log.clone());
        let client = build_client(dialer.clone(), config.max_idle_per_host);

        Self {
            name: config.name,
            authority,
            addr,
            timeout,
            force_http: config.force_http,
            ping_path: config.ping_path,
            max_idle_per_host: config.max_idle_per_host,
            dialer,
            client,
            last_dialed,
            log,
        }
    }

    /// Change the idle-connection cap. Existing idle connections are dropped.
    pub fn set_pool_size(&mut self, size: usize) {
        self.max_idle_per_host = size;
        self.client = build_client(self.dialer.clone(), size);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `host:port` as configured.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn force_http(&self) -> bool {
        self.force_http
    }

    pub fn ping_path(&self) -> Option<&str> {
        self.ping_path.as_deref()
    }

    pub fn max_idle_per_host(&self) -> usize {
        self.max_idle_per_host
    }

    /// Rewrite the context's request for the backend and take it for sending.
    /// The context keeps method, URI and headers; the body moves out.
    fn prepare(&self, ctx: &mut RequestContext) -> Result<Request<Body>, axum::http::Error> {
        let req = ctx.request_mut();
        if self.force_http || req.uri().scheme().is_none() {
            let path = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            *req.uri_mut() = Uri::builder()
                .scheme(Scheme::HTTP)
                .authority(self.authority.as_str())
                .path_and_query(path)
                .build()?;
        }
        req.headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let body = std::mem::replace(req.body_mut(), Body::empty());
        let mut forwarded = Request::new(body);
        *forwarded.method_mut() = req.method().clone();
        *forwarded.uri_mut() = req.uri().clone();
        *forwarded.headers_mut() = req.headers().clone();
        *forwarded.version_mut() = Version::HTTP_11;
        Ok(forwarded)
    }

    /// Forward the in-flight request and return the backend's response, or
    /// a 502/504 with the stage marked `Failed`.
    pub async fn forward(&self, ctx: &mut RequestContext) -> Response<Body> {
        let before = Instant::now();
        let method = ctx.request().method().clone();

        let response = match self.prepare(ctx) {
            Ok(request) => {
                if let Some(deadline) = self.last_dialed.load_full() {
                    deadline.refresh(self.timeout);
                }
                match time::timeout(self.timeout, self.client.request(request)).await {
                    Ok(Ok(res)) => {
                        let (parts, body) = res.into_parts();
                        Response::from_parts(parts, Body::new(body))
                    }
                    Ok(Err(e)) if is_timeout(&e) => {
                        self.log.error(format_args!("{} Upstream Timeout error: {}", ctx.id(), e));
                        ctx.set_stage_status(StageStatus::Failed);
                        gateway_timeout()
                    }
                    Ok(Err(e)) => {
                        self.log.error(format_args!("{} Upstream error: {}", ctx.id(), e));
                        ctx.set_stage_status(StageStatus::Failed);
                        bad_gateway()
                    }
                    Err(elapsed) => {
                        self.log.error(format_args!("{} Upstream Timeout error: {}", ctx.id(), elapsed));
                        ctx.set_stage_status(StageStatus::Failed);
                        gateway_timeout()
                    }
                }
            }
            Err(e) => {
                self.log.error(format_args!("{} Upstream error: {}", ctx.id(), e));
                ctx.set_stage_status(StageStatus::Failed);
                bad_gateway()
            }
        };

        let status = response.status().as_u16();
        self.log.debug(format_args!(
            "{} [{}] [{}] {} s={} Time={:.4}",
            ctx.id(),
            method,
            self.authority,
            ctx.request().uri(),
            status,
            before.elapsed().as_secs_f64()
        ));
        metrics::record_upstream(&self.authority, status);
        response
    }

    /// GET the ping path over the same connection pool. Only 200 counts as up.
    pub async fn check_liveness(&self) -> Liveness {
        let Some(path) = self.ping_path.as_deref() else {
            return Liveness::NotApplicable;
        };
        let url = format!("http://{}{}", self.authority, path);

        let request = match Request::get(url.as_str())
            .header(header::CONNECTION, "keep-alive")
            .body(Body::empty())
        {
            Ok(request) => request,
            Err(e) => {
                self.log.error(format_args!("Failed Ping to {}: {}", url, e));
                return Liveness::Down;
            }
        };

        if let Some(deadline) = self.last_dialed.load_full() {
            deadline.refresh(self.timeout);
        }
        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(res)) if res.status() == StatusCode::OK => Liveness::Up,
            Ok(Ok(res)) => {
                self.log.error(format_args!("Failed Ping to {}: status {}", url, res.status()));
                Liveness::Down
            }
            Ok(Err(e)) => {
                self.log.error(format_args!("Failed Ping to {}: {}", url, e));
                Liveness::Down
            }
            Err(e) => {
                self.log.error(format_args!("Failed Ping to {}: {}", url, e));
                Liveness::Down
            }
        }
    }
}

#[async_trait]
impl RequestStage for UpstreamConnector {
    async fn filter_request(&self, ctx: &mut RequestContext) -> Option<Response<Body>> {
        Some(self.forward(ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::{LogLevel, MemoryLogger};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn pool() -> Arc<BufferPool> {
        Arc::new(BufferPool::new(4, 1024))
    }

    /// Backend answering every request with a fixed HTTP/1.1 response.
    async fn canned_backend(response: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    fn connector(addr: SocketAddr, log: Arc<MemoryLogger>) -> UpstreamConnector {
        let config = UpstreamConfig::new("app", addr.ip().to_string(), addr.port());
        UpstreamConnector::new(config, pool(), log)
    }

    fn ctx(uri: &str) -> RequestContext {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        RequestContext::with_id("req-1", req)
    }

    #[tokio::test]
    async fn test_forward_passes_response_through() {
        let addr = canned_backend("HTTP/1.1 201 Created\r\nContent-Length: 2\r\nX-Backend: yes\r\n\r\nok").await;
        let log = Arc::new(MemoryLogger::new());
        let upstream = connector(addr, log.clone());

        let mut ctx = ctx("/items?id=7");
        let res = upstream.forward(&mut ctx).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()["x-backend"], "yes");
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");

        assert_eq!(ctx.request().uri().scheme_str(), Some("http"));
        assert_eq!(ctx.request().uri().path_and_query().unwrap().as_str(), "/items?id=7");
        let debug = log.messages_at(LogLevel::Debug);
        assert!(debug.iter().any(|m| m.starts_with("req-1 [GET]") && m.contains("s=201")));
    }

    fn dials(log: &MemoryLogger) -> usize {
        log.messages_at(LogLevel::Fine)
            .into_iter()
            .filter(|m| m.starts_with("Dialing"))
            .count()
    }

    #[tokio::test]
    async fn test_connections_are_reused() {
        let addr = canned_backend("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        let log = Arc::new(MemoryLogger::new());
        let upstream = connector(addr, log.clone());

        let res = upstream.forward(&mut ctx("/")).await;
        axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(dials(&log), 1);

        // hyper hands the connection back to its pool on a spawned task
        let mut reused = false;
        for _ in 0..50 {
            time::sleep(Duration::from_millis(10)).await;
            let before = dials(&log);
            let res = upstream.forward(&mut ctx("/")).await;
            assert_eq!(res.status(), StatusCode::OK);
            axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            if dials(&log) == before {
                reused = true;
                break;
            }
        }
        assert!(reused);
    }

    #[tokio::test]
    async fn test_force_http_rewrites_absolute_uri() {
        let addr = canned_backend("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        let mut config = UpstreamConfig::new("app", "127.0.0.1", addr.port());
        config.force_http = true;
        let upstream = UpstreamConnector::new(config, pool(), Arc::new(MemoryLogger::new()));

        let mut ctx = ctx("https://public.example/c?x=1");
        let res = upstream.forward(&mut ctx).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(ctx.request().uri().to_string(), format!("http://127.0.0.1:{}/c?x=1", addr.port()));
    }

    #[tokio::test]
    async fn test_absolute_uri_kept_without_force_http() {
        let addr = canned_backend("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        let upstream = connector(addr, Arc::new(MemoryLogger::new()));
        assert!(!upstream.force_http());

        let mut ctx = ctx("http://public.example/c?x=1");
        let res = upstream.forward(&mut ctx).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(ctx.request().uri().to_string(), "http://public.example/c?x=1");
    }

    #[tokio::test]
    async fn test_origin_form_uri_always_rewritten() {
        let addr = canned_backend("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        for force_http in [false, true] {
            let mut config = UpstreamConfig::new("app", "127.0.0.1", addr.port());
            config.force_http = force_http;
            let upstream = UpstreamConnector::new(config, pool(), Arc::new(MemoryLogger::new()));

            let mut ctx = ctx("/c");
            let res = upstream.forward(&mut ctx).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(ctx.request().uri().to_string(), format!("http://127.0.0.1:{}/c", addr.port()));
            assert_eq!(ctx.request().headers()[header::CONNECTION], "keep-alive");
        }
    }

    #[tokio::test]
    async fn test_refused_connection_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let log = Arc::new(MemoryLogger::new());
        let upstream = connector(addr, log.clone());
        let mut ctx = ctx("/");
        ctx.begin_stage(crate::pipeline::Phase::PreResponse, "UpstreamConnector");
        let res = upstream.forward(&mut ctx).await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ctx.stages()[0].status(), StageStatus::Failed);
        assert!(log.messages_at(LogLevel::Error).iter().any(|m| m.starts_with("req-1 Upstream error")));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_bad_gateway() {
        let log = Arc::new(MemoryLogger::new());
        let config = UpstreamConfig::new("ghost", "no-such-host.invalid", 80);
        let upstream = UpstreamConnector::new(config, pool(), log.clone());
        assert!(upstream.address().is_none());
        assert!(log.messages_at(LogLevel::Warn)[0].starts_with("Can't get IP addr for no-such-host.invalid:80"));

        let res = upstream.forward(&mut ctx("/")).await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_hanging_backend_is_gateway_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_secs(10)).await;
        });

        let log = Arc::new(MemoryLogger::new());
        let mut config = UpstreamConfig::new("slow", "127.0.0.1", addr.port());
        config.timeout_secs = 1;
        let upstream = UpstreamConnector::new(config, pool(), log.clone());

        let mut ctx = ctx("/");
        ctx.begin_stage(crate::pipeline::Phase::PreResponse, "UpstreamConnector");
        let res = upstream.forward(&mut ctx).await;
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ctx.stages()[0].status(), StageStatus::Failed);
        assert!(log
            .messages_at(LogLevel::Error)
            .iter()
            .any(|m| m.starts_with("req-1 Upstream Timeout error")));
    }

    #[tokio::test]
    async fn test_liveness() {
        let up = canned_backend("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        let sick = canned_backend("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n").await;
        let log = Arc::new(MemoryLogger::new());

        let mut config = UpstreamConfig::new("up", "127.0.0.1", up.port());
        config.ping_path = Some("/ping".to_string());
        assert_eq!(UpstreamConnector::new(config, pool(), log.clone()).check_liveness().await, Liveness::Up);

        let mut config = UpstreamConfig::new("sick", "127.0.0.1", sick.port());
        config.ping_path = Some("/ping".to_string());
        assert_eq!(UpstreamConnector::new(config, pool(), log.clone()).check_liveness().await, Liveness::Down);
        assert!(log.messages_at(LogLevel::Error)[0].starts_with("Failed Ping to"));

        let config = UpstreamConfig::new("none", "127.0.0.1", up.port());
        assert_eq!(
            UpstreamConnector::new(config, pool(), log).check_liveness().await,
            Liveness::NotApplicable
        );
    }

    #[tokio::test]
    async fn test_liveness_refreshes_tracked_deadline() {
        let addr = canned_backend("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        let mut config = UpstreamConfig::new("app", "127.0.0.1", addr.port());
        config.ping_path = Some("/ping".to_string());
        let upstream = UpstreamConnector::new(config, pool(), Arc::new(MemoryLogger::new()));

        let res = upstream.forward(&mut ctx("/")).await;
        axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let tracked = upstream.last_dialed.load_full().unwrap();
        let dialed_at = tracked.at();

        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(upstream.check_liveness().await, Liveness::Up);
        assert!(tracked.at() > dialed_at);
    }

    #[test]
    fn test_is_timeout_walks_sources() {
        #[derive(Debug, thiserror::Error)]
        #[error("wrapped")]
        struct Wrapped(#[source] io::Error);

        assert!(is_timeout(&Wrapped(io::Error::new(io::ErrorKind::TimedOut, "slow"))));
        assert!(!is_timeout(&Wrapped(io::Error::new(io::ErrorKind::ConnectionRefused, "no"))));
    }

    #[tokio::test]
    async fn test_set_pool_size() {
        let mut upstream = UpstreamConnector::new(
            UpstreamConfig::new("app", "127.0.0.1", 9),
            pool(),
            Arc::new(MemoryLogger::new()),
        );
        assert_eq!(upstream.max_idle_per_host(), 15);
        upstream.set_pool_size(2);
        assert_eq!(upstream.max_idle_per_host(), 2);
    }
}
