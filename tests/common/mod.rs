//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use stagegate::config::ProxyConfig;
use stagegate::lifecycle::{pipeline_from_config, Shutdown};
use stagegate::observability::MemoryLogger;
use stagegate::HttpServer;

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        201 => "201 Created",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Path of the first request line in `buf`, or "/".
fn request_path(buf: &[u8]) -> String {
    std::str::from_utf8(buf)
        .ok()
        .and_then(|text| text.lines().next())
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string()
}

async fn serve_connection<F, Fut>(mut socket: TcpStream, f: Arc<F>)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let mut buf = vec![0u8; 8192];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let (status, body) = f(request_path(&buf[..n])).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nX-Backend: mock\r\n\r\n{}",
            status_line(status),
            body.len(),
            body
        );
        if socket.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Start a programmable keep-alive backend. `f` receives the request path.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_connection(socket, f.clone()));
        }
    });
    addr
}

/// Start a keep-alive backend answering 200 with a fixed body.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_path| async move { (200, body.to_string()) }).await
}

/// Start a backend that accepts connections and never answers.
pub async fn start_hanging_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Build the pipeline for `config` and serve it on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let gateway = pipeline_from_config(&config, Arc::new(MemoryLogger::new())).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(gateway.engine);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
