//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use product_service::config::{AppConfig, RetryConfig};
use product_service::product::{InMemoryStore, ProductStore};
use product_service::{HttpServer, Shutdown};

/// A raw-TCP stand-in for the outbound dependency.
pub struct MockDependency {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
}

impl MockDependency {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Request heads received so far, lowercased.
    pub fn request_heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

/// Start a dependency that always answers `status` with `body`.
pub async fn start_mock_dependency(status: u16, body: &'static str) -> MockDependency {
    start_programmable_dependency(move |_| async move { (status, body.to_string()) }).await
}

/// Start a programmable dependency. `f` receives the 1-based hit number.
pub async fn start_programmable_dependency<F, Fut>(f: F) -> MockDependency
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let heads = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    {
        let hits = Arc::clone(&hits);
        let heads = Arc::clone(&heads);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let f = Arc::clone(&f);
                let hits = Arc::clone(&hits);
                let heads = Arc::clone(&heads);
                tokio::spawn(async move {
                    serve_one(socket, f, hits, heads).await;
                });
            }
        });
    }

    MockDependency { addr, hits, heads }
}

async fn serve_one<F, Fut>(
    mut socket: TcpStream,
    f: Arc<F>,
    hits: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
) where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    heads
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&buf).to_lowercase());

    let hit = hits.fetch_add(1, Ordering::SeqCst) + 1;
    let (status, body) = f(hit).await;
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Configuration pointing at `dependency_url` with fast retries.
pub fn test_config(dependency_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.dependency.base_url = dependency_url.to_string();
    config.retry = RetryConfig {
        max_retries: 2,
        min_delay_ms: 1,
        max_delay_ms: 5,
    };
    config.timeouts.request_ms = 2_000;
    config
}

pub fn memory_store() -> Arc<dyn ProductStore> {
    Arc::new(InMemoryStore::new("products"))
}

/// A server that is being served on a real socket.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Serve `config` on an ephemeral port.
pub async fn spawn_server(config: AppConfig) -> RunningServer {
    let server = HttpServer::new(config, memory_store(), None).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(listener, shutdown.clone()));

    // give the accept loop a moment to start
    tokio::time::sleep(Duration::from_millis(20)).await;
    RunningServer {
        addr,
        shutdown,
        task,
    }
}
