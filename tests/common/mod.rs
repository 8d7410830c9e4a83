//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_tracker::config::TrackerConfig;
use http_tracker::store::MemoryStore;
use http_tracker::{CallRecord, HttpServer, Shutdown, StoreError, TrackingStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Canned upstream response.
#[derive(Clone)]
pub struct MockResponse {
    pub status: &'static str,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl MockResponse {
    pub fn new(content_type: Option<&'static str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: "200 OK",
            content_type,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// Hold the response back for `delay` after the request was read.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

/// Read one request and return its body. Only Content-Length bodies are
/// understood, which is all the proxy sends in these tests.
async fn read_request_body(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return Vec::new();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    buf[header_end..buf.len().min(header_end + length)].to_vec()
}

/// Start a mock upstream that answers every request with `response`.
/// Each received request body is sent on the returned channel.
pub async fn start_mock_upstream(
    response: MockResponse,
) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let response = response.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let body = read_request_body(&mut socket).await;
                        let _ = tx.send(body);
                        tokio::time::sleep(response.delay).await;

                        let content_type = response
                            .content_type
                            .map(|ct| format!("Content-Type: {}\r\n", ct))
                            .unwrap_or_default();
                        let head = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
                            response.status,
                            response.body.len(),
                            content_type
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&response.body).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

/// Start the tracking proxy in front of `upstream`.
pub async fn start_proxy(
    config: TrackerConfig,
    upstream: SocketAddr,
    store: Arc<dyn TrackingStore>,
) -> (SocketAddr, Shutdown) {
    let (addr, shutdown, _server) = spawn_proxy(config, upstream, store).await;
    (addr, shutdown)
}

/// Like [`start_proxy`], also returning the server task so a test can wait
/// for `run` to return.
pub async fn spawn_proxy(
    mut config: TrackerConfig,
    upstream: SocketAddr,
    store: Arc<dyn TrackingStore>,
) -> (SocketAddr, Shutdown, JoinHandle<std::io::Result<()>>) {
    config.upstream.address = upstream.to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, store).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    (addr, shutdown, handle)
}

/// Store that takes its time before handing records to a [`MemoryStore`].
pub struct SlowStore {
    pub records: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            records: MemoryStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl TrackingStore for SlowStore {
    async fn insert_record(&self, record: CallRecord) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.records.insert_record(record).await
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Records are stored after the response body has been streamed, so give the
/// finalizer task a moment.
pub async fn wait_for_records(store: &MemoryStore, count: usize) {
    for _ in 0..200 {
        if store.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} records, found {}", count, store.len());
}
