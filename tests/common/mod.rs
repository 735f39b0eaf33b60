#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Semaphore;

use geoingest::config::ServerConfig;
use geoingest::error::PersistenceError;
use geoingest::server::{IngestServer, RunningServer};
use geoingest::store::{MemoryStore, StoreGateway};
use geoingest::types::Record;

pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Rejects every record whose device id starts with `BAD`.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl StoreGateway for FailingStore {
    async fn store(&self, record: &Record) -> Result<(), PersistenceError> {
        if record.device_id().starts_with("BAD") {
            return Err(PersistenceError::new(format!(
                "rejected device {}",
                record.device_id()
            )));
        }
        self.inner.store(record).await
    }
}

/// Panics on every record whose device id is `PANIC`.
#[derive(Default)]
pub struct PanickingStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl StoreGateway for PanickingStore {
    async fn store(&self, record: &Record) -> Result<(), PersistenceError> {
        if record.device_id() == "PANIC" {
            panic!("driver blew up on {}", record.device_id());
        }
        self.inner.store(record).await
    }
}

/// Blocks every call until a permit is released, counting calls as they
/// arrive.
pub struct GatedStore {
    pub inner: MemoryStore,
    gate: Semaphore,
    calls: AtomicUsize,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreGateway for GatedStore {
    async fn store(&self, record: &Record) -> Result<(), PersistenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| PersistenceError::new("gate closed"))?;
        permit.forget();
        self.inner.store(record).await
    }
}

pub fn test_config(queue_capacity: usize, workers: usize) -> ServerConfig {
    ServerConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        queue_capacity,
        workers,
        reuse_port: false,
    }
}

pub async fn start_server(
    queue_capacity: usize,
    workers: usize,
    store: Arc<dyn StoreGateway>,
) -> RunningServer {
    IngestServer::bind(&test_config(queue_capacity, workers), store)
        .await
        .expect("server should bind")
}

/// Poll `cond` until it holds, panicking after a few seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + REPLY_TIMEOUT;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("write line");
    }

    /// Next reply line, or `None` on EOF.
    pub async fn reply(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("reply timed out")
            .expect("read reply");
        (n > 0).then_some(line)
    }

    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.reply().await.expect("reply before EOF")
    }
}
