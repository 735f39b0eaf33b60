//! Accept loop driven by a scripted connection source.

mod common;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use geoingest::ingress_queue::build_ingress_queue;
use geoingest::listener::{Acceptor, Incoming};
use geoingest::store::MemoryStore;
use geoingest::worker_pool::WorkerPool;

type Accepted = io::Result<(DuplexStream, SocketAddr)>;

/// Yields whatever the test pushes; parks forever once the script runs out.
struct ScriptedIncoming {
    script: mpsc::UnboundedReceiver<Accepted>,
}

#[async_trait]
impl Incoming for ScriptedIncoming {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> Accepted {
        match self.script.recv().await {
            Some(next) => next,
            None => std::future::pending().await,
        }
    }
}

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

async fn request(stream: DuplexStream, line: &str) -> String {
    let (read_half, mut write_half) = tokio::io::split(stream);
    write_half.write_all(line.as_bytes()).await.unwrap();
    let mut reader = BufReader::new(read_half);
    let mut reply = String::new();
    tokio::time::timeout(common::REPLY_TIMEOUT, reader.read_line(&mut reply))
        .await
        .expect("reply timed out")
        .unwrap();
    reply
}

#[tokio::test]
async fn accept_faults_are_skipped_and_later_connections_served() {
    let store = Arc::new(MemoryStore::new());
    let (queue, consumer) = build_ingress_queue(4);
    let pool = WorkerPool::spawn(2, consumer, store.clone());

    let (script, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let handlers = TaskTracker::new();
    let acceptor = tokio::spawn(
        Acceptor {
            listener: ScriptedIncoming { script: rx },
            queue: queue.clone(),
            handlers: handlers.clone(),
            shutdown: shutdown.clone(),
        }
        .run(),
    );

    script.send(Err(io::Error::other("too many open files"))).unwrap();
    script
        .send(Err(io::Error::from(io::ErrorKind::ConnectionAborted)))
        .unwrap();
    let (client, server) = tokio::io::duplex(4096);
    script.send(Ok((server, peer()))).unwrap();

    assert_eq!(request(client, "AFTER-FAULT, 1, 2, 3, 4\n").await, "OK\n");
    assert_eq!(store.rows()[0].record.device_id(), "AFTER-FAULT");
    assert!(!acceptor.is_finished());

    shutdown.cancel();
    tokio::time::timeout(common::REPLY_TIMEOUT, acceptor)
        .await
        .expect("acceptor should stop")
        .unwrap();
    handlers.close();
    handlers.wait().await;
    queue.close();
    assert_eq!(pool.join().await, 1);
}
