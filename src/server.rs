//! Supervisor: owns the acceptor, the connection handlers and the dispatch
//! workers, and tears them down in order.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ingress_queue::{IngressProducer, build_ingress_queue};
use crate::listener::{Acceptor, create_listener};
use crate::store::StoreGateway;
use crate::worker_pool::WorkerPool;

pub struct IngestServer;

impl IngestServer {
    /// Bind the listener, start the worker pool and the acceptor.
    pub async fn bind(
        config: &ServerConfig,
        store: Arc<dyn StoreGateway>,
    ) -> Result<RunningServer, ServerError> {
        config.validate()?;

        let listener = create_listener(config)?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: config.listen_addr,
            source,
        })?;

        let (queue, consumer) = build_ingress_queue(config.queue_capacity);
        let workers = WorkerPool::spawn(config.workers, consumer, store);

        let shutdown = CancellationToken::new();
        let handlers = TaskTracker::new();
        let acceptor = tokio::spawn(
            Acceptor {
                listener,
                queue: queue.clone(),
                handlers: handlers.clone(),
                shutdown: shutdown.clone(),
            }
            .run(),
        );

        info!(
            %local_addr,
            queue_capacity = config.queue_capacity,
            workers = config.workers,
            "ingest server listening"
        );

        Ok(RunningServer {
            local_addr,
            queue,
            shutdown,
            acceptor,
            handlers,
            workers,
        })
    }
}

pub struct RunningServer {
    local_addr: SocketAddr,
    queue: IngressProducer,
    shutdown: CancellationToken,
    acceptor: JoinHandle<()>,
    handlers: TaskTracker,
    workers: WorkerPool,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Requests currently waiting in the ingress queue.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn active_connections(&self) -> usize {
        self.handlers.len()
    }

    /// Token that starts shutdown when cancelled. `shutdown()` still has to
    /// be awaited to drain.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Orderly shutdown: stop accepting, let every handler finish its
    /// in-flight request, close the queue, then wait for the workers to
    /// drain it. Returns the number of requests the workers processed.
    pub async fn shutdown(self) -> u64 {
        self.shutdown.cancel();

        if let Err(err) = self.acceptor.await {
            warn!(error = %err, "acceptor task failed");
        }

        self.handlers.close();
        self.handlers.wait().await;
        info!("all connection handlers stopped");

        self.queue.close();
        let processed = self.workers.join().await;
        info!(processed, "dispatch workers stopped");
        processed
    }
}
