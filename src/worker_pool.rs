use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info_span, warn};

use crate::error::PersistenceError;
use crate::ingress_queue::IngressConsumer;
use crate::metrics;
use crate::store::StoreGateway;
use crate::types::{PendingRequest, StoreOutcome};

/// Dispatch worker: dequeues pending requests, persists them through the
/// store gateway and answers each request's completion handle.
///
/// Workers are interchangeable; any worker may serve any connection.
pub struct DispatchWorker {
    pub id: usize,
    pub queue: IngressConsumer,
    pub store: Arc<dyn StoreGateway>,
}

impl DispatchWorker {
    /// Run until the queue is closed and drained. Returns the number of
    /// requests this worker persisted (successfully or not).
    pub async fn run(self) -> u64 {
        let span = info_span!("worker", id = self.id);
        async move {
            let mut processed = 0u64;
            while let Some(request) = self.queue.dequeue().await {
                self.process(request).await;
                processed += 1;
            }
            debug!(processed, "ingress queue closed, worker exiting");
            processed
        }
        .instrument(span)
        .await
    }

    /// Store one request and deliver its outcome. A store failure, panics
    /// included, is reported to the originating connection only.
    pub async fn process(&self, request: PendingRequest) {
        let outcome = self.store_guarded(&request).await;
        match &outcome {
            Ok(()) => metrics::inc_store_ok(),
            Err(err) => {
                metrics::inc_store_failed();
                warn!(device_id = request.record.device_id(), error = %err, "failed to persist record");
            }
        }

        // The write already happened; a vanished connection only loses the reply.
        if !request.complete(outcome) {
            debug!("connection gone before outcome was delivered");
        }
    }

    async fn store_guarded(&self, request: &PendingRequest) -> StoreOutcome {
        AssertUnwindSafe(self.store.store(&request.record))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(PersistenceError::new(format!(
                    "store panicked: {}",
                    panic_message(panic.as_ref())
                )))
            })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Fixed-size set of dispatch workers sharing one queue and one store.
pub struct WorkerPool {
    workers: JoinSet<u64>,
    size: usize,
    // Held so the queue only closes through `IngressProducer::close`.
    queue: IngressConsumer,
}

impl WorkerPool {
    pub fn spawn(size: usize, queue: IngressConsumer, store: Arc<dyn StoreGateway>) -> Self {
        let mut workers = JoinSet::new();
        for id in 0..size {
            let worker = DispatchWorker {
                id,
                queue: queue.clone(),
                store: Arc::clone(&store),
            };
            workers.spawn(worker.run());
        }
        Self {
            workers,
            size,
            queue,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for every worker to exit. Only returns once the queue has been
    /// closed. Returns the total number of requests processed.
    pub async fn join(mut self) -> u64 {
        let mut total = 0;
        while let Some(result) = self.workers.join_next().await {
            match result {
                Ok(processed) => total += processed,
                Err(err) => warn!(error = %err, "dispatch worker failed"),
            }
        }

        let stranded = self.queue.len();
        if stranded > 0 {
            warn!(stranded, "workers exited with requests still queued");
        }
        total
    }
}
