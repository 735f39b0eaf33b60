//! Bounded FIFO between connection handlers and dispatch workers.
//!
//! Many producers, N consumers, each item received by exactly one consumer.
//! A full queue parks the enqueuing handler; nothing is dropped or reordered.

use async_channel::{Receiver, Sender, TrySendError};

use crate::error::ConnectionFault;
use crate::metrics;
use crate::types::PendingRequest;

/// Producer half, cloned into every connection handler.
#[derive(Clone)]
pub struct IngressProducer {
    tx: Sender<PendingRequest>,
}

impl IngressProducer {
    /// Push a request, waiting for space while the queue is full.
    ///
    /// Fails only once the queue has been closed for shutdown.
    pub async fn enqueue(&self, request: PendingRequest) -> Result<(), ConnectionFault> {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                metrics::inc_enqueue_stalls();
                self.tx
                    .send(request)
                    .await
                    .map_err(|_| ConnectionFault::QueueClosed)?;
            }
            Err(TrySendError::Closed(_)) => return Err(ConnectionFault::QueueClosed),
        }
        metrics::inc_records_enqueued();
        metrics::observe_queue_depth(self.tx.len());
        Ok(())
    }

    /// Stop accepting new items. Items already queued stay available to
    /// consumers. Returns false if the queue was already closed.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}

/// Consumer half, cloned into every dispatch worker.
#[derive(Clone)]
pub struct IngressConsumer {
    rx: Receiver<PendingRequest>,
}

impl IngressConsumer {
    /// Wait for the next request. `None` means the queue is closed and
    /// drained, and the caller should stop.
    pub async fn dequeue(&self) -> Option<PendingRequest> {
        let request = self.rx.recv().await.ok()?;
        metrics::observe_queue_depth(self.rx.len());
        Some(request)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Build a matched producer/consumer pair with a fixed capacity.
pub fn build_ingress_queue(capacity: usize) -> (IngressProducer, IngressConsumer) {
    let (tx, rx) = async_channel::bounded(capacity);
    (IngressProducer { tx }, IngressConsumer { rx })
}
