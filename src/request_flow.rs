//! Request path: line in → decode → enqueue → wait for the worker's outcome.
//!
//! Split out of the connection handler so tests and benchmarks can drive it
//! without sockets.

use tokio::sync::oneshot;

use crate::error::{ConnectionFault, MalformedRecord};
use crate::ingress_queue::IngressProducer;
use crate::metrics;
use crate::protocol::{self, Response};
use crate::types::{PendingRequest, Record, StoreOutcome};

/// Handle on one enqueued request.
pub struct Completion {
    rx: oneshot::Receiver<StoreOutcome>,
}

impl Completion {
    /// Wait until a worker reports the store outcome.
    pub async fn wait(self) -> Response {
        match self.rx.await {
            Ok(Ok(())) => Response::Ok,
            Ok(Err(err)) => Response::from(err),
            // Worker dropped the request without answering (it panicked).
            Err(_) => Response::Error("request aborted before it was stored".into()),
        }
    }
}

pub fn decode(line: &[u8]) -> Result<Record, MalformedRecord> {
    protocol::decode_line(line).inspect_err(|_| metrics::inc_malformed_lines())
}

/// Wrap a record into a pending request and push it onto the ingress queue.
/// Waits while the queue is full.
pub async fn submit(record: Record, queue: &IngressProducer) -> Result<Completion, ConnectionFault> {
    let (request, rx) = PendingRequest::new(record);
    queue.enqueue(request).await?;
    Ok(Completion { rx })
}

/// Run one line through the whole request path and produce its reply.
/// Malformed lines are answered without touching the queue.
pub async fn process_line(line: &[u8], queue: &IngressProducer) -> Result<Response, ConnectionFault> {
    match decode(line) {
        Ok(record) => Ok(submit(record, queue).await?.wait().await),
        Err(err) => Ok(Response::from(&err)),
    }
}
