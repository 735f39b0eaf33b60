//! Per-connection handler.
//!
//! One line is carried all the way to the store and answered before the
//! next line is read, so each connection has at most one request in flight
//! and its replies come back in request order.

use std::io;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader, ReadHalf, WriteHalf,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::constants::{LINE_TERMINATOR, MAX_LINE_LEN};
use crate::error::{ConnectionFault, MalformedRecord};
use crate::ingress_queue::IngressProducer;
use crate::metrics;
use crate::protocol::Response;
use crate::request_flow;
use crate::response_flow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Reading,
    Decoding,
    Enqueuing,
    AwaitingStoreResult,
    Responding,
    Closed,
}

#[derive(Debug)]
pub enum CloseReason {
    /// EOF, including a trailing partial line.
    PeerClosed,
    /// Server shutdown reached the handler while it was idle in `Reading`.
    Shutdown,
    /// A line over `MAX_LINE_LEN`; the stream cannot be resynchronised.
    LineTooLong,
    Fault(ConnectionFault),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub lines: u64,
    pub stored: u64,
    pub failed: u64,
    pub malformed: u64,
}

#[derive(Debug)]
pub struct ConnectionSummary {
    pub stats: ConnectionStats,
    pub reason: CloseReason,
}

enum LineRead {
    Line,
    Eof,
    TooLong,
}

pub struct ConnectionHandler<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    queue: IngressProducer,
    shutdown: CancellationToken,
    state: ConnectionState,
    line: Vec<u8>,
    scratch: Vec<u8>,
    stats: ConnectionStats,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S, queue: IngressProducer, shutdown: CancellationToken) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer,
            queue,
            shutdown,
            state: ConnectionState::Reading,
            line: Vec::with_capacity(128),
            scratch: Vec::with_capacity(128),
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Serve the connection until the peer leaves, a socket error occurs or
    /// shutdown is requested. The stream is dropped exactly once, on return.
    pub async fn run(mut self) -> ConnectionSummary {
        let reason = loop {
            self.transition(ConnectionState::Reading);
            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,
                read = read_line(&mut self.reader, &mut self.line) => read,
            };
            match read {
                Ok(LineRead::Line) => {}
                Ok(LineRead::Eof) => break CloseReason::PeerClosed,
                Ok(LineRead::TooLong) => {
                    metrics::inc_malformed_lines();
                    self.stats.malformed += 1;
                    let err = MalformedRecord::LineTooLong {
                        limit: MAX_LINE_LEN,
                    };
                    if let Err(fault) = self.respond(&Response::from(&err)).await {
                        break CloseReason::Fault(fault);
                    }
                    break CloseReason::LineTooLong;
                }
                Err(err) => break CloseReason::Fault(ConnectionFault::Read(err)),
            }
            self.stats.lines += 1;

            self.transition(ConnectionState::Decoding);
            let response = match request_flow::decode(&self.line) {
                Err(err) => {
                    self.stats.malformed += 1;
                    debug!(error = %err, "rejected malformed line");
                    Response::from(&err)
                }
                Ok(record) => {
                    self.transition(ConnectionState::Enqueuing);
                    let completion = match request_flow::submit(record, &self.queue).await {
                        Ok(completion) => completion,
                        Err(fault) => {
                            let reply = Response::Error("server shutting down".into());
                            if let Err(write_fault) = self.respond(&reply).await {
                                debug!(error = %write_fault, "failed to send shutdown reply");
                            }
                            break CloseReason::Fault(fault);
                        }
                    };

                    self.transition(ConnectionState::AwaitingStoreResult);
                    let response = completion.wait().await;
                    match response {
                        Response::Ok => self.stats.stored += 1,
                        Response::Error(_) => self.stats.failed += 1,
                    }
                    response
                }
            };

            self.transition(ConnectionState::Responding);
            if let Err(fault) = self.respond(&response).await {
                break CloseReason::Fault(fault);
            }
        };

        self.transition(ConnectionState::Closed);
        ConnectionSummary {
            stats: self.stats,
            reason,
        }
    }

    async fn respond(&mut self, response: &Response) -> Result<(), ConnectionFault> {
        response_flow::send_response(&mut self.writer, &mut self.scratch, response).await
    }

    fn transition(&mut self, next: ConnectionState) {
        trace!(from = ?self.state, to = ?next, "connection state");
        self.state = next;
    }
}

/// Read one `\n`-terminated line into `line`, capped at `MAX_LINE_LEN` bytes.
async fn read_line<R>(reader: &mut BufReader<R>, line: &mut Vec<u8>) -> io::Result<LineRead>
where
    R: AsyncRead + Unpin,
{
    line.clear();
    let n = reader
        .take(MAX_LINE_LEN as u64)
        .read_until(LINE_TERMINATOR, line)
        .await?;

    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if line.last() == Some(&LINE_TERMINATOR) {
        return Ok(LineRead::Line);
    }
    if n >= MAX_LINE_LEN {
        Ok(LineRead::TooLong)
    } else {
        Ok(LineRead::Eof)
    }
}
