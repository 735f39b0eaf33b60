use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::{ACCEPT_BACKOFF, LISTEN_BACKLOG, ServerConfig};
use crate::connection::{CloseReason, ConnectionHandler};
use crate::error::ServerError;
use crate::ingress_queue::IngressProducer;
use crate::metrics;

/// Bind the listening socket. Must be called from inside a tokio runtime.
pub fn create_listener(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr = config.listen_addr;
    let bind_err = |source: std::io::Error| ServerError::Bind { addr, source };

    let socket =
        Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    #[cfg(unix)]
    if config.reuse_port {
        socket.set_reuse_port(true).map_err(bind_err)?;
    }
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.set_nodelay(true).map_err(bind_err)?;

    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

    TcpListener::from_std(socket.into()).map_err(bind_err)
}

/// Source of accepted connections for the [`Acceptor`].
#[async_trait]
pub trait Incoming: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Incoming for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "failed to set TCP_NODELAY");
        }
        Ok((stream, peer))
    }
}

/// Accept loop: one tracked handler task per accepted connection.
pub struct Acceptor<L> {
    pub listener: L,
    pub queue: IngressProducer,
    pub handlers: TaskTracker,
    pub shutdown: CancellationToken,
}

impl<L: Incoming> Acceptor<L> {
    /// Accept until shutdown. Accept errors are logged and retried after a
    /// short pause; they never stop the loop.
    pub async fn run(mut self) {
        let mut next_conn_id = 0u64;
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    metrics::inc_connections_accepted();
                    next_conn_id += 1;
                    let span = info_span!("connection", conn_id = next_conn_id, %peer);
                    self.handlers.spawn(
                        serve(stream, self.queue.clone(), self.shutdown.clone()).instrument(span),
                    );
                }
                Err(err) => {
                    metrics::inc_accept_faults();
                    warn!(error = %err, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        info!("acceptor stopped");
    }
}

async fn serve<S>(stream: S, queue: IngressProducer, shutdown: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    debug!("connection opened");

    let summary = ConnectionHandler::new(stream, queue, shutdown).run().await;
    metrics::inc_connections_closed();

    let stats = summary.stats;
    match summary.reason {
        CloseReason::Fault(fault) => debug!(
            error = %fault,
            lines = stats.lines,
            stored = stats.stored,
            failed = stats.failed,
            malformed = stats.malformed,
            "connection closed on fault"
        ),
        reason => debug!(
            ?reason,
            lines = stats.lines,
            stored = stats.stored,
            failed = stats.failed,
            malformed = stats.malformed,
            "connection closed"
        ),
    }
}
