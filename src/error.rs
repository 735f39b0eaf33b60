use std::io;

use thiserror::Error;

use crate::constants::FIELD_COUNT;

/// Structural decode failure. Answered on the connection, never enqueued.
///
/// The `Display` text is what the peer sees after `ERROR: `.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("invalid data: expected {expected} fields, got {found}", expected = FIELD_COUNT)]
    FieldCount { found: usize },

    #[error("invalid data: line is not valid UTF-8")]
    Encoding,

    #[error("invalid data: line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// A store call failed. Delivered to the originating connection only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{cause}")]
pub struct PersistenceError {
    cause: String,
}

impl PersistenceError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }
}

/// Socket or queue failure that ends one connection handler.
#[derive(Error, Debug)]
pub enum ConnectionFault {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("ingress queue closed")]
    QueueClosed,
}

/// Startup failures. Nothing after a successful bind is fatal.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("store initialisation failed: {0}")]
    Store(String),
}
