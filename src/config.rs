//! Server sizing and operational configuration.
//!
//! Everything here is fixed at process start. Wire constants (field count,
//! line limits, response literals) live in `constants`.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::error::ServerError;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";

/// Ingress queue capacity (C). The only backpressure point in the pipeline.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Dispatch worker count (N).
pub const DEFAULT_WORKER_COUNT: usize = 5;

pub const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a failed accept before trying again (e.g. fd exhaustion).
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

const _: () = assert!(DEFAULT_QUEUE_CAPACITY >= 1, "queue capacity must be non-zero");
const _: () = assert!(DEFAULT_WORKER_COUNT >= 1, "worker count must be non-zero");

/// Pipeline sizing. Parsed by the server binary, built directly by tests.
#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long = "listen", env = "GEOINGEST_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    /// Ingress queue capacity (records awaiting persistence)
    #[arg(long, env = "GEOINGEST_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Number of dispatch workers talking to the store
    #[arg(long, env = "GEOINGEST_WORKERS", default_value_t = DEFAULT_WORKER_COUNT)]
    pub workers: usize,

    /// Set SO_REUSEPORT on the listening socket
    #[arg(long)]
    pub reuse_port: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKER_COUNT,
            reuse_port: false,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.queue_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.workers == 0 {
            return Err(ServerError::InvalidConfig(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    /// In-process store; rows are lost on exit
    Memory,
}

/// Connection parameters for the Postgres store gateway.
#[derive(Args, Debug, Clone)]
pub struct PostgresConfig {
    #[arg(long = "db-host", env = "GEOINGEST_DB_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long = "db-port", env = "GEOINGEST_DB_PORT", default_value_t = 5432)]
    pub port: u16,

    #[arg(long = "db-name", env = "GEOINGEST_DB_NAME", default_value = "testdb")]
    pub database: String,

    #[arg(long = "db-user", env = "GEOINGEST_DB_USER", default_value = "admin")]
    pub username: String,

    #[arg(long = "db-password", env = "GEOINGEST_DB_PASSWORD", default_value = "admin")]
    pub password: String,

    /// Max pooled connections; defaults to the worker count
    #[arg(long = "db-pool-size", env = "GEOINGEST_DB_POOL_SIZE")]
    pub max_pool_size: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.workers, 5);
        assert_eq!(config.listen_addr.port(), 5000);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ServerConfig {
            queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::InvalidConfig(_))));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = ServerConfig {
            workers: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::InvalidConfig(_))));
    }
}
