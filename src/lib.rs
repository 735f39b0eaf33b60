//! Library crate for geoingest: line codec, ingress queue, dispatch workers,
//! connection handler, store gateways and the server supervisor.
//!
//! The **binary** (`main.rs`) wires configuration, telemetry and the Postgres
//! store together. Everything it uses lives here so the pipeline can be
//! driven in-process by integration tests and benchmarks.

pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod ingress_queue;
pub mod listener;
pub mod metrics;
pub mod postgres;
pub mod protocol;
pub mod request_flow;
pub mod response_flow;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod worker_pool;
