//! # wirecall-server
//!
//! TCP server for wirecall.
//!
//! This crate provides:
//! - The per-connection protocol state machine: handshake, concurrent
//!   request dispatch, drain-before-close teardown
//! - The `Service` capability (the method-resolver seam) with an echo stub
//!   and a name-to-handler registry
//! - A TCP accept loop with connection limits and graceful shutdown
//! - File/environment configuration

pub mod config;
pub mod connection;
pub mod error;
pub mod server;
pub mod service;

pub use config::{Config, ConfigError, NetworkConfig};
pub use connection::serve_connection;
pub use error::ServerError;
pub use server::{Server, ServerConfig, ServerStats};
pub use service::{EchoService, Service, ServiceError, ServiceMap};
