//! GitOps daemon library
//!
//! Wires the provisioning engine into a long-running service:
//! - Layered configuration (defaults, file, environment)
//! - Storage backend selection
//! - One scheduler per resource kind, with graceful shutdown

pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use server::Server;
