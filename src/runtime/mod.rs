//! HAProxy runtime API client.
//!
//! # Responsibilities
//! - One-shot command exchanges with the runtime socket, with retry
//! - Backend membership and server state operations

pub mod backend;
pub mod socket;

use thiserror::Error;

/// Errors raised by runtime-socket operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime socket stayed unreachable through the retry ceiling.
    /// Fatal to the single command, not to the process.
    #[error("haproxy runtime socket unavailable after {attempts} attempts: {source}")]
    RuntimeUnavailable {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Forward DNS resolution for a server host produced no address.
    #[error("dns resolution failed for '{host}'")]
    DnsResolutionFailed {
        host: String,
        #[source]
        source: Option<std::io::Error>,
    },
}
