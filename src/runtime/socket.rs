//! Runtime socket transport.
//!
//! # Responsibilities
//! - Send a single command line to HAProxy's runtime socket
//! - Accumulate the response until the peer closes the stream
//! - Retry connection-level failures with exponential backoff
//!
//! # Design Decisions
//! - One TCP connection per command; the socket is command/response
//! - Protocol-level error strings are part of the response text, not
//!   an error (the runtime API has no structured error channel)
//! - The backoff schedule is a fixed contract: 2000 ms initial,
//!   doubled per attempt, 5 retries (6 attempts total)

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::runtime::RuntimeError;

/// Initial delay before the first retry.
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Maximum number of retries after the first attempt.
pub const MAX_RETRIES: u32 = 5;

/// Client for HAProxy's TCP runtime socket.
#[derive(Debug, Clone)]
pub struct RuntimeSocket {
    addr: String,
    initial_delay: Duration,
    max_retries: u32,
}

impl RuntimeSocket {
    /// Create a client with the contractual retry schedule.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_retry_policy(addr, INITIAL_RETRY_DELAY, MAX_RETRIES)
    }

    /// Create a client with a custom retry schedule (tests).
    pub fn with_retry_policy(
        addr: impl Into<String>,
        initial_delay: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            addr: addr.into(),
            initial_delay,
            max_retries,
        }
    }

    /// Send one command line and return the accumulated response.
    ///
    /// `command` must be a single protocol line without an embedded
    /// newline; the terminator is appended here.
    pub async fn send(&self, command: &str) -> Result<String, RuntimeError> {
        let mut delay = self.initial_delay;
        let mut attempts = 0u32;

        loop {
            match self.exchange(command).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    attempts += 1;
                    if attempts > self.max_retries {
                        tracing::error!(
                            addr = %self.addr,
                            attempts,
                            error = %err,
                            "haproxy runtime socket unreachable, giving up"
                        );
                        return Err(RuntimeError::RuntimeUnavailable {
                            attempts,
                            source: err,
                        });
                    }
                    tracing::warn!(
                        addr = %self.addr,
                        attempt = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "haproxy runtime socket error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn exchange(&self, command: &str) -> std::io::Result<String> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(command.as_bytes()).await?;
        stream.write_all(b"\n").await?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;

        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}
