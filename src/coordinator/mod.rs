//! Redis Sentinel client.
//!
//! # Responsibilities
//! - Maintain long-lived query and subscription connections with
//!   failover across the endpoint group
//! - Deliver pub/sub events to registered handlers
//! - Query primary/replica topology per cluster

pub mod topology;
pub mod watch;

/// Sentinel publishes this when a failover promotes a new primary.
pub const CHANNEL_SWITCH_MASTER: &str = "+switch-master";

/// Sentinel publishes these when the replica set of a cluster changes.
pub const CHANNEL_REPLICA_UP: &str = "+slave";
pub const CHANNEL_REPLICA_DOWN: &str = "-slave";

use thiserror::Error;

/// Errors raised by Sentinel queries. Always scoped to one cluster;
/// a failing cluster never aborts its siblings.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("sentinel query failed: {0}")]
    QueryFailed(#[from] redis::RedisError),

    #[error("cluster '{0}' is not monitored by this sentinel")]
    UnknownCluster(String),

    #[error("malformed sentinel reply: {0}")]
    MalformedReply(String),
}
