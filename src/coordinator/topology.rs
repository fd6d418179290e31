//! Cluster topology queries.
//!
//! # Responsibilities
//! - Ask Sentinel for the current primary and replica set per cluster
//! - Filter out replicas Sentinel flags as subjectively down
//!
//! # Design Decisions
//! - Topology is never cached; every call reads fresh state
//! - A failing cluster is logged and omitted, never aborting siblings

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::config::schema::Endpoint;
use crate::coordinator::CoordinatorError;

/// The topology Sentinel asserts for one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredTopology {
    pub name: String,
    pub primary: Endpoint,
    /// Non-failed replicas, in Sentinel's reported order.
    pub replicas: Vec<Endpoint>,
}

/// Source of desired topology, abstracted so engine tests can stub it.
#[async_trait]
pub trait TopologySource: Send {
    async fn fetch(&mut self, clusters: &[String]) -> Vec<DesiredTopology>;
}

/// `TopologySource` over a live Sentinel query connection.
pub struct SentinelTopology {
    conn: MultiplexedConnection,
}

impl SentinelTopology {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TopologySource for SentinelTopology {
    async fn fetch(&mut self, clusters: &[String]) -> Vec<DesiredTopology> {
        let mut result = Vec::with_capacity(clusters.len());
        for name in clusters {
            match fetch_cluster(&mut self.conn, name).await {
                Ok(topology) => result.push(topology),
                Err(err) => {
                    tracing::warn!(
                        cluster = %name,
                        error = %err,
                        "failed to fetch cluster topology from sentinel"
                    );
                }
            }
        }
        result
    }
}

async fn fetch_cluster(
    conn: &mut MultiplexedConnection,
    name: &str,
) -> Result<DesiredTopology, CoordinatorError> {
    let primary: Option<Vec<String>> = redis::cmd("SENTINEL")
        .arg("GET-MASTER-ADDR-BY-NAME")
        .arg(name)
        .query_async(conn)
        .await?;
    let primary = primary.ok_or_else(|| CoordinatorError::UnknownCluster(name.to_string()))?;
    let primary = parse_addr_pair(&primary)?;

    let raw_replicas: Vec<Vec<String>> = redis::cmd("SENTINEL")
        .arg("REPLICAS")
        .arg(name)
        .query_async(conn)
        .await?;
    let replicas = parse_replicas(&raw_replicas)?;

    tracing::debug!(
        cluster = name,
        primary = %primary,
        replicas = ?replicas.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "sentinel topology"
    );

    Ok(DesiredTopology {
        name: name.to_string(),
        primary,
        replicas,
    })
}

/// Parse the `[ip, port]` reply of GET-MASTER-ADDR-BY-NAME.
fn parse_addr_pair(reply: &[String]) -> Result<Endpoint, CoordinatorError> {
    let (Some(host), Some(port)) = (reply.first(), reply.get(1)) else {
        return Err(CoordinatorError::MalformedReply(format!(
            "address pair with {} fields",
            reply.len()
        )));
    };
    let port = port
        .parse::<u16>()
        .map_err(|_| CoordinatorError::MalformedReply(format!("port '{}'", port)))?;
    Ok(Endpoint::new(host.clone(), port))
}

/// Reassemble the flat key/value arrays of SENTINEL REPLICAS and keep
/// every replica not flagged `s_down`.
fn parse_replicas(raw: &[Vec<String>]) -> Result<Vec<Endpoint>, CoordinatorError> {
    let mut replicas = Vec::new();
    for fields in raw {
        let attrs = pairs_to_map(fields);
        let flags = attrs.get("flags").map(String::as_str).unwrap_or_default();
        if flags.split(',').any(|flag| flag == "s_down") {
            continue;
        }
        let (Some(ip), Some(port)) = (attrs.get("ip"), attrs.get("port")) else {
            return Err(CoordinatorError::MalformedReply(
                "replica entry without ip/port".to_string(),
            ));
        };
        let port = port
            .parse::<u16>()
            .map_err(|_| CoordinatorError::MalformedReply(format!("replica port '{}'", port)))?;
        replicas.push(Endpoint::new(ip.clone(), port));
    }
    Ok(replicas)
}

fn pairs_to_map(fields: &[String]) -> HashMap<&str, String> {
    fields
        .chunks_exact(2)
        .map(|pair| (pair[0].as_str(), pair[1].clone()))
        .collect()
}
