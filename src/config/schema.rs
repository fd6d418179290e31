//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! bridge. All types derive Serde traits for deserialization from
//! config files. The configuration is loaded once at startup and is
//! immutable thereafter.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Root configuration for the bridge daemon.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Monitored cluster definitions. The cluster name doubles as the
    /// HAProxy backend name and the Sentinel master name.
    pub clusters: Vec<ClusterConfig>,

    /// Sentinel endpoint layout.
    pub coordinator: CoordinatorConfig,

    /// HAProxy runtime socket and supervision settings.
    pub runtime: RuntimeConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// One frontend/backend pair tracked by the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name; must match the Sentinel master name.
    pub name: String,

    /// Port the generated HAProxy frontend binds for this cluster.
    pub frontend_port: u16,
}

/// Sentinel endpoint configuration.
///
/// Exactly one of the two forms must be used: a single `endpoints`
/// list shared by every cluster, or per-cluster `groups`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Shared endpoint group for all clusters (`"host:port"` entries).
    pub endpoints: Vec<String>,

    /// Per-cluster endpoint groups; mutually exclusive with `endpoints`.
    pub groups: Vec<EndpointGroupConfig>,
}

/// A Sentinel endpoint group serving a subset of the clusters.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointGroupConfig {
    /// Cluster names served by this group.
    pub clusters: Vec<String>,

    /// Ordered Sentinel endpoints (`"host:port"` entries).
    pub endpoints: Vec<String>,
}

/// HAProxy runtime socket and supervision settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Address of HAProxy's TCP runtime socket.
    pub socket_address: String,

    /// Base haproxy.cfg template prepended to the generated stanzas.
    pub config_template: String,

    /// Where the generated configuration is written.
    pub config_path: String,

    /// HAProxy binary to spawn.
    pub haproxy_bin: String,

    /// Grace delay after spawning HAProxy before the first
    /// runtime-socket contact, in milliseconds.
    pub startup_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_address: "127.0.0.1:9999".to_string(),
            config_template: "/haproxy.cfg".to_string(),
            config_path: "/etc/haproxy/haproxy.cfg".to_string(),
            haproxy_bin: "haproxy".to_string(),
            startup_grace_ms: 1000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Lower the default log filter to debug.
    pub debug: bool,
}

/// A network address as a `(host, port)` pair.
///
/// Identity is the pair; used for Sentinel endpoints and backend
/// server addresses alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("'{}' is not of the form host:port", s))?;
        if host.is_empty() {
            return Err(format!("'{}' has an empty host", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("'{}' has an invalid port", s))?;
        Ok(Self::new(host, port))
    }
}

/// A resolved endpoint group: the clusters it serves and the ordered
/// Sentinel endpoints to rotate through.
#[derive(Debug, Clone)]
pub struct EndpointGroup {
    pub clusters: Vec<String>,
    pub endpoints: Vec<Endpoint>,
}

impl BridgeConfig {
    /// Resolve the coordinator layout into concrete endpoint groups.
    ///
    /// Assumes the configuration has passed validation; endpoint
    /// strings that fail to parse are skipped.
    pub fn endpoint_groups(&self) -> Vec<EndpointGroup> {
        let parse = |entries: &[String]| -> Vec<Endpoint> {
            entries.iter().filter_map(|e| e.parse().ok()).collect()
        };

        if !self.coordinator.endpoints.is_empty() {
            return vec![EndpointGroup {
                clusters: self.clusters.iter().map(|c| c.name.clone()).collect(),
                endpoints: parse(&self.coordinator.endpoints),
            }];
        }

        self.coordinator
            .groups
            .iter()
            .map(|g| EndpointGroup {
                clusters: g.clusters.clone(),
                endpoints: parse(&g.endpoints),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parsing() {
        let ep: Endpoint = "sentinel-1:26379".parse().unwrap();
        assert_eq!(ep.host, "sentinel-1");
        assert_eq!(ep.port, 26379);
        assert_eq!(ep.to_string(), "sentinel-1:26379");

        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":26379".parse::<Endpoint>().is_err());
        assert!("host:notaport".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_shared_endpoint_group() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [[clusters]]
            name = "cache"
            frontend_port = 6379

            [[clusters]]
            name = "sessions"
            frontend_port = 6380

            [coordinator]
            endpoints = ["s1:26379", "s2:26379"]
            "#,
        )
        .unwrap();

        let groups = config.endpoint_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].clusters, vec!["cache", "sessions"]);
        assert_eq!(groups[0].endpoints.len(), 2);
    }

    #[test]
    fn test_per_cluster_groups() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [[clusters]]
            name = "cache"
            frontend_port = 6379

            [[coordinator.groups]]
            clusters = ["cache"]
            endpoints = ["s1:26379"]
            "#,
        )
        .unwrap();

        let groups = config.endpoint_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].clusters, vec!["cache"]);
        assert_eq!(groups[0].endpoints, vec![Endpoint::new("s1", 26379)]);
    }
}
