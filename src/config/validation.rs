//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the endpoint layout is unambiguous (shared xor per-cluster)
//! - Validate addresses and ports
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before anything connects; a failure terminates the process

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{BridgeConfig, Endpoint};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no clusters configured")]
    NoClusters,

    #[error("cluster name must not be empty")]
    EmptyClusterName,

    #[error("duplicate cluster name '{0}'")]
    DuplicateCluster(String),

    #[error("cluster '{0}' has frontend port 0")]
    InvalidFrontendPort(String),

    #[error("no sentinel endpoints configured")]
    NoEndpoints,

    #[error("both a shared endpoint list and per-cluster groups are configured")]
    AmbiguousEndpointLayout,

    #[error("invalid sentinel endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("endpoint group references unknown cluster '{0}'")]
    UnknownCluster(String),

    #[error("cluster '{0}' is covered by more than one endpoint group")]
    ClusterCoveredTwice(String),

    #[error("cluster '{0}' is not covered by any endpoint group")]
    ClusterUncovered(String),

    #[error("endpoint group for {0:?} has no endpoints")]
    EmptyGroup(Vec<String>),

    #[error("invalid runtime socket address: {0}")]
    InvalidSocketAddress(String),
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.clusters.is_empty() {
        errors.push(ValidationError::NoClusters);
    }

    let mut names = HashSet::new();
    for cluster in &config.clusters {
        if cluster.name.is_empty() {
            errors.push(ValidationError::EmptyClusterName);
        } else if !names.insert(cluster.name.as_str()) {
            errors.push(ValidationError::DuplicateCluster(cluster.name.clone()));
        }
        if cluster.frontend_port == 0 {
            errors.push(ValidationError::InvalidFrontendPort(cluster.name.clone()));
        }
    }

    validate_endpoints(config, &names, &mut errors);

    if config
        .runtime
        .socket_address
        .parse::<Endpoint>()
        .is_err()
    {
        errors.push(ValidationError::InvalidSocketAddress(
            config.runtime.socket_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_endpoints(
    config: &BridgeConfig,
    known_clusters: &HashSet<&str>,
    errors: &mut Vec<ValidationError>,
) {
    let shared = &config.coordinator.endpoints;
    let groups = &config.coordinator.groups;

    if shared.is_empty() && groups.is_empty() {
        errors.push(ValidationError::NoEndpoints);
        return;
    }
    if !shared.is_empty() && !groups.is_empty() {
        errors.push(ValidationError::AmbiguousEndpointLayout);
        return;
    }

    let check_addrs = |entries: &[String], errors: &mut Vec<ValidationError>| {
        for entry in entries {
            if entry.parse::<Endpoint>().is_err() {
                errors.push(ValidationError::InvalidEndpoint(entry.clone()));
            }
        }
    };

    if !shared.is_empty() {
        check_addrs(shared, errors);
        return;
    }

    let mut covered = HashSet::new();
    for group in groups {
        if group.endpoints.is_empty() {
            errors.push(ValidationError::EmptyGroup(group.clusters.clone()));
        }
        check_addrs(&group.endpoints, errors);
        for name in &group.clusters {
            if !known_clusters.contains(name.as_str()) {
                errors.push(ValidationError::UnknownCluster(name.clone()));
            } else if !covered.insert(name.as_str()) {
                errors.push(ValidationError::ClusterCoveredTwice(name.clone()));
            }
        }
    }
    for name in known_clusters {
        if !covered.contains(name) {
            errors.push(ValidationError::ClusterUncovered(name.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ClusterConfig, EndpointGroupConfig};

    fn base_config() -> BridgeConfig {
        BridgeConfig {
            clusters: vec![ClusterConfig {
                name: "cache".into(),
                frontend_port: 6379,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_shared_layout() {
        let mut config = base_config();
        config.coordinator.endpoints = vec!["s1:26379".into()];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_everything() {
        let errors = validate_config(&BridgeConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::NoClusters));
        assert!(errors.contains(&ValidationError::NoEndpoints));
    }

    #[test]
    fn test_ambiguous_layout() {
        let mut config = base_config();
        config.coordinator.endpoints = vec!["s1:26379".into()];
        config.coordinator.groups = vec![EndpointGroupConfig {
            clusters: vec!["cache".into()],
            endpoints: vec!["s2:26379".into()],
        }];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::AmbiguousEndpointLayout]);
    }

    #[test]
    fn test_group_coverage() {
        let mut config = base_config();
        config.clusters.push(ClusterConfig {
            name: "sessions".into(),
            frontend_port: 6380,
        });
        config.coordinator.groups = vec![
            EndpointGroupConfig {
                clusters: vec!["cache".into(), "ghost".into()],
                endpoints: vec!["s1:26379".into()],
            },
            EndpointGroupConfig {
                clusters: vec!["cache".into()],
                endpoints: vec!["s2:26379".into()],
            },
        ];
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownCluster("ghost".into())));
        assert!(errors.contains(&ValidationError::ClusterCoveredTwice("cache".into())));
        assert!(errors.contains(&ValidationError::ClusterUncovered("sessions".into())));
    }

    #[test]
    fn test_bad_addresses() {
        let mut config = base_config();
        config.coordinator.endpoints = vec!["not-an-endpoint".into()];
        config.runtime.socket_address = "nope".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidEndpoint("not-an-endpoint".into())));
        assert!(errors.contains(&ValidationError::InvalidSocketAddress("nope".into())));
    }
}
