//! Membership diffing.
//!
//! Identity for diffing is `(host, port)` equality only; health state
//! is never part of identity.

use crate::config::schema::Endpoint;
use crate::runtime::backend::BackendMember;

/// The mutations needed to make actual membership match desired.
#[derive(Debug, Default)]
pub struct MemberDiff {
    /// Desired members absent from the backend.
    pub to_add: Vec<Endpoint>,
    /// Registered members no longer desired.
    pub to_remove: Vec<BackendMember>,
}

/// Diff desired members against the backend's actual members.
pub fn diff_members(desired: &[Endpoint], actual: &[BackendMember]) -> MemberDiff {
    let to_add = desired
        .iter()
        .filter(|d| !actual.iter().any(|a| matches(d, a)))
        .cloned()
        .collect();
    let to_remove = actual
        .iter()
        .filter(|a| !desired.iter().any(|d| matches(d, a)))
        .cloned()
        .collect();
    MemberDiff { to_add, to_remove }
}

fn matches(desired: &Endpoint, actual: &BackendMember) -> bool {
    desired.host == actual.host && desired.port == actual.port
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::backend::HealthState;

    fn member(host: &str, port: u16) -> BackendMember {
        BackendMember {
            host: host.to_string(),
            port,
            state: HealthState::Ready,
        }
    }

    #[test]
    fn test_diff_basic() {
        let desired = vec![Endpoint::new("10.0.0.1", 6379), Endpoint::new("10.0.0.2", 6379)];
        let actual = vec![member("10.0.0.2", 6379), member("10.0.0.3", 6379)];

        let diff = diff_members(&desired, &actual);
        assert_eq!(diff.to_add, vec![Endpoint::new("10.0.0.1", 6379)]);
        assert_eq!(diff.to_remove.len(), 1);
        assert_eq!(diff.to_remove[0].host, "10.0.0.3");
    }

    #[test]
    fn test_diff_converged_is_empty() {
        let desired = vec![Endpoint::new("10.0.0.1", 6379)];
        let actual = vec![member("10.0.0.1", 6379)];

        let diff = diff_members(&desired, &actual);
        assert!(diff.to_add.is_empty());
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_port_is_part_of_identity() {
        let desired = vec![Endpoint::new("10.0.0.1", 6380)];
        let actual = vec![member("10.0.0.1", 6379)];

        let diff = diff_members(&desired, &actual);
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_remove.len(), 1);
    }

    /// to_add and to_remove are disjoint and applying them yields the
    /// desired set, for an arbitrary mix of overlapping members.
    #[test]
    fn test_diff_reconstruction_property() {
        let desired: Vec<Endpoint> = (0..8)
            .map(|i| Endpoint::new(format!("10.0.1.{}", i), 6379))
            .collect();
        let actual: Vec<BackendMember> = (4..12)
            .map(|i| member(&format!("10.0.1.{}", i), 6379))
            .collect();

        let diff = diff_members(&desired, &actual);

        for added in &diff.to_add {
            assert!(!diff
                .to_remove
                .iter()
                .any(|r| r.host == added.host && r.port == added.port));
        }

        let mut reconstructed: Vec<Endpoint> = actual
            .iter()
            .filter(|a| {
                !diff
                    .to_remove
                    .iter()
                    .any(|r| r.host == a.host && r.port == a.port)
            })
            .map(BackendMember::endpoint)
            .collect();
        reconstructed.extend(diff.to_add.iter().cloned());
        reconstructed.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));

        let mut expected = desired.clone();
        expected.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
        assert_eq!(reconstructed, expected);
    }
}
