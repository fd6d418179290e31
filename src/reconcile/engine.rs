//! The reconciliation engine.
//!
//! # Responsibilities
//! - Run full reconciliation passes: re-read topology and membership,
//!   diff, and apply additions, removals, and state transitions
//! - Apply the narrow primary-switch transition
//! - Serialize every mutation phase behind one global lock
//!
//! # Design Decisions
//! - Desired topology and actual membership are both read after lock
//!   acquisition, so stale reads are never acted upon
//! - Per-member and per-cluster failures are logged and skipped at the
//!   narrowest scope; sibling work in the same pass always proceeds
//! - The primary-switch path takes the same lock as a full pass (the
//!   original raced it against running passes; see DESIGN.md)
//! - The lock guard drops on every exit path, so a failure mid-pass
//!   cannot deadlock later passes

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::config::schema::Endpoint;
use crate::coordinator::topology::{DesiredTopology, TopologySource};
use crate::reconcile::diff::diff_members;
use crate::runtime::backend::{BackendApi, BackendMember, HealthState};

/// A parsed `+switch-master` event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimarySwitch {
    pub cluster: String,
    pub old_primary: String,
    pub new_primary: String,
}

impl PrimarySwitch {
    /// Parse the space-delimited payload
    /// `<cluster> <oldPrimaryHost> <ignored> <newPrimaryHost> ...`.
    pub fn parse(payload: &str) -> Option<Self> {
        let fields: Vec<&str> = payload.split_whitespace().collect();
        let (&cluster, &old_primary, &new_primary) =
            (fields.first()?, fields.get(1)?, fields.get(3)?);
        Some(Self {
            cluster: cluster.to_string(),
            old_primary: old_primary.to_string(),
            new_primary: new_primary.to_string(),
        })
    }
}

/// Drives HAProxy toward the topology Sentinel asserts.
pub struct ReconcileEngine<B> {
    backend: B,
    lock: Mutex<()>,
    passes: AtomicU64,
}

impl<B: BackendApi> ReconcileEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
            passes: AtomicU64::new(0),
        }
    }

    /// Number of mutation phases started. Incremented once the lock
    /// is held, so it also totally orders the phases.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run one full reconciliation pass for `clusters`.
    ///
    /// Topology and membership are read fresh after the lock is held.
    /// Returns the pass number.
    pub async fn run_pass<T: TopologySource>(&self, source: &mut T, clusters: &[String]) -> u64 {
        let _guard = self.lock.lock().await;
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(pass, ?clusters, "reconciliation pass started");

        let topologies = source.fetch(clusters).await;
        for topology in &topologies {
            if let Err(err) = self.reconcile_cluster(topology).await {
                tracing::warn!(
                    cluster = %topology.name,
                    error = %err,
                    "cluster reconciliation failed"
                );
            }
        }

        tracing::debug!(pass, "reconciliation pass finished");
        pass
    }

    /// Apply the narrow primary-switch transition: promote the new
    /// primary, drain the old one, and drop its sessions. No
    /// membership diff is performed.
    pub async fn apply_primary_switch(&self, switch: &PrimarySwitch) -> u64 {
        let _guard = self.lock.lock().await;
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            cluster = %switch.cluster,
            old_primary = %switch.old_primary,
            new_primary = %switch.new_primary,
            "primary switched"
        );

        if let Err(err) = self
            .backend
            .set_state(&switch.cluster, &switch.new_primary, HealthState::Ready)
            .await
        {
            tracing::warn!(host = %switch.new_primary, error = %err, "failed to promote new primary");
        }
        if let Err(err) = self
            .backend
            .set_state(&switch.cluster, &switch.old_primary, HealthState::Maint)
            .await
        {
            tracing::warn!(host = %switch.old_primary, error = %err, "failed to demote old primary");
        }
        if let Err(err) = self
            .backend
            .shutdown_sessions(&switch.cluster, &switch.old_primary)
            .await
        {
            tracing::warn!(host = %switch.old_primary, error = %err, "failed to shut down old primary sessions");
        }

        pass
    }

    async fn reconcile_cluster(
        &self,
        topology: &DesiredTopology,
    ) -> Result<(), crate::runtime::RuntimeError> {
        let cluster = topology.name.as_str();
        let actual = self.backend.list_members(cluster).await?;

        let mut desired: Vec<Endpoint> = Vec::with_capacity(1 + topology.replicas.len());
        desired.push(topology.primary.clone());
        desired.extend(topology.replicas.iter().cloned());

        let diff = diff_members(&desired, &actual);
        if !diff.to_add.is_empty() {
            tracing::info!(
                cluster,
                servers = %join(diff.to_add.iter()),
                "servers to add"
            );
        }
        if !diff.to_remove.is_empty() {
            let removing: Vec<Endpoint> =
                diff.to_remove.iter().map(BackendMember::endpoint).collect();
            tracing::info!(cluster, servers = %join(removing.iter()), "servers to remove");
        }

        for server in &diff.to_add {
            if let Err(err) = self.backend.add_member(cluster, server).await {
                tracing::warn!(cluster, server = %server, error = %err, "failed to add server, continuing");
            }
        }
        for member in &diff.to_remove {
            if let Err(err) = self.backend.remove_member(cluster, &member.host).await {
                tracing::warn!(cluster, host = %member.host, error = %err, "failed to remove server, continuing");
            }
        }

        // The primary is always driven toward ready.
        if observed_state(&actual, &topology.primary) != Some(HealthState::Ready) {
            if let Err(err) = self
                .backend
                .set_state(cluster, &topology.primary.host, HealthState::Ready)
                .await
            {
                tracing::warn!(cluster, host = %topology.primary.host, error = %err, "failed to ready primary");
            }
        }

        // A replica observed ready is taken out of rotation and its
        // sessions dropped; one never observed ready is left alone
        // until a later pass sees it ready.
        for replica in &topology.replicas {
            if observed_state(&actual, replica) != Some(HealthState::Ready) {
                continue;
            }
            if let Err(err) = self
                .backend
                .set_state(cluster, &replica.host, HealthState::Maint)
                .await
            {
                tracing::warn!(cluster, host = %replica.host, error = %err, "failed to drain replica");
            }
            if let Err(err) = self.backend.shutdown_sessions(cluster, &replica.host).await {
                tracing::warn!(cluster, host = %replica.host, error = %err, "failed to shut down replica sessions");
            }
        }

        Ok(())
    }
}

fn observed_state(actual: &[BackendMember], server: &Endpoint) -> Option<HealthState> {
    actual
        .iter()
        .find(|m| m.host == server.host && m.port == server.port)
        .map(|m| m.state)
}

fn join<'a>(endpoints: impl Iterator<Item = &'a Endpoint>) -> String {
    endpoints
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
