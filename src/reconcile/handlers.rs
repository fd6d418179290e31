//! Sentinel event handlers.
//!
//! Glue between the watch client's channel dispatch and the engine.
//! Handlers never raise; every failure is logged and swallowed so
//! dispatch keeps running.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::coordinator::topology::SentinelTopology;
use crate::coordinator::watch::{ChannelHandler, ConnectedHook};
use crate::reconcile::engine::{PrimarySwitch, ReconcileEngine};
use crate::runtime::backend::BackendApi;

/// Runs a full reconciliation pass for the group's clusters. Used for
/// the startup trigger and the `+slave`/`-slave` channels (their
/// payloads only matter as a trigger).
pub struct TopologyChanged<B> {
    engine: Arc<ReconcileEngine<B>>,
    clusters: Vec<String>,
}

impl<B> TopologyChanged<B> {
    pub fn new(engine: Arc<ReconcileEngine<B>>, clusters: Vec<String>) -> Self {
        Self { engine, clusters }
    }
}

#[async_trait]
impl<B: BackendApi> ChannelHandler for TopologyChanged<B> {
    async fn handle(&self, _payload: &str, query: MultiplexedConnection) {
        let mut source = SentinelTopology::new(query);
        self.engine.run_pass(&mut source, &self.clusters).await;
    }
}

#[async_trait]
impl<B: BackendApi> ConnectedHook for TopologyChanged<B> {
    async fn on_connected(&self, query: MultiplexedConnection) {
        self.handle("", query).await;
    }
}

/// Applies the narrow `+switch-master` transition.
pub struct PrimarySwitched<B> {
    engine: Arc<ReconcileEngine<B>>,
}

impl<B> PrimarySwitched<B> {
    pub fn new(engine: Arc<ReconcileEngine<B>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<B: BackendApi> ChannelHandler for PrimarySwitched<B> {
    async fn handle(&self, payload: &str, _query: MultiplexedConnection) {
        let Some(switch) = PrimarySwitch::parse(payload) else {
            tracing::warn!(payload, "malformed +switch-master payload, dropping");
            return;
        };
        self.engine.apply_primary_switch(&switch).await;
    }
}
