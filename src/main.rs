//! Sentinel → HAProxy topology bridge daemon.
//!
//! Startup order: load and validate configuration (any failure exits
//! non-zero before a connection attempt), generate the haproxy
//! configuration, spawn haproxy, wait out the grace delay, then start
//! one watch client per Sentinel endpoint group. Each watch client
//! triggers reconciliation passes on connect and on topology events;
//! a single engine serializes every mutation phase process-wide.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_bridge::config::load_config;
use sentinel_bridge::coordinator::watch::{CoordinatorWatchClient, HandlerMap};
use sentinel_bridge::coordinator::{
    CHANNEL_REPLICA_DOWN, CHANNEL_REPLICA_UP, CHANNEL_SWITCH_MASTER,
};
use sentinel_bridge::proxy::config_gen::generate_config;
use sentinel_bridge::proxy::supervisor::{spawn_haproxy, supervise};
use sentinel_bridge::reconcile::handlers::{PrimarySwitched, TopologyChanged};
use sentinel_bridge::runtime::backend::HaproxyBackend;
use sentinel_bridge::runtime::socket::RuntimeSocket;
use sentinel_bridge::ReconcileEngine;

#[derive(Debug, Parser)]
#[command(name = "sentinel-bridge", about = "Keeps HAProxy in sync with Redis Sentinel topology")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/sentinel-bridge.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Tracing is initialized after the config load so the debug
    // toggle can pick the default filter; load errors go to stderr.
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            std::process::exit(1);
        }
    };

    let default_filter = if config.observability.debug {
        "sentinel_bridge=debug"
    } else {
        "sentinel_bridge=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        config = %args.config.display(),
        clusters = config.clusters.len(),
        "sentinel-bridge starting"
    );

    if let Err(err) = generate_config(
        Path::new(&config.runtime.config_template),
        Path::new(&config.runtime.config_path),
        &config.clusters,
    ) {
        tracing::error!(error = %err, "failed to generate haproxy configuration");
        std::process::exit(1);
    }

    let child = match spawn_haproxy(
        &config.runtime.haproxy_bin,
        Path::new(&config.runtime.config_path),
    ) {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(error = %err, "failed to start haproxy");
            std::process::exit(1);
        }
    };

    // Give haproxy time to bind its runtime socket.
    tokio::time::sleep(Duration::from_millis(config.runtime.startup_grace_ms)).await;

    let socket = RuntimeSocket::new(config.runtime.socket_address.clone());
    let engine = Arc::new(ReconcileEngine::new(HaproxyBackend::new(socket)));

    for group in config.endpoint_groups() {
        tracing::info!(
            clusters = ?group.clusters,
            endpoints = ?group.endpoints.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "starting sentinel watch"
        );
        let hook = Arc::new(TopologyChanged::new(engine.clone(), group.clusters));
        let mut handlers: HandlerMap = HashMap::new();
        handlers.insert(CHANNEL_REPLICA_UP, hook.clone());
        handlers.insert(CHANNEL_REPLICA_DOWN, hook.clone());
        handlers.insert(
            CHANNEL_SWITCH_MASTER,
            Arc::new(PrimarySwitched::new(engine.clone())),
        );

        let watch = CoordinatorWatchClient::new(group.endpoints);
        watch.spawn(hook, handlers);
    }

    match supervise(child).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(error = %err, "haproxy supervision failed");
            std::process::exit(1);
        }
    }
}
