//! Sentinel → HAProxy topology bridge.
//!
//! Keeps HAProxy backend membership and server health states in sync
//! with the live primary/replica topology reported by Redis Sentinel.

// Protocol clients
pub mod coordinator;
pub mod runtime;

// Control loop
pub mod reconcile;

// Cross-cutting concerns
pub mod config;
pub mod proxy;

pub use config::schema::{BridgeConfig, Endpoint};
pub use reconcile::engine::ReconcileEngine;
