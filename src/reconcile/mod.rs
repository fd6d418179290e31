//! Topology reconciliation.
//!
//! # Responsibilities
//! - Diff desired vs. actual backend membership
//! - Apply the minimal mutation set under a global lock
//! - React to Sentinel events

pub mod diff;
pub mod engine;
pub mod handlers;

pub use engine::ReconcileEngine;
