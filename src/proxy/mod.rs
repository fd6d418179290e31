//! HAProxy process management.
//!
//! # Responsibilities
//! - Generate the haproxy.cfg frontend/backend stanzas
//! - Spawn and supervise the haproxy process

pub mod config_gen;
pub mod supervisor;
