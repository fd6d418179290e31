//! Configuration management.
//!
//! # Responsibilities
//! - Define configuration schema
//! - Load configuration from TOML file
//! - Validate configuration before anything connects

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{BridgeConfig, ClusterConfig, Endpoint, EndpointGroup};
