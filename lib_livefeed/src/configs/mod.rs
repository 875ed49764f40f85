//! # Configuration Modules
//!
//! Runtime configuration for the live-update client.

/// Layered `LiveClientConfig` loading (defaults, JSON file, environment).
pub mod config_client;

pub use config_client::{load_config, BackoffKind, LiveClientConfig};
