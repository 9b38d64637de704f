//! Configuration subsystem.
//!
//! # Responsibilities
//! - Define the configuration schema with per-section defaults
//! - Load configuration from environment variables
//! - Fall back to defaults (with a warning) on invalid values

pub mod loader;
pub mod schema;

pub use loader::from_env;
pub use schema::{
    DitherPriority, HttpConfig, ImageConfig, ObservabilityConfig, ProxyConfig, SecurityConfig,
    ServerConfig,
};
