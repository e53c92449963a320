//! Configuration model and loading for rmx
//!
//! Configuration is resolved with the precedence defaults → JSON file →
//! `RMX_*` environment variables. Command-line flags are layered on top by the
//! binary.

pub mod config;
pub mod loader;


pub use config::*;
pub use loader::{apply_env_overrides, ConfigLoader, ConfigSource, LoadedConfig};
