//! The rmx exporter binary
//!
//! Wires the registry, caches and cardinality optimizer together from a
//! [`rmx_config::Config`] and serves them over HTTP.

pub mod app;
pub mod commands;
pub mod server;

pub use app::App;
