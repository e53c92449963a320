//! Shared utilities for rmx
//!
//! Process-level plumbing used by the binary: tracing setup and shutdown
//! signal handling.

pub mod shutdown;
pub mod tracing;

pub use self::shutdown::*;
pub use self::tracing::{build_filter, init, scrape_span};
