//! Core domain types, errors, and constants for `rmx`.
//!
//! ## Key Components
//!
//! - **`errors`**: the primary `Error` enum and `Result` alias shared by every
//!   crate in the workspace.
//! - **`context`**: [`CollectContext`], the deadline-bearing, cancellable context
//!   handed to collectors on every scrape.
//! - **`sink`**: [`MetricSink`], the append-only output that collectors emit
//!   metric shapes and values into.
//! - **`constants`**: shared defaults and names.

pub mod constants;
pub mod context;
pub mod errors;
pub mod sink;

pub use self::{
    constants::*,
    context::{CollectContext, ContextError},
    errors::{Error, Result},
    sink::MetricSink,
};
