//! Error types for rmx operations

mod builders;
mod types;

pub use builders::*;
pub use types::{Error, Result};
