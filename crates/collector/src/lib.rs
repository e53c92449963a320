//! Collector contract and concurrent collection for rmx
//!
//! Domain collectors implement [`Collector`] and are registered with a
//! [`CollectorRegistry`]. Each scrape calls [`CollectorRegistry::collect_all`],
//! which runs every enabled collector in its own task with its own deadline,
//! isolates failures and panics to the collector that caused them, and records
//! the outcome in a per-collector [`CollectorState`].

pub mod builtin;
pub mod collector;
pub mod diagnostics;
pub mod registry;
pub mod state;

pub use builtin::ExporterCollector;
pub use collector::{Collector, Toggle};
pub use registry::{CollectionSummary, CollectorRegistry, RegistryOptions};
pub use state::{CollectionStatus, CollectorState};
