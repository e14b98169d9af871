//! Energomera meter exporter library
//!
//! Polls an Energomera electricity meter over its IEC 1107 style optical
//! port, keeps the last good readings and serves them to Prometheus.

pub mod api;
pub mod cache;
pub mod config;
pub mod metering_energomera;
pub mod transport;

// Re-export common types for easier access
pub use api::ApiManager;
pub use cache::{ReadingCache, ReadingSnapshot};
pub use config::Config;
pub use metering_energomera::{EnergomeraError, EnergomeraManager};
