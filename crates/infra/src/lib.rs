//! Infrastructure layer: event store, live transfer slots, the service that
//! ties them to the domain, read-side queries and configuration.

pub mod analytics;
pub mod config;
pub mod event_store;
pub mod query;
pub mod service;
pub mod transfer_store;

#[cfg(test)]
mod test_support;

pub use analytics::AggregateMetrics;
pub use config::{ConfigError, EngineConfig};
pub use query::{TransferFilter, TransferView};
pub use service::{AGGREGATE_TYPE, Clock, ServiceError, ServiceResult, TransferService};
