//! HTTP API application wiring (axum router + service wiring).
//!
//! - `services.rs`: engine wiring (event store, bus, transfer service)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and parsing helpers
//! - `errors.rs`: consistent JSON error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use waypoint_infra::EngineConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: EngineConfig) -> Router {
    let services = Arc::new(services::build_services(config));
    router(services)
}

/// Router over an existing set of services.
pub fn router(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
}
