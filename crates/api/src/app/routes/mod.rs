use axum::{Router, routing::get};

pub mod system;
pub mod transfers;

/// Router for every engine endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(system::metrics))
        .merge(transfers::router())
}
