use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::MetricsQuery>,
) -> axum::response::Response {
    let window = match query.window_days {
        Some(days) if days <= 0 => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "window_days must be positive",
            );
        }
        Some(days) => match Duration::try_days(days) {
            Some(window) => Some(window),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "window_days is out of range",
                );
            }
        },
        None => None,
    };

    match services.metrics(window, Utc::now()).await {
        Ok(metrics) => (StatusCode::OK, Json(metrics)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
