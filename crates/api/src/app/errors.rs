use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use waypoint_infra::ServiceError;
use waypoint_transfers::TransferError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Transfer(e) => transfer_error_to_response(e),
        ServiceError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Store(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
        ServiceError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn transfer_error_to_response(err: TransferError) -> axum::response::Response {
    let (status, code) = match &err {
        TransferError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        TransferError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        TransferError::GuardNotSatisfied(_) => (StatusCode::CONFLICT, "guard_not_satisfied"),
        TransferError::DuplicateVerification(_) => (StatusCode::CONFLICT, "duplicate_verification"),
        TransferError::InvariantViolation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation"),
        TransferError::ActionNotAllowed { .. } => (StatusCode::CONFLICT, "action_not_allowed"),
        TransferError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
    };

    let mut body = json!({
        "error": code,
        "message": err.to_string(),
    });
    if let Some(step) = err.missing_step() {
        body["missing_step"] = json!(step);
    }

    (status, axum::Json(body)).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
