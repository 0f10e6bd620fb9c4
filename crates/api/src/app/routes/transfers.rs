use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use waypoint_core::AggregateId;
use waypoint_infra::{ServiceResult, TransferView};
use waypoint_transfers::{
    AdvanceStatus, AttachTracking, CreateTransfer, Priority, ProcessReceipt, RecordVerification, TransferId,
    UpdateExpectedArrival, UpdateItems, VerifyContents,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/transfers", post(create_transfer).get(list_transfers))
        .route("/transfers/:id", get(get_transfer))
        .route("/transfers/:id/advance", post(advance))
        .route("/transfers/:id/verifications", post(record_verification))
        .route("/transfers/:id/tracking", post(attach_tracking))
        .route("/transfers/:id/receipt", post(process_receipt))
        .route("/transfers/:id/contents", post(verify_contents))
        .route("/transfers/:id/items", put(update_items))
        .route("/transfers/:id/expected-arrival", put(update_expected_arrival))
        .route("/transfers/:id/settlement", post(evaluate_settlement))
}

fn view_response(status: StatusCode, result: ServiceResult<TransferView>) -> axum::response::Response {
    match result {
        Ok(view) => (status, Json(view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateTransferRequest>,
) -> axum::response::Response {
    let transfer_type = match dto::parse_enum("transfer_type", &body.transfer_type) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let priority = match body.priority.as_deref() {
        Some(raw) => match dto::parse_enum("priority", raw) {
            Ok(v) => v,
            Err(resp) => return resp,
        },
        None => Priority::Medium,
    };
    let expected_arrival = match dto::parse_rfc3339("expected_arrival", &body.expected_arrival) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let smart_contract = match body.smart_contract.map(dto::SmartContractRequest::into_contract).transpose() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CreateTransfer {
        transfer_id: TransferId::new(AggregateId::new()),
        transfer_type,
        origin: body.origin,
        destination: body.destination,
        items: body.items.into_iter().map(dto::ItemRequest::into_item).collect(),
        priority,
        smart_contract,
        expected_arrival,
        initiated_by: body.initiated_by,
        occurred_at: Utc::now(),
    };

    view_response(StatusCode::CREATED, services.create(cmd).await)
}

pub async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListTransfersQuery>,
) -> axum::response::Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.list(&filter, Utc::now()).await {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    view_response(StatusCode::OK, services.get(transfer_id, Utc::now()).await)
}

pub async fn advance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdvanceRequest>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let to = match dto::parse_enum("to", &body.to) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AdvanceStatus {
        transfer_id,
        to,
        actor: body.actor,
        reason: body.reason,
        occurred_at: Utc::now(),
    };

    view_response(StatusCode::OK, services.advance(cmd).await)
}

pub async fn record_verification(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::VerificationRequest>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let step = match dto::parse_enum("step", &body.step) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = RecordVerification {
        transfer_id,
        step,
        verifier: body.verifier,
        verified: body.verified,
        notes: body.notes,
        occurred_at: Utc::now(),
    };

    view_response(StatusCode::OK, services.record_verification(cmd).await)
}

pub async fn attach_tracking(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::TrackingRequest>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AttachTracking {
        transfer_id,
        carrier: body.carrier,
        tracking_number: body.tracking_number,
        actor: body.actor,
        occurred_at: Utc::now(),
    };

    view_response(StatusCode::OK, services.attach_tracking(cmd).await)
}

pub async fn process_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiptRequest>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ProcessReceipt {
        transfer_id,
        receiver: body.receiver,
        notes: body.notes,
        occurred_at: Utc::now(),
    };

    view_response(StatusCode::OK, services.process_receipt(cmd).await)
}

pub async fn verify_contents(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ContentsRequest>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = VerifyContents {
        transfer_id,
        inspector: body.inspector,
        passed: body.passed,
        notes: body.notes,
        occurred_at: Utc::now(),
    };

    view_response(StatusCode::OK, services.verify_contents(cmd).await)
}

pub async fn update_items(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateItemsRequest>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UpdateItems {
        transfer_id,
        items: body.items.into_iter().map(dto::ItemRequest::into_item).collect(),
        actor: body.actor,
        occurred_at: Utc::now(),
    };

    view_response(StatusCode::OK, services.update_items(cmd).await)
}

pub async fn update_expected_arrival(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ExpectedArrivalRequest>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let expected_arrival = match dto::parse_rfc3339("expected_arrival", &body.expected_arrival) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UpdateExpectedArrival {
        transfer_id,
        expected_arrival,
        actor: body.actor,
        occurred_at: Utc::now(),
    };

    view_response(StatusCode::OK, services.update_expected_arrival(cmd).await)
}

pub async fn evaluate_settlement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let transfer_id = match dto::parse_transfer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.evaluate_settlement(transfer_id, Utc::now()).await {
        Ok(payment_status) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": transfer_id.to_string(),
                "payment_status": payment_status,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
