use chrono::{DateTime, Utc};
use serde::Deserialize;

use axum::http::StatusCode;

use waypoint_core::AggregateId;
use waypoint_infra::TransferFilter;
use waypoint_transfers::{Location, SmartContract, TransferId, TransferItem};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    pub name: String,
    pub quantity: i64,
    /// Smallest currency unit.
    pub unit_price: u64,
    pub serial_number: Option<String>,
    pub custodian: Option<String>,
}

impl ItemRequest {
    pub fn into_item(self) -> TransferItem {
        let mut item = TransferItem::new(self.name, self.quantity, self.unit_price);
        if let Some(serial) = self.serial_number {
            item = item.with_serial_number(serial);
        }
        if let Some(custodian) = self.custodian {
            item = item.with_custodian(custodian);
        }
        item
    }
}

#[derive(Debug, Deserialize)]
pub struct SmartContractRequest {
    pub payment_method: String,
    pub payment_amount: u64,
    pub trigger_condition: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub transfer_type: String,
    pub origin: Location,
    pub destination: Location,
    pub items: Vec<ItemRequest>,
    pub priority: Option<String>,
    pub smart_contract: Option<SmartContractRequest>,
    pub expected_arrival: String, // RFC3339
    pub initiated_by: String,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub to: String,
    pub actor: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub step: String,
    pub verifier: String,
    /// Defaults to a passed verification.
    #[serde(default = "default_true")]
    pub verified: bool,
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct TrackingRequest {
    pub carrier: String,
    pub tracking_number: String,
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptRequest {
    pub receiver: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentsRequest {
    pub inspector: String,
    pub passed: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemsRequest {
    pub items: Vec<ItemRequest>,
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedArrivalRequest {
    pub expected_arrival: String, // RFC3339
    pub actor: String,
}

/// `GET /transfers` query string. Set-valued fields are comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct ListTransfersQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub transfer_type: Option<String>,
    pub priority: Option<String>,
    pub initiated_from: Option<String>,
    pub initiated_to: Option<String>,
    pub min_value: Option<u64>,
    pub max_value: Option<u64>,
    #[serde(default)]
    pub critical_only: bool,
    #[serde(default)]
    pub verified_only: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub window_days: Option<i64>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_transfer_id(id: &str) -> Result<TransferId, axum::response::Response> {
    id.parse::<AggregateId>()
        .map(TransferId::new)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid transfer id"))
}

pub fn parse_enum<T>(field: &'static str, raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "validation_error", format!("{field}: {e}"))
    })
}

fn parse_set<T>(field: &'static str, raw: Option<&str>) -> Result<Vec<T>, axum::response::Response>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.map(|s| {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| parse_enum(field, part))
            .collect()
    })
    .unwrap_or_else(|| Ok(Vec::new()))
}

pub fn parse_rfc3339(field: &'static str, raw: &str) -> Result<DateTime<Utc>, axum::response::Response> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("{field} must be an RFC3339 timestamp"),
            )
        })
}

impl SmartContractRequest {
    pub fn into_contract(self) -> Result<SmartContract, axum::response::Response> {
        let trigger = parse_enum("trigger_condition", &self.trigger_condition)?;
        SmartContract::new(self.payment_method, self.payment_amount, trigger)
            .map_err(errors::transfer_error_to_response)
    }
}

impl ListTransfersQuery {
    pub fn into_filter(self) -> Result<TransferFilter, axum::response::Response> {
        Ok(TransferFilter {
            statuses: parse_set("status", self.status.as_deref())?,
            types: parse_set("type", self.transfer_type.as_deref())?,
            priorities: parse_set("priority", self.priority.as_deref())?,
            initiated_from: self
                .initiated_from
                .as_deref()
                .map(|raw| parse_rfc3339("initiated_from", raw))
                .transpose()?,
            initiated_to: self
                .initiated_to
                .as_deref()
                .map(|raw| parse_rfc3339("initiated_to", raw))
                .transpose()?,
            min_value: self.min_value,
            max_value: self.max_value,
            critical_only: self.critical_only,
            verified_only: self.verified_only,
        })
    }
}
