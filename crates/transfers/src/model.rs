//! Value types carried by a transfer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use waypoint_core::{DomainError, ItemId};

use crate::error::TransferError;
use crate::status::TransferStatus;

/// Direction of a transfer relative to the organisation's own warehouses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    /// Supplier → warehouse.
    Inbound,
    /// Warehouse → customer.
    Outbound,
    /// Warehouse → warehouse. Bypasses the customs submission checkpoint.
    Internal,
}

impl TransferType {
    pub const ALL: [TransferType; 3] = [TransferType::Inbound, TransferType::Outbound, TransferType::Internal];

    pub fn as_str(self) -> &'static str {
        match self {
            TransferType::Inbound => "INBOUND",
            TransferType::Outbound => "OUTBOUND",
            TransferType::Internal => "INTERNAL",
        }
    }
}

impl core::fmt::Display for TransferType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TransferType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown transfer type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown priority: {s}")))
    }
}

/// A warehouse, supplier or customer site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
}

impl Location {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Transfer line item.
///
/// The line total is always derived from `quantity × unit_price`; it is never
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub id: ItemId,
    pub name: String,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub serial_number: Option<String>,
    pub custodian: Option<String>,
}

impl TransferItem {
    pub fn new(name: impl Into<String>, quantity: i64, unit_price: u64) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            quantity,
            unit_price,
            serial_number: None,
            custodian: None,
        }
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn with_custodian(mut self, custodian: impl Into<String>) -> Self {
        self.custodian = Some(custodian.into());
        self
    }

    /// Line total in smallest currency unit.
    pub fn total_value(&self) -> u64 {
        (self.quantity.max(0) as u64).saturating_mul(self.unit_price)
    }

    fn checked_total(&self) -> Option<u64> {
        u64::try_from(self.quantity).ok()?.checked_mul(self.unit_price)
    }
}

/// Validate a full item list and return its total value.
///
/// Rejects empty lists, blank names, non-positive quantities, duplicate item
/// ids and totals that would overflow.
pub fn validate_items(items: &[TransferItem]) -> Result<u64, TransferError> {
    if items.is_empty() {
        return Err(TransferError::invariant("a transfer needs at least one item"));
    }

    let mut total: u64 = 0;
    for (idx, item) in items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(TransferError::invariant(format!("item {idx}: name cannot be empty")));
        }
        if item.quantity <= 0 {
            return Err(TransferError::invariant(format!(
                "item {idx}: quantity must be positive (got {})",
                item.quantity
            )));
        }
        if items[..idx].iter().any(|other| other.id == item.id) {
            return Err(TransferError::invariant(format!("item {idx}: duplicate item id {}", item.id)));
        }
        let line = item
            .checked_total()
            .ok_or_else(|| TransferError::invariant(format!("item {idx}: line total overflows")))?;
        total = total
            .checked_add(line)
            .ok_or_else(|| TransferError::invariant("transfer total overflows"))?;
    }

    Ok(total)
}

/// Carrier tracking reference, attachable before the goods leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub carrier: String,
    pub tracking_number: String,
    pub attached_by: String,
    pub attached_at: DateTime<Utc>,
}

/// Audit entry in a transfer's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// A status the transfer entered, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: TransferStatus,
    pub entered_at: DateTime<Utc>,
}
