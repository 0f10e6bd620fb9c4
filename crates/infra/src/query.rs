//! Read-side views and list filtering over transfer snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;

use waypoint_transfers::{
    CriticalityPolicy, Priority, Transfer, TransferAction, TransferStatus, TransferType, VerificationStep,
    classify,
};

/// What callers see for one transfer: the snapshot plus everything derived
/// from it at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferView {
    #[serde(flatten)]
    pub transfer: Transfer,
    pub total_value: u64,
    pub is_critical: bool,
    pub critical_reason: Option<String>,
    pub eligible_actions: Vec<TransferAction>,
    /// Ledger step the next forward transition still needs.
    pub pending_guard: Option<VerificationStep>,
}

impl TransferView {
    pub fn build(transfer: Transfer, now: DateTime<Utc>, policy: &CriticalityPolicy) -> Self {
        let criticality = classify(&transfer, now, policy);

        Self {
            total_value: transfer.total_value(),
            is_critical: criticality.is_critical,
            critical_reason: criticality.reason,
            eligible_actions: transfer.eligible_actions(),
            pending_guard: transfer.pending_guard(),
            transfer,
        }
    }
}

/// List filter. Empty sets and `None` bounds match everything; bounds are
/// inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferFilter {
    pub statuses: Vec<TransferStatus>,
    pub types: Vec<TransferType>,
    pub priorities: Vec<Priority>,
    pub initiated_from: Option<DateTime<Utc>>,
    pub initiated_to: Option<DateTime<Utc>>,
    pub min_value: Option<u64>,
    pub max_value: Option<u64>,
    pub critical_only: bool,
    /// Only transfers without a step whose every attempt failed.
    pub verified_only: bool,
}

impl TransferFilter {
    pub fn matches(&self, view: &TransferView) -> bool {
        let t = &view.transfer;

        if !self.statuses.is_empty() && !self.statuses.contains(&t.status()) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&t.transfer_type()) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&t.priority()) {
            return false;
        }
        if self.initiated_from.is_some_and(|from| t.date_initiated() < from) {
            return false;
        }
        if self.initiated_to.is_some_and(|to| t.date_initiated() > to) {
            return false;
        }
        if self.min_value.is_some_and(|min| view.total_value < min) {
            return false;
        }
        if self.max_value.is_some_and(|max| view.total_value > max) {
            return false;
        }
        if self.critical_only && !view.is_critical {
            return false;
        }
        if self.verified_only && t.ledger().has_outstanding_failures() {
            return false;
        }
        true
    }

    /// Filter `views` and order them by initiation date, then id.
    pub fn apply(&self, views: impl IntoIterator<Item = TransferView>) -> Vec<TransferView> {
        let mut out: Vec<TransferView> = views.into_iter().filter(|v| self.matches(v)).collect();
        out.sort_by(|a, b| {
            a.transfer
                .date_initiated()
                .cmp(&b.transfer.date_initiated())
                .then_with(|| a.transfer.id_typed().cmp(&b.transfer.id_typed()))
        });
        out
    }
}
