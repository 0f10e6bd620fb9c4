//! Read-side criticality classification.
//!
//! A transfer is critical when it has sat in a status too long, when the
//! evidence its next transition needs has failed, or when a high-value
//! transfer waits on approval past the grace period. Nothing here is stored:
//! the flag is recomputed from the snapshot on every read.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::status::TransferStatus;
use crate::transfer::Transfer;

/// Thresholds used by [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalityPolicy {
    staleness: BTreeMap<TransferStatus, Duration>,
    /// Minor currency units.
    high_value_threshold: u64,
    approval_grace: Duration,
}

impl Default for CriticalityPolicy {
    fn default() -> Self {
        let staleness = BTreeMap::from([
            (TransferStatus::InPreparation, Duration::days(7)),
            (TransferStatus::InTransit, Duration::days(14)),
            (TransferStatus::InCustoms, Duration::days(5)),
            (TransferStatus::QualityCheck, Duration::days(3)),
        ]);

        Self {
            staleness,
            high_value_threshold: 5_000_000,
            approval_grace: Duration::days(2),
        }
    }
}

impl CriticalityPolicy {
    pub fn with_staleness(mut self, status: TransferStatus, threshold: Duration) -> Self {
        self.staleness.insert(status, threshold);
        self
    }

    pub fn with_high_value_threshold(mut self, threshold: u64) -> Self {
        self.high_value_threshold = threshold;
        self
    }

    pub fn with_approval_grace(mut self, grace: Duration) -> Self {
        self.approval_grace = grace;
        self
    }

    pub fn staleness(&self, status: TransferStatus) -> Option<Duration> {
        self.staleness.get(&status).copied()
    }

    pub fn high_value_threshold(&self) -> u64 {
        self.high_value_threshold
    }

    pub fn approval_grace(&self) -> Duration {
        self.approval_grace
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Criticality {
    pub is_critical: bool,
    pub reason: Option<String>,
}

impl Criticality {
    fn from_reasons(reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Self {
                is_critical: false,
                reason: None,
            }
        } else {
            Self {
                is_critical: true,
                reason: Some(reasons.join("; ")),
            }
        }
    }
}

fn describe(duration: Duration) -> String {
    if duration.num_hours() >= 48 {
        format!("{} days", duration.num_days())
    } else {
        format!("{} hours", duration.num_hours())
    }
}

/// Classify `transfer` as of `now`.
pub fn classify(transfer: &Transfer, now: DateTime<Utc>, policy: &CriticalityPolicy) -> Criticality {
    let status = transfer.status();
    if status.is_terminal() {
        return Criticality::from_reasons(Vec::new());
    }

    let mut reasons = Vec::new();
    let in_status = now - transfer.status_update_time();

    if let Some(limit) = policy.staleness(status) {
        if in_status > limit {
            reasons.push(format!(
                "{} for {} (limit {})",
                status.label(),
                describe(in_status),
                describe(limit)
            ));
        }
    }

    if let Some(step) = transfer.pending_guard() {
        if let Some(failure) = transfer.ledger().outstanding_failure(step) {
            reasons.push(format!("{} verification failed (by {})", step.label(), failure.verifier));
        }
    }

    if status == TransferStatus::AwaitingApproval
        && transfer.total_value() > policy.high_value_threshold
        && in_status > policy.approval_grace
    {
        reasons.push(format!(
            "high-value transfer ({}) awaiting approval for {}",
            transfer.total_value(),
            describe(in_status)
        ));
    }

    Criticality::from_reasons(reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::VerificationStep;
    use crate::model::TransferItem;
    use crate::transfer::fixtures::*;
    use crate::transfer::{RecordVerification, TransferCommand, UpdateItems};

    #[test]
    fn fresh_transfer_is_not_critical() {
        let transfer = created_transfer();
        let c = classify(&transfer, at(1), &CriticalityPolicy::default());
        assert!(!c.is_critical);
        assert_eq!(c.reason, None);
    }

    #[test]
    fn six_days_in_customs_is_stale_until_it_moves_on() {
        let mut transfer = created_transfer();
        walk_to(&mut transfer, TransferStatus::InCustoms);
        let entered = transfer.status_update_time();
        let now = entered + Duration::days(6);
        let policy = CriticalityPolicy::default();

        let c = classify(&transfer, now, &policy);
        assert!(c.is_critical);
        assert!(c.reason.unwrap().starts_with("In customs for 6 days"));

        verify(&mut transfer, VerificationStep::CustomsClearance, "broker", 24 * 6);
        advance(&mut transfer, TransferStatus::QualityCheck, 24 * 6);
        assert!(!classify(&transfer, at(24 * 6), &policy).is_critical);
    }

    #[test]
    fn failed_guard_evidence_is_critical() {
        let mut transfer = created_transfer();
        advance(&mut transfer, TransferStatus::InPreparation, 1);
        let transfer_id = transfer.id_typed();
        run(
            &mut transfer,
            TransferCommand::RecordVerification(RecordVerification {
                transfer_id,
                step: VerificationStep::Shipping,
                verifier: "dock-7".to_string(),
                verified: false,
                notes: Some("pallet count mismatch".to_string()),
                occurred_at: at(2),
            }),
        )
        .unwrap();

        let c = classify(&transfer, at(3), &CriticalityPolicy::default());
        assert_eq!(c.reason.as_deref(), Some("Shipping verification failed (by dock-7)"));
    }

    #[test]
    fn high_value_awaiting_approval_past_grace_is_critical() {
        let mut transfer = created_transfer();
        let transfer_id = transfer.id_typed();
        run(
            &mut transfer,
            TransferCommand::UpdateItems(UpdateItems {
                transfer_id,
                items: vec![TransferItem::new("Turbine blade", 10, 600_000)],
                actor: "planner".to_string(),
                occurred_at: at(1),
            }),
        )
        .unwrap();
        walk_to(&mut transfer, TransferStatus::AwaitingApproval);
        let entered = transfer.status_update_time();
        let policy = CriticalityPolicy::default();

        assert!(!classify(&transfer, entered + Duration::days(1), &policy).is_critical);
        let c = classify(&transfer, entered + Duration::days(3), &policy);
        assert!(c.reason.unwrap().contains("high-value transfer (6000000)"));

        let relaxed = policy.with_high_value_threshold(10_000_000);
        assert!(!classify(&transfer, entered + Duration::days(3), &relaxed).is_critical);
    }

    #[test]
    fn terminal_transfers_are_never_critical() {
        let mut transfer = created_transfer();
        advance(&mut transfer, TransferStatus::Rejected, 1);
        assert!(!classify(&transfer, at(24 * 365), &CriticalityPolicy::default()).is_critical);
    }

    #[test]
    fn multiple_rules_join_their_reasons() {
        let mut transfer = created_transfer();
        advance(&mut transfer, TransferStatus::InPreparation, 1);
        let transfer_id = transfer.id_typed();
        run(
            &mut transfer,
            TransferCommand::RecordVerification(RecordVerification {
                transfer_id,
                step: VerificationStep::Shipping,
                verifier: "dock-7".to_string(),
                verified: false,
                notes: None,
                occurred_at: at(2),
            }),
        )
        .unwrap();

        let c = classify(&transfer, at(1) + Duration::days(8), &CriticalityPolicy::default());
        let reason = c.reason.unwrap();
        assert_eq!(reason.split("; ").count(), 2);
    }
}
