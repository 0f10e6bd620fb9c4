//! Transfer state machine: statuses, legal transitions, guards and action
//! eligibility.
//!
//! ```text
//! SCHEDULED → IN_PREPARATION → IN_TRANSIT → IN_CUSTOMS → QUALITY_CHECK
//!           → AWAITING_APPROVAL → COMPLETED
//!
//! any non-terminal status ──reject──▶ REJECTED
//! ```
//!
//! Transitions are forward-only and never skip a status. Each guarded
//! transition requires a verified ledger entry for one step (see
//! [`TransferStatus::exit_guard`]).

use serde::{Deserialize, Serialize};

use waypoint_core::DomainError;

use crate::error::TransferError;
use crate::ledger::VerificationStep;
use crate::model::TransferType;

/// Transfer status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Scheduled,
    InPreparation,
    InTransit,
    InCustoms,
    QualityCheck,
    AwaitingApproval,
    Completed,
    Rejected,
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 8] = [
        TransferStatus::Scheduled,
        TransferStatus::InPreparation,
        TransferStatus::InTransit,
        TransferStatus::InCustoms,
        TransferStatus::QualityCheck,
        TransferStatus::AwaitingApproval,
        TransferStatus::Completed,
        TransferStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Scheduled => "SCHEDULED",
            TransferStatus::InPreparation => "IN_PREPARATION",
            TransferStatus::InTransit => "IN_TRANSIT",
            TransferStatus::InCustoms => "IN_CUSTOMS",
            TransferStatus::QualityCheck => "QUALITY_CHECK",
            TransferStatus::AwaitingApproval => "AWAITING_APPROVAL",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Rejected => "REJECTED",
        }
    }

    /// Human-readable label used in timeline entries.
    pub fn label(self) -> &'static str {
        match self {
            TransferStatus::Scheduled => "Scheduled",
            TransferStatus::InPreparation => "In preparation",
            TransferStatus::InTransit => "In transit",
            TransferStatus::InCustoms => "In customs",
            TransferStatus::QualityCheck => "Quality check",
            TransferStatus::AwaitingApproval => "Awaiting approval",
            TransferStatus::Completed => "Completed",
            TransferStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Rejected)
    }

    /// The single forward successor, if any.
    pub fn successor(self) -> Option<TransferStatus> {
        match self {
            TransferStatus::Scheduled => Some(TransferStatus::InPreparation),
            TransferStatus::InPreparation => Some(TransferStatus::InTransit),
            TransferStatus::InTransit => Some(TransferStatus::InCustoms),
            TransferStatus::InCustoms => Some(TransferStatus::QualityCheck),
            TransferStatus::QualityCheck => Some(TransferStatus::AwaitingApproval),
            TransferStatus::AwaitingApproval => Some(TransferStatus::Completed),
            TransferStatus::Completed | TransferStatus::Rejected => None,
        }
    }

    /// Verification required before leaving `self` for its successor.
    ///
    /// Internal transfers never cross a border, so the customs submission
    /// checkpoint is bypassed for them. That is the only bypass: an internal
    /// transfer still moves through IN_CUSTOMS and needs CUSTOMS_CLEARANCE to
    /// leave it, like every other type.
    pub fn exit_guard(self, transfer_type: TransferType) -> Option<VerificationStep> {
        match self {
            TransferStatus::InPreparation => Some(VerificationStep::Shipping),
            TransferStatus::InTransit if transfer_type == TransferType::Internal => None,
            TransferStatus::InTransit => Some(VerificationStep::CustomsSubmission),
            TransferStatus::InCustoms => Some(VerificationStep::CustomsClearance),
            TransferStatus::QualityCheck => Some(VerificationStep::QualityCheck),
            TransferStatus::AwaitingApproval => Some(VerificationStep::Receipt),
            TransferStatus::Scheduled | TransferStatus::Completed | TransferStatus::Rejected => None,
        }
    }

    /// Whether `self → to` is an edge of the transition graph (ignoring guards).
    pub fn can_transition_to(self, to: TransferStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == TransferStatus::Rejected || self.successor() == Some(to)
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TransferStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown transfer status: {s}")))
    }
}

/// Validate a requested transition against the graph (guards are checked by
/// the aggregate, which owns the ledger).
pub fn check_transition(from: TransferStatus, to: TransferStatus) -> Result<(), TransferError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransferError::InvalidTransition { from, to })
    }
}

/// Operations a caller may invoke on a transfer, gated by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferAction {
    AttachTracking,
    UpdateItems,
    UpdateExpectedArrival,
    RecordVerification,
    ProcessReceipt,
    VerifyContents,
    Advance,
    Reject,
}

impl TransferAction {
    pub const ALL: [TransferAction; 8] = [
        TransferAction::AttachTracking,
        TransferAction::UpdateItems,
        TransferAction::UpdateExpectedArrival,
        TransferAction::RecordVerification,
        TransferAction::ProcessReceipt,
        TransferAction::VerifyContents,
        TransferAction::Advance,
        TransferAction::Reject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransferAction::AttachTracking => "ATTACH_TRACKING",
            TransferAction::UpdateItems => "UPDATE_ITEMS",
            TransferAction::UpdateExpectedArrival => "UPDATE_EXPECTED_ARRIVAL",
            TransferAction::RecordVerification => "RECORD_VERIFICATION",
            TransferAction::ProcessReceipt => "PROCESS_RECEIPT",
            TransferAction::VerifyContents => "VERIFY_CONTENTS",
            TransferAction::Advance => "ADVANCE",
            TransferAction::Reject => "REJECT",
        }
    }

    pub fn is_allowed_in(self, status: TransferStatus) -> bool {
        use TransferStatus::*;

        match self {
            TransferAction::AttachTracking | TransferAction::UpdateItems => {
                matches!(status, Scheduled | InPreparation)
            }
            TransferAction::ProcessReceipt => matches!(status, InTransit | InCustoms | QualityCheck),
            TransferAction::VerifyContents => status == QualityCheck,
            TransferAction::Advance => status.successor().is_some(),
            TransferAction::UpdateExpectedArrival
            | TransferAction::RecordVerification
            | TransferAction::Reject => !status.is_terminal(),
        }
    }

    /// Re-validate eligibility at execution time.
    pub fn ensure_allowed(self, status: TransferStatus) -> Result<(), TransferError> {
        if self.is_allowed_in(status) {
            Ok(())
        } else {
            Err(TransferError::ActionNotAllowed { action: self, status })
        }
    }
}

impl core::fmt::Display for TransferAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions a caller may present for a transfer in `status`.
pub fn eligible_actions(status: TransferStatus) -> Vec<TransferAction> {
    TransferAction::ALL
        .into_iter()
        .filter(|a| a.is_allowed_in(status))
        .collect()
}
