//! Conditional payment ("smart contract") attached to a transfer.

use serde::{Deserialize, Serialize};

use waypoint_core::{ContractId, DomainError};

use crate::error::TransferError;
use crate::ledger::VerificationStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Active,
    Completed,
    Cancelled,
}

/// Payment state. Moves PENDING → COMPLETED or PENDING → FAILED, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence that releases the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerCondition {
    VerifiedReceipt,
    CustomsClearance,
    QualityCheckPassed,
}

impl TriggerCondition {
    pub const ALL: [TriggerCondition; 3] = [
        TriggerCondition::VerifiedReceipt,
        TriggerCondition::CustomsClearance,
        TriggerCondition::QualityCheckPassed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerCondition::VerifiedReceipt => "VERIFIED_RECEIPT",
            TriggerCondition::CustomsClearance => "CUSTOMS_CLEARANCE",
            TriggerCondition::QualityCheckPassed => "QUALITY_CHECK_PASSED",
        }
    }

    /// Ledger step whose verified entry satisfies this trigger.
    pub fn required_step(self) -> VerificationStep {
        match self {
            TriggerCondition::VerifiedReceipt => VerificationStep::Receipt,
            TriggerCondition::CustomsClearance => VerificationStep::CustomsClearance,
            TriggerCondition::QualityCheckPassed => VerificationStep::QualityCheck,
        }
    }
}

impl core::fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TriggerCondition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerCondition::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown trigger condition: {s}")))
    }
}

/// Conditional payment instruction.
///
/// There is no public setter for the payment status: it only changes when
/// the settlement engine applies a `PaymentSettled` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartContract {
    id: ContractId,
    status: ContractStatus,
    payment_method: String,
    /// Amount in smallest currency unit.
    payment_amount: u64,
    payment_status: PaymentStatus,
    trigger_condition: TriggerCondition,
}

impl SmartContract {
    /// New active contract with a pending payment.
    pub fn new(
        payment_method: impl Into<String>,
        payment_amount: u64,
        trigger_condition: TriggerCondition,
    ) -> Result<Self, TransferError> {
        let contract = Self {
            id: ContractId::new(),
            status: ContractStatus::Active,
            payment_method: payment_method.into(),
            payment_amount,
            payment_status: PaymentStatus::Pending,
            trigger_condition,
        };
        contract.validate_new()?;
        Ok(contract)
    }

    pub fn id(&self) -> ContractId {
        self.id
    }

    pub fn status(&self) -> ContractStatus {
        self.status
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn payment_amount(&self) -> u64 {
        self.payment_amount
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn trigger_condition(&self) -> TriggerCondition {
        self.trigger_condition
    }

    /// A contract entering the store must be fresh: active, pending, with a
    /// positive amount and a named payment method.
    pub(crate) fn validate_new(&self) -> Result<(), TransferError> {
        if self.payment_amount == 0 {
            return Err(TransferError::invariant("payment amount must be positive"));
        }
        if self.payment_method.trim().is_empty() {
            return Err(TransferError::invariant("payment method cannot be empty"));
        }
        if self.status != ContractStatus::Active || self.payment_status != PaymentStatus::Pending {
            return Err(TransferError::invariant(
                "a new contract must be ACTIVE with a PENDING payment",
            ));
        }
        Ok(())
    }

    /// Record the settlement outcome. Only a pending payment moves.
    pub(crate) fn settle(&mut self, outcome: PaymentStatus) {
        if self.payment_status != PaymentStatus::Pending {
            return;
        }
        match outcome {
            PaymentStatus::Completed => {
                self.payment_status = PaymentStatus::Completed;
                self.status = ContractStatus::Completed;
            }
            PaymentStatus::Failed => {
                self.payment_status = PaymentStatus::Failed;
                self.status = ContractStatus::Cancelled;
            }
            PaymentStatus::Pending => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_amount_contract_is_rejected() {
        let err = SmartContract::new("bank_transfer", 0, TriggerCondition::VerifiedReceipt).unwrap_err();
        assert!(matches!(err, TransferError::InvariantViolation(_)));
    }

    #[test]
    fn settled_payment_never_moves_again() {
        let mut contract = SmartContract::new("escrow", 10_000, TriggerCondition::QualityCheckPassed).unwrap();

        contract.settle(PaymentStatus::Completed);
        contract.settle(PaymentStatus::Failed);
        contract.settle(PaymentStatus::Pending);

        assert_eq!(contract.payment_status(), PaymentStatus::Completed);
        assert_eq!(contract.status(), ContractStatus::Completed);
    }

    #[test]
    fn failed_payment_cancels_the_contract() {
        let mut contract = SmartContract::new("escrow", 10_000, TriggerCondition::CustomsClearance).unwrap();
        contract.settle(PaymentStatus::Failed);
        assert_eq!(contract.status(), ContractStatus::Cancelled);
    }

    #[test]
    fn triggers_map_to_ledger_steps() {
        assert_eq!(TriggerCondition::VerifiedReceipt.required_step(), VerificationStep::Receipt);
        assert_eq!(
            TriggerCondition::QualityCheckPassed.required_step(),
            VerificationStep::QualityCheck
        );
    }
}
