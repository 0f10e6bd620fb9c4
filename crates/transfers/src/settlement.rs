//! Settlement engine: releases a transfer's conditional payment exactly once.
//!
//! Evaluation is a pure function of the transfer snapshot. It yields at most
//! one `PaymentSettled` event; once that event is applied the contract is no
//! longer pending and every later evaluation is a no-op. That is what makes
//! repeated or concurrent evaluation safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use waypoint_core::ContractId;

use crate::contract::{ContractStatus, PaymentStatus, TriggerCondition};
use crate::status::TransferStatus;
use crate::transfer::{Transfer, TransferEvent, TransferId};

/// Actor recorded on timeline entries written by the engine itself.
pub const SETTLEMENT_ACTOR: &str = "settlement-engine";

/// Payment instruction emitted when a contract settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstruction {
    pub transfer_id: TransferId,
    pub contract_id: ContractId,
    /// Amount in smallest currency unit.
    pub amount: u64,
    pub payment_method: String,
    pub trigger: TriggerCondition,
    /// `Completed` releases the payment, `Failed` voids it.
    pub outcome: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Outcome of evaluating a transfer's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementDecision {
    /// The transfer carries no contract.
    NoContract,
    /// Payment already left PENDING; nothing to do.
    AlreadySettled(PaymentStatus),
    /// Trigger evidence is not on the ledger yet.
    AwaitingEvidence,
    /// Evidence exists: release the payment.
    Release,
    /// Transfer was rejected before the evidence appeared: void the payment.
    Void,
}

/// Contract state the engine refuses to act on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("contract {contract_id} is {status:?} while its payment is still pending")]
    InconsistentContract {
        contract_id: ContractId,
        status: ContractStatus,
    },

    #[error("contract {0} has a zero payment amount")]
    ZeroAmount(ContractId),
}

/// Decide what should happen to the transfer's contract.
pub fn evaluate(transfer: &Transfer) -> Result<SettlementDecision, SettlementError> {
    let Some(contract) = transfer.smart_contract() else {
        return Ok(SettlementDecision::NoContract);
    };

    if contract.payment_status() != PaymentStatus::Pending {
        return Ok(SettlementDecision::AlreadySettled(contract.payment_status()));
    }
    if contract.status() != ContractStatus::Active {
        return Err(SettlementError::InconsistentContract {
            contract_id: contract.id(),
            status: contract.status(),
        });
    }
    if contract.payment_amount() == 0 {
        return Err(SettlementError::ZeroAmount(contract.id()));
    }

    let step = contract.trigger_condition().required_step();
    if transfer.ledger().is_verified(step) {
        Ok(SettlementDecision::Release)
    } else if transfer.status() == TransferStatus::Rejected {
        Ok(SettlementDecision::Void)
    } else {
        Ok(SettlementDecision::AwaitingEvidence)
    }
}

/// Evaluate and, when the contract has to move, build the event that moves it.
pub fn settle(
    transfer: &Transfer,
    occurred_at: DateTime<Utc>,
) -> Result<Option<TransferEvent>, SettlementError> {
    let outcome = match evaluate(transfer)? {
        SettlementDecision::Release => PaymentStatus::Completed,
        SettlementDecision::Void => PaymentStatus::Failed,
        SettlementDecision::NoContract
        | SettlementDecision::AlreadySettled(_)
        | SettlementDecision::AwaitingEvidence => return Ok(None),
    };

    // `evaluate` only returns Release/Void when a contract is present.
    let Some(contract) = transfer.smart_contract() else {
        return Ok(None);
    };

    Ok(Some(TransferEvent::PaymentSettled(PaymentInstruction {
        transfer_id: transfer.id_typed(),
        contract_id: contract.id(),
        amount: contract.payment_amount(),
        payment_method: contract.payment_method().to_string(),
        trigger: contract.trigger_condition(),
        outcome,
        occurred_at,
    })))
}
