//! Transfer domain errors.

use thiserror::Error;

use waypoint_core::DomainError;

use crate::ledger::VerificationStep;
use crate::status::{TransferAction, TransferStatus};

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Deterministic failures of a transfer command.
///
/// Every variant is returned to the caller of the mutating operation; a
/// rejected command never leaves partial state behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Unknown transfer id.
    #[error("transfer not found")]
    NotFound,

    /// The requested status is neither the successor of the current status
    /// nor a rejection of a non-terminal transfer.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: TransferStatus,
        to: TransferStatus,
    },

    /// A guarded transition was requested before its evidence was verified.
    #[error("guard not satisfied: no verified {0} record")]
    GuardNotSatisfied(VerificationStep),

    /// The step already has a verified ledger entry from a different
    /// verifier, or a failure was submitted against it.
    #[error("{0} has already been verified")]
    DuplicateVerification(VerificationStep),

    /// Malformed input or a broken aggregate invariant.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The action is not eligible in the transfer's current status.
    #[error("{action} is not allowed while the transfer is {status}")]
    ActionNotAllowed {
        action: TransferAction,
        status: TransferStatus,
    },

    /// The transfer already exists, or a concurrent writer got there first.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl TransferError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// The verification step an operator has to obtain next, if that is what
    /// blocked the command.
    pub fn missing_step(&self) -> Option<VerificationStep> {
        match self {
            TransferError::GuardNotSatisfied(step) => Some(*step),
            _ => None,
        }
    }
}

impl From<DomainError> for TransferError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvariantViolation(msg) => {
                TransferError::InvariantViolation(msg)
            }
            DomainError::InvalidId(msg) => TransferError::InvariantViolation(msg),
            DomainError::NotFound => TransferError::NotFound,
            DomainError::Conflict(msg) => TransferError::Conflict(msg),
        }
    }
}
