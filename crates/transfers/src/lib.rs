//! Transfer lifecycle domain module.
//!
//! A transfer moves items between two locations (warehouse → warehouse,
//! warehouse → customer, supplier → warehouse). It walks a fixed sequence of
//! statuses, collects verification evidence on the way, and may carry a
//! conditional payment that settles exactly once when its evidence exists.
//!
//! Everything here is deterministic domain logic: no IO, no clocks, no locks.
//! Callers pass `occurred_at`/`now` explicitly.

pub mod contract;
pub mod criticality;
pub mod error;
pub mod ledger;
pub mod model;
pub mod settlement;
pub mod status;
pub mod transfer;

pub use contract::{ContractStatus, PaymentStatus, SmartContract, TriggerCondition};
pub use criticality::{Criticality, CriticalityPolicy, classify};
pub use error::{TransferError, TransferResult};
pub use ledger::{LedgerAppend, Verification, VerificationLedger, VerificationStep};
pub use model::{Location, Priority, StatusChange, TimelineEvent, TrackingInfo, TransferItem, TransferType};
pub use settlement::{PaymentInstruction, SettlementDecision, SettlementError};
pub use status::{TransferAction, TransferStatus, check_transition, eligible_actions};
pub use transfer::{
    AdvanceStatus, AttachTracking, CreateTransfer, ExpectedArrivalUpdated, ItemsUpdated, ProcessReceipt,
    RecordVerification, StatusChanged, TrackingAttached, Transfer, TransferCommand, TransferCreated,
    TransferEvent, TransferId, UpdateExpectedArrival, UpdateItems, VerificationRecorded, VerifyContents,
};
