use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use waypoint_core::{Aggregate, AggregateId, AggregateRoot};
use waypoint_events::Event;

use crate::contract::{PaymentStatus, SmartContract};
use crate::error::TransferError;
use crate::ledger::{LedgerAppend, Verification, VerificationLedger, VerificationStep};
use crate::model::{
    Location, Priority, StatusChange, TimelineEvent, TrackingInfo, TransferItem, TransferType, validate_items,
};
use crate::settlement::{PaymentInstruction, SETTLEMENT_ACTOR};
use crate::status::{TransferAction, TransferStatus, check_transition, eligible_actions};

/// Transfer identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub AggregateId);

impl TransferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.0
    }
}

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Transfer.
///
/// Only `apply` mutates state. Criticality is derived on read (see
/// [`crate::criticality`]) and is deliberately not a field here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    id: TransferId,
    transfer_type: TransferType,
    origin: Location,
    destination: Location,
    items: Vec<TransferItem>,
    date_initiated: DateTime<Utc>,
    expected_arrival: DateTime<Utc>,
    status: TransferStatus,
    status_update_time: DateTime<Utc>,
    priority: Priority,
    smart_contract: Option<SmartContract>,
    verifications: VerificationLedger,
    timeline: Vec<TimelineEvent>,
    tracking: Option<TrackingInfo>,
    initiated_by: String,
    status_history: Vec<StatusChange>,
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Transfer {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            transfer_type: TransferType::Internal,
            origin: Location::new("", ""),
            destination: Location::new("", ""),
            items: Vec::new(),
            date_initiated: DateTime::<Utc>::UNIX_EPOCH,
            expected_arrival: DateTime::<Utc>::UNIX_EPOCH,
            status: TransferStatus::Scheduled,
            status_update_time: DateTime::<Utc>::UNIX_EPOCH,
            priority: Priority::Medium,
            smart_contract: None,
            verifications: VerificationLedger::new(),
            timeline: Vec::new(),
            tracking: None,
            initiated_by: String::new(),
            status_history: Vec::new(),
            version: 0,
            created: false,
        }
    }

    /// Rebuild a transfer by replaying its event history in order.
    pub fn from_history<'a>(id: TransferId, events: impl IntoIterator<Item = &'a TransferEvent>) -> Self {
        let mut transfer = Self::empty(id);
        for event in events {
            transfer.apply(event);
        }
        transfer
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn origin(&self) -> &Location {
        &self.origin
    }

    pub fn destination(&self) -> &Location {
        &self.destination
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    /// Sum of item totals, recomputed on every call.
    pub fn total_value(&self) -> u64 {
        self.items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.total_value()))
    }

    pub fn date_initiated(&self) -> DateTime<Utc> {
        self.date_initiated
    }

    pub fn expected_arrival(&self) -> DateTime<Utc> {
        self.expected_arrival
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn status_update_time(&self) -> DateTime<Utc> {
        self.status_update_time
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn smart_contract(&self) -> Option<&SmartContract> {
        self.smart_contract.as_ref()
    }

    pub fn ledger(&self) -> &VerificationLedger {
        &self.verifications
    }

    pub fn verifications(&self) -> &[Verification] {
        self.verifications.entries()
    }

    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    pub fn tracking(&self) -> Option<&TrackingInfo> {
        self.tracking.as_ref()
    }

    pub fn initiated_by(&self) -> &str {
        &self.initiated_by
    }

    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn eligible_actions(&self) -> Vec<TransferAction> {
        eligible_actions(self.status)
    }

    /// Ledger step the next forward transition is waiting on, if any.
    pub fn pending_guard(&self) -> Option<VerificationStep> {
        self.status
            .exit_guard(self.transfer_type)
            .filter(|step| !self.verifications.is_verified(*step))
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub transfer_id: TransferId,
    pub transfer_type: TransferType,
    pub origin: Location,
    pub destination: Location,
    pub items: Vec<TransferItem>,
    pub priority: Priority,
    pub smart_contract: Option<SmartContract>,
    pub expected_arrival: DateTime<Utc>,
    pub initiated_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordVerification (a passed or failed checkpoint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordVerification {
    pub transfer_id: TransferId,
    pub step: VerificationStep,
    pub verifier: String,
    pub verified: bool,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceStatus (forward one step, or reject).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceStatus {
    pub transfer_id: TransferId,
    pub to: TransferStatus,
    pub actor: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachTracking (only before the goods leave).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachTracking {
    pub transfer_id: TransferId,
    pub carrier: String,
    pub tracking_number: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ProcessReceipt (goods arrived at the destination).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReceipt {
    pub transfer_id: TransferId,
    pub receiver: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VerifyContents (quality inspection outcome).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyContents {
    pub transfer_id: TransferId,
    pub inspector: String,
    pub passed: bool,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItems (replace the item list before shipping).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItems {
    pub transfer_id: TransferId,
    pub items: Vec<TransferItem>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateExpectedArrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateExpectedArrival {
    pub transfer_id: TransferId,
    pub expected_arrival: DateTime<Utc>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    CreateTransfer(CreateTransfer),
    RecordVerification(RecordVerification),
    AdvanceStatus(AdvanceStatus),
    AttachTracking(AttachTracking),
    ProcessReceipt(ProcessReceipt),
    VerifyContents(VerifyContents),
    UpdateItems(UpdateItems),
    UpdateExpectedArrival(UpdateExpectedArrival),
}

impl TransferCommand {
    pub fn transfer_id(&self) -> TransferId {
        match self {
            TransferCommand::CreateTransfer(c) => c.transfer_id,
            TransferCommand::RecordVerification(c) => c.transfer_id,
            TransferCommand::AdvanceStatus(c) => c.transfer_id,
            TransferCommand::AttachTracking(c) => c.transfer_id,
            TransferCommand::ProcessReceipt(c) => c.transfer_id,
            TransferCommand::VerifyContents(c) => c.transfer_id,
            TransferCommand::UpdateItems(c) => c.transfer_id,
            TransferCommand::UpdateExpectedArrival(c) => c.transfer_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferCommand::CreateTransfer(c) => c.occurred_at,
            TransferCommand::RecordVerification(c) => c.occurred_at,
            TransferCommand::AdvanceStatus(c) => c.occurred_at,
            TransferCommand::AttachTracking(c) => c.occurred_at,
            TransferCommand::ProcessReceipt(c) => c.occurred_at,
            TransferCommand::VerifyContents(c) => c.occurred_at,
            TransferCommand::UpdateItems(c) => c.occurred_at,
            TransferCommand::UpdateExpectedArrival(c) => c.occurred_at,
        }
    }

    /// Restamp the command, e.g. with the time it was actually serialized at.
    pub fn set_occurred_at(&mut self, at: DateTime<Utc>) {
        let slot = match self {
            TransferCommand::CreateTransfer(c) => &mut c.occurred_at,
            TransferCommand::RecordVerification(c) => &mut c.occurred_at,
            TransferCommand::AdvanceStatus(c) => &mut c.occurred_at,
            TransferCommand::AttachTracking(c) => &mut c.occurred_at,
            TransferCommand::ProcessReceipt(c) => &mut c.occurred_at,
            TransferCommand::VerifyContents(c) => &mut c.occurred_at,
            TransferCommand::UpdateItems(c) => &mut c.occurred_at,
            TransferCommand::UpdateExpectedArrival(c) => &mut c.occurred_at,
        };
        *slot = at;
    }
}

/// Event: TransferCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCreated {
    pub transfer_id: TransferId,
    pub transfer_type: TransferType,
    pub origin: Location,
    pub destination: Location,
    pub items: Vec<TransferItem>,
    pub priority: Priority,
    pub smart_contract: Option<SmartContract>,
    pub expected_arrival: DateTime<Utc>,
    pub initiated_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VerificationRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecorded {
    pub transfer_id: TransferId,
    pub step: VerificationStep,
    pub verified: bool,
    pub verifier: String,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub transfer_id: TransferId,
    pub from: TransferStatus,
    pub to: TransferStatus,
    pub actor: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TrackingAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingAttached {
    pub transfer_id: TransferId,
    pub carrier: String,
    pub tracking_number: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsUpdated {
    pub transfer_id: TransferId,
    pub items: Vec<TransferItem>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpectedArrivalUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedArrivalUpdated {
    pub transfer_id: TransferId,
    pub expected_arrival: DateTime<Utc>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransferCreated(TransferCreated),
    VerificationRecorded(VerificationRecorded),
    StatusChanged(StatusChanged),
    TrackingAttached(TrackingAttached),
    ItemsUpdated(ItemsUpdated),
    ExpectedArrivalUpdated(ExpectedArrivalUpdated),
    /// Emitted by the settlement engine, never by a caller command.
    PaymentSettled(PaymentInstruction),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferCreated(_) => "transfer.created",
            TransferEvent::VerificationRecorded(_) => "transfer.verification_recorded",
            TransferEvent::StatusChanged(_) => "transfer.status_changed",
            TransferEvent::TrackingAttached(_) => "transfer.tracking_attached",
            TransferEvent::ItemsUpdated(_) => "transfer.items_updated",
            TransferEvent::ExpectedArrivalUpdated(_) => "transfer.expected_arrival_updated",
            TransferEvent::PaymentSettled(_) => "transfer.payment_settled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransferCreated(e) => e.occurred_at,
            TransferEvent::VerificationRecorded(e) => e.occurred_at,
            TransferEvent::StatusChanged(e) => e.occurred_at,
            TransferEvent::TrackingAttached(e) => e.occurred_at,
            TransferEvent::ItemsUpdated(e) => e.occurred_at,
            TransferEvent::ExpectedArrivalUpdated(e) => e.occurred_at,
            TransferEvent::PaymentSettled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = TransferError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransferCreated(e) => {
                self.id = e.transfer_id;
                self.transfer_type = e.transfer_type;
                self.origin = e.origin.clone();
                self.destination = e.destination.clone();
                self.items = e.items.clone();
                self.priority = e.priority;
                self.smart_contract = e.smart_contract.clone();
                self.date_initiated = e.occurred_at;
                self.expected_arrival = e.expected_arrival;
                self.status = TransferStatus::Scheduled;
                self.status_update_time = e.occurred_at;
                self.initiated_by = e.initiated_by.clone();
                self.status_history = vec![StatusChange {
                    status: TransferStatus::Scheduled,
                    entered_at: e.occurred_at,
                }];
                self.verifications = VerificationLedger::new();
                self.verifications.push(Verification {
                    step: VerificationStep::Creation,
                    verified: true,
                    verifier: e.initiated_by.clone(),
                    timestamp: e.occurred_at,
                    notes: None,
                });
                self.timeline = vec![TimelineEvent {
                    event: "Transfer created".to_string(),
                    timestamp: e.occurred_at,
                    actor: e.initiated_by.clone(),
                    location: Some(e.origin.name.clone()),
                    notes: None,
                }];
                self.tracking = None;
                self.created = true;
            }
            TransferEvent::VerificationRecorded(e) => {
                self.verifications.push(Verification {
                    step: e.step,
                    verified: e.verified,
                    verifier: e.verifier.clone(),
                    timestamp: e.occurred_at,
                    notes: e.notes.clone(),
                });
                let label = if e.verified {
                    format!("{} verified", e.step.label())
                } else {
                    format!("{} verification failed", e.step.label())
                };
                self.timeline.push(TimelineEvent {
                    event: label,
                    timestamp: e.occurred_at,
                    actor: e.verifier.clone(),
                    location: e.location.clone(),
                    notes: e.notes.clone(),
                });
            }
            TransferEvent::StatusChanged(e) => {
                self.status = e.to;
                self.status_update_time = e.occurred_at;
                self.status_history.push(StatusChange {
                    status: e.to,
                    entered_at: e.occurred_at,
                });
                let label = match e.to {
                    TransferStatus::Rejected => "Transfer rejected".to_string(),
                    TransferStatus::Completed => "Transfer completed".to_string(),
                    other => format!("Status changed to {}", other.label()),
                };
                let location = match e.to {
                    TransferStatus::Completed => Some(self.destination.name.clone()),
                    TransferStatus::InPreparation => Some(self.origin.name.clone()),
                    _ => None,
                };
                self.timeline.push(TimelineEvent {
                    event: label,
                    timestamp: e.occurred_at,
                    actor: e.actor.clone(),
                    location,
                    notes: e.reason.clone(),
                });
            }
            TransferEvent::TrackingAttached(e) => {
                self.tracking = Some(TrackingInfo {
                    carrier: e.carrier.clone(),
                    tracking_number: e.tracking_number.clone(),
                    attached_by: e.actor.clone(),
                    attached_at: e.occurred_at,
                });
                self.timeline.push(TimelineEvent {
                    event: "Tracking attached".to_string(),
                    timestamp: e.occurred_at,
                    actor: e.actor.clone(),
                    location: None,
                    notes: Some(format!("{} {}", e.carrier, e.tracking_number)),
                });
            }
            TransferEvent::ItemsUpdated(e) => {
                self.items = e.items.clone();
                self.timeline.push(TimelineEvent {
                    event: "Items updated".to_string(),
                    timestamp: e.occurred_at,
                    actor: e.actor.clone(),
                    location: None,
                    notes: Some(format!("{} item(s), total value {}", self.items.len(), self.total_value())),
                });
            }
            TransferEvent::ExpectedArrivalUpdated(e) => {
                self.expected_arrival = e.expected_arrival;
                self.timeline.push(TimelineEvent {
                    event: "Expected arrival updated".to_string(),
                    timestamp: e.occurred_at,
                    actor: e.actor.clone(),
                    location: None,
                    notes: Some(e.expected_arrival.to_rfc3339()),
                });
            }
            TransferEvent::PaymentSettled(e) => {
                if let Some(contract) = self.smart_contract.as_mut() {
                    contract.settle(e.outcome);
                }
                let label = match e.outcome {
                    PaymentStatus::Completed => "Payment released",
                    _ => "Payment voided",
                };
                self.timeline.push(TimelineEvent {
                    event: label.to_string(),
                    timestamp: e.occurred_at,
                    actor: SETTLEMENT_ACTOR.to_string(),
                    location: None,
                    notes: Some(format!(
                        "trigger {}, amount {} via {}",
                        e.trigger, e.amount, e.payment_method
                    )),
                });
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::CreateTransfer(cmd) => self.handle_create(cmd),
            TransferCommand::RecordVerification(cmd) => self.handle_record_verification(cmd),
            TransferCommand::AdvanceStatus(cmd) => self.handle_advance(cmd),
            TransferCommand::AttachTracking(cmd) => self.handle_attach_tracking(cmd),
            TransferCommand::ProcessReceipt(cmd) => self.handle_process_receipt(cmd),
            TransferCommand::VerifyContents(cmd) => self.handle_verify_contents(cmd),
            TransferCommand::UpdateItems(cmd) => self.handle_update_items(cmd),
            TransferCommand::UpdateExpectedArrival(cmd) => self.handle_update_expected_arrival(cmd),
        }
    }
}

fn require_actor(actor: &str, role: &str) -> Result<(), TransferError> {
    if actor.trim().is_empty() {
        return Err(TransferError::invariant(format!("{role} cannot be empty")));
    }
    Ok(())
}

impl Transfer {
    fn ensure_exists(&self, transfer_id: TransferId) -> Result<(), TransferError> {
        if !self.created {
            return Err(TransferError::NotFound);
        }
        if self.id != transfer_id {
            return Err(TransferError::invariant("transfer_id mismatch"));
        }
        Ok(())
    }

    fn verification_event(
        &self,
        step: VerificationStep,
        verifier: &str,
        verified: bool,
        notes: &Option<String>,
        location: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<TransferEvent>, TransferError> {
        require_actor(verifier, "verifier")?;

        match self.verifications.check_append(step, verifier, verified)? {
            LedgerAppend::Repeat => Ok(vec![]),
            LedgerAppend::Append => Ok(vec![TransferEvent::VerificationRecorded(VerificationRecorded {
                transfer_id: self.id,
                step,
                verified,
                verifier: verifier.to_string(),
                notes: notes.clone(),
                location,
                occurred_at,
            })]),
        }
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, TransferError> {
        if self.created {
            return Err(TransferError::conflict("transfer already exists"));
        }

        validate_items(&cmd.items)?;
        require_actor(&cmd.initiated_by, "initiated_by")?;

        for (role, location) in [("origin", &cmd.origin), ("destination", &cmd.destination)] {
            if location.id.trim().is_empty() {
                return Err(TransferError::invariant(format!("{role} location id cannot be empty")));
            }
        }
        if cmd.origin.id == cmd.destination.id {
            return Err(TransferError::invariant("origin and destination must differ"));
        }
        if cmd.expected_arrival < cmd.occurred_at {
            return Err(TransferError::invariant(
                "expected arrival cannot precede the initiation date",
            ));
        }
        if let Some(contract) = &cmd.smart_contract {
            contract.validate_new()?;
        }

        Ok(vec![TransferEvent::TransferCreated(TransferCreated {
            transfer_id: cmd.transfer_id,
            transfer_type: cmd.transfer_type,
            origin: cmd.origin.clone(),
            destination: cmd.destination.clone(),
            items: cmd.items.clone(),
            priority: cmd.priority,
            smart_contract: cmd.smart_contract.clone(),
            expected_arrival: cmd.expected_arrival,
            initiated_by: cmd.initiated_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_verification(
        &self,
        cmd: &RecordVerification,
    ) -> Result<Vec<TransferEvent>, TransferError> {
        self.ensure_exists(cmd.transfer_id)?;
        TransferAction::RecordVerification.ensure_allowed(self.status)?;

        self.verification_event(cmd.step, &cmd.verifier, cmd.verified, &cmd.notes, None, cmd.occurred_at)
    }

    fn handle_advance(&self, cmd: &AdvanceStatus) -> Result<Vec<TransferEvent>, TransferError> {
        self.ensure_exists(cmd.transfer_id)?;
        check_transition(self.status, cmd.to)?;
        require_actor(&cmd.actor, "actor")?;

        // Rejection is always allowed; forward moves need their evidence.
        if cmd.to != TransferStatus::Rejected {
            if let Some(step) = self.pending_guard() {
                return Err(TransferError::GuardNotSatisfied(step));
            }
        }

        Ok(vec![TransferEvent::StatusChanged(StatusChanged {
            transfer_id: cmd.transfer_id,
            from: self.status,
            to: cmd.to,
            actor: cmd.actor.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_tracking(&self, cmd: &AttachTracking) -> Result<Vec<TransferEvent>, TransferError> {
        self.ensure_exists(cmd.transfer_id)?;
        TransferAction::AttachTracking.ensure_allowed(self.status)?;
        require_actor(&cmd.actor, "actor")?;

        if cmd.carrier.trim().is_empty() || cmd.tracking_number.trim().is_empty() {
            return Err(TransferError::invariant("carrier and tracking number are required"));
        }

        if let Some(current) = &self.tracking {
            if current.carrier == cmd.carrier && current.tracking_number == cmd.tracking_number {
                return Ok(vec![]);
            }
        }

        Ok(vec![TransferEvent::TrackingAttached(TrackingAttached {
            transfer_id: cmd.transfer_id,
            carrier: cmd.carrier.clone(),
            tracking_number: cmd.tracking_number.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_process_receipt(&self, cmd: &ProcessReceipt) -> Result<Vec<TransferEvent>, TransferError> {
        self.ensure_exists(cmd.transfer_id)?;
        TransferAction::ProcessReceipt.ensure_allowed(self.status)?;

        self.verification_event(
            VerificationStep::Receipt,
            &cmd.receiver,
            true,
            &cmd.notes,
            Some(self.destination.name.clone()),
            cmd.occurred_at,
        )
    }

    fn handle_verify_contents(&self, cmd: &VerifyContents) -> Result<Vec<TransferEvent>, TransferError> {
        self.ensure_exists(cmd.transfer_id)?;
        TransferAction::VerifyContents.ensure_allowed(self.status)?;

        self.verification_event(
            VerificationStep::QualityCheck,
            &cmd.inspector,
            cmd.passed,
            &cmd.notes,
            Some(self.destination.name.clone()),
            cmd.occurred_at,
        )
    }

    fn handle_update_items(&self, cmd: &UpdateItems) -> Result<Vec<TransferEvent>, TransferError> {
        self.ensure_exists(cmd.transfer_id)?;
        TransferAction::UpdateItems.ensure_allowed(self.status)?;
        require_actor(&cmd.actor, "actor")?;
        validate_items(&cmd.items)?;

        if cmd.items == self.items {
            return Ok(vec![]);
        }

        Ok(vec![TransferEvent::ItemsUpdated(ItemsUpdated {
            transfer_id: cmd.transfer_id,
            items: cmd.items.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_expected_arrival(
        &self,
        cmd: &UpdateExpectedArrival,
    ) -> Result<Vec<TransferEvent>, TransferError> {
        self.ensure_exists(cmd.transfer_id)?;
        TransferAction::UpdateExpectedArrival.ensure_allowed(self.status)?;
        require_actor(&cmd.actor, "actor")?;

        if cmd.expected_arrival < self.date_initiated {
            return Err(TransferError::invariant(
                "expected arrival cannot precede the initiation date",
            ));
        }
        if cmd.expected_arrival == self.expected_arrival {
            return Ok(vec![]);
        }

        Ok(vec![TransferEvent::ExpectedArrivalUpdated(ExpectedArrivalUpdated {
            transfer_id: cmd.transfer_id,
            expected_arrival: cmd.expected_arrival,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Shared builders for the domain tests in this crate.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::contract::TriggerCondition;

    pub fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap() + Duration::hours(hours)
    }

    pub fn create_command(id: TransferId, transfer_type: TransferType) -> CreateTransfer {
        CreateTransfer {
            transfer_id: id,
            transfer_type,
            origin: Location::new("WH-SEA-01", "Seattle Central"),
            destination: Location::new("WH-PDX-02", "Portland North"),
            items: vec![
                TransferItem::new("Industrial router", 3, 10_000),
                TransferItem::new("Rack rail kit", 2, 5_000),
            ],
            priority: Priority::High,
            smart_contract: None,
            expected_arrival: at(24 * 7),
            initiated_by: "ops.lead".to_string(),
            occurred_at: at(0),
        }
    }

    pub fn run(transfer: &mut Transfer, cmd: TransferCommand) -> Result<Vec<TransferEvent>, TransferError> {
        let events = transfer.handle(&cmd)?;
        for e in &events {
            transfer.apply(e);
        }
        Ok(events)
    }

    pub fn created_from(cmd: CreateTransfer) -> Transfer {
        let mut transfer = Transfer::empty(cmd.transfer_id);
        run(&mut transfer, TransferCommand::CreateTransfer(cmd)).unwrap();
        transfer
    }

    pub fn created_transfer() -> Transfer {
        created_from(create_command(TransferId::new(AggregateId::new()), TransferType::Inbound))
    }

    pub fn created_transfer_with_contract(trigger: TriggerCondition) -> Transfer {
        let mut cmd = create_command(TransferId::new(AggregateId::new()), TransferType::Inbound);
        cmd.smart_contract = Some(SmartContract::new("bank_transfer", 40_000, trigger).unwrap());
        created_from(cmd)
    }

    pub fn verify(transfer: &mut Transfer, step: VerificationStep, verifier: &str, hour: i64) {
        let cmd = TransferCommand::RecordVerification(RecordVerification {
            transfer_id: transfer.id_typed(),
            step,
            verifier: verifier.to_string(),
            verified: true,
            notes: None,
            occurred_at: at(hour),
        });
        run(transfer, cmd).unwrap();
    }

    pub fn try_advance(
        transfer: &mut Transfer,
        to: TransferStatus,
        hour: i64,
    ) -> Result<Vec<TransferEvent>, TransferError> {
        let cmd = TransferCommand::AdvanceStatus(AdvanceStatus {
            transfer_id: transfer.id_typed(),
            to,
            actor: "dispatcher".to_string(),
            reason: None,
            occurred_at: at(hour),
        });
        run(transfer, cmd)
    }

    pub fn advance(transfer: &mut Transfer, to: TransferStatus, hour: i64) {
        try_advance(transfer, to, hour).unwrap();
    }

    /// Walk a transfer forward to `target`, verifying each guard on the way.
    pub fn walk_to(transfer: &mut Transfer, target: TransferStatus) {
        let mut hour = 1;
        while transfer.status() != target {
            if let Some(step) = transfer.pending_guard() {
                verify(transfer, step, "checkpoint", hour);
            }
            let next = transfer.status().successor().expect("target is reachable");
            advance(transfer, next, hour);
            hour += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn create_emits_transfer_created_and_starts_scheduled() {
        let id = TransferId::new(AggregateId::new());
        let transfer = created_from(create_command(id, TransferType::Inbound));

        assert_eq!(transfer.status(), TransferStatus::Scheduled);
        assert_eq!(transfer.date_initiated(), at(0));
        assert_eq!(transfer.status_update_time(), at(0));
        assert_eq!(transfer.version(), 1);
        assert!(transfer.ledger().is_verified(VerificationStep::Creation));
        assert_eq!(transfer.timeline().len(), 1);
    }

    #[test]
    fn total_value_of_reference_transfer() {
        // $100 x 3 + $50 x 2, in cents.
        let transfer = created_transfer();
        assert_eq!(transfer.total_value(), 40_000);
    }

    #[test]
    fn create_twice_is_a_conflict() {
        let id = TransferId::new(AggregateId::new());
        let transfer = created_from(create_command(id, TransferType::Outbound));
        let err = transfer
            .handle(&TransferCommand::CreateTransfer(create_command(id, TransferType::Outbound)))
            .unwrap_err();
        assert!(matches!(err, TransferError::Conflict(_)));
    }

    #[test]
    fn create_rejects_arrival_before_initiation() {
        let id = TransferId::new(AggregateId::new());
        let mut cmd = create_command(id, TransferType::Inbound);
        cmd.expected_arrival = at(-1);
        let err = Transfer::empty(id)
            .handle(&TransferCommand::CreateTransfer(cmd))
            .unwrap_err();
        assert!(matches!(err, TransferError::InvariantViolation(_)));
    }

    #[test]
    fn create_rejects_empty_items() {
        let id = TransferId::new(AggregateId::new());
        let mut cmd = create_command(id, TransferType::Inbound);
        cmd.items.clear();
        assert!(matches!(
            Transfer::empty(id).handle(&TransferCommand::CreateTransfer(cmd)),
            Err(TransferError::InvariantViolation(_))
        ));
    }

    #[test]
    fn commands_on_missing_transfer_are_not_found() {
        let id = TransferId::new(AggregateId::new());
        let err = Transfer::empty(id)
            .handle(&TransferCommand::AdvanceStatus(AdvanceStatus {
                transfer_id: id,
                to: TransferStatus::InPreparation,
                actor: "ops".to_string(),
                reason: None,
                occurred_at: at(1),
            }))
            .unwrap_err();
        assert_eq!(err, TransferError::NotFound);
    }

    #[test]
    fn advancing_to_in_transit_without_shipping_fails_guard() {
        let mut transfer = created_transfer();
        advance(&mut transfer, TransferStatus::InPreparation, 1);
        let before = transfer.clone();

        let err = try_advance(&mut transfer, TransferStatus::InTransit, 2).unwrap_err();
        assert_eq!(err, TransferError::GuardNotSatisfied(VerificationStep::Shipping));
        assert_eq!(transfer, before);
    }

    #[test]
    fn verified_shipping_unlocks_in_transit() {
        let mut transfer = created_transfer();
        advance(&mut transfer, TransferStatus::InPreparation, 1);
        verify(&mut transfer, VerificationStep::Shipping, "dock-7", 2);
        let timeline_len = transfer.timeline().len();

        advance(&mut transfer, TransferStatus::InTransit, 3);

        assert_eq!(transfer.status(), TransferStatus::InTransit);
        assert_eq!(transfer.status_update_time(), at(3));
        assert_eq!(transfer.timeline().len(), timeline_len + 1);
    }

    #[test]
    fn skipping_forward_is_an_invalid_transition() {
        let mut transfer = created_transfer();
        let err = try_advance(&mut transfer, TransferStatus::InCustoms, 1).unwrap_err();
        assert_eq!(
            err,
            TransferError::InvalidTransition {
                from: TransferStatus::Scheduled,
                to: TransferStatus::InCustoms,
            }
        );
    }

    #[test]
    fn internal_transfer_skips_customs_submission() {
        let mut transfer = created_from(create_command(
            TransferId::new(AggregateId::new()),
            TransferType::Internal,
        ));
        walk_to(&mut transfer, TransferStatus::InTransit);

        advance(&mut transfer, TransferStatus::InCustoms, 10);
        assert!(!transfer.ledger().is_verified(VerificationStep::CustomsSubmission));

        let err = try_advance(&mut transfer, TransferStatus::QualityCheck, 11).unwrap_err();
        assert_eq!(err, TransferError::GuardNotSatisfied(VerificationStep::CustomsClearance));
    }

    #[test]
    fn rejection_is_allowed_from_any_open_status_and_is_terminal() {
        let mut transfer = created_transfer();
        walk_to(&mut transfer, TransferStatus::QualityCheck);

        let cmd = TransferCommand::AdvanceStatus(AdvanceStatus {
            transfer_id: transfer.id_typed(),
            to: TransferStatus::Rejected,
            actor: "qa.lead".to_string(),
            reason: Some("water damage".to_string()),
            occurred_at: at(20),
        });
        run(&mut transfer, cmd).unwrap();
        assert_eq!(transfer.status(), TransferStatus::Rejected);
        assert_eq!(transfer.timeline().last().unwrap().notes.as_deref(), Some("water damage"));

        let err = try_advance(&mut transfer, TransferStatus::Completed, 21).unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransition { .. }));
    }

    #[test]
    fn duplicate_verification_is_rejected() {
        let mut transfer = created_transfer();
        verify(&mut transfer, VerificationStep::Shipping, "dock-7", 1);

        let err = transfer
            .handle(&TransferCommand::RecordVerification(RecordVerification {
                transfer_id: transfer.id_typed(),
                step: VerificationStep::Shipping,
                verifier: "dock-9".to_string(),
                verified: true,
                notes: None,
                occurred_at: at(2),
            }))
            .unwrap_err();
        assert_eq!(err, TransferError::DuplicateVerification(VerificationStep::Shipping));
    }

    #[test]
    fn repeated_failed_verification_writes_nothing() {
        let mut transfer = created_transfer();
        let cmd = TransferCommand::RecordVerification(RecordVerification {
            transfer_id: transfer.id_typed(),
            step: VerificationStep::Shipping,
            verifier: "dock-7".to_string(),
            verified: false,
            notes: Some("seal broken".to_string()),
            occurred_at: at(1),
        });
        assert_eq!(run(&mut transfer, cmd.clone()).unwrap().len(), 1);
        assert!(run(&mut transfer, cmd).unwrap().is_empty());
        assert_eq!(transfer.ledger().for_step(VerificationStep::Shipping).count(), 1);
    }

    #[test]
    fn tracking_is_only_attachable_before_transit() {
        let mut transfer = created_transfer();
        let attach = |transfer: &Transfer, number: &str| {
            TransferCommand::AttachTracking(AttachTracking {
                transfer_id: transfer.id_typed(),
                carrier: "UPS".to_string(),
                tracking_number: number.to_string(),
                actor: "shipping.clerk".to_string(),
                occurred_at: at(1),
            })
        };

        let cmd_ = attach(&transfer, "1Z999");
        run(&mut transfer, cmd_).unwrap();
        assert_eq!(transfer.tracking().unwrap().tracking_number, "1Z999");

        walk_to(&mut transfer, TransferStatus::InTransit);
        let err = transfer.handle(&attach(&transfer, "1Z000")).unwrap_err();
        assert_eq!(
            err,
            TransferError::ActionNotAllowed {
                action: TransferAction::AttachTracking,
                status: TransferStatus::InTransit,
            }
        );
    }

    #[test]
    fn receipt_processing_records_receipt_at_destination() {
        let mut transfer = created_transfer();
        walk_to(&mut transfer, TransferStatus::InCustoms);

        let cmd = TransferCommand::ProcessReceipt(ProcessReceipt {
            transfer_id: transfer.id_typed(),
            receiver: "receiving.dock".to_string(),
            notes: None,
            occurred_at: at(30),
        });
        run(&mut transfer, cmd).unwrap();

        assert!(transfer.ledger().is_verified(VerificationStep::Receipt));
        assert_eq!(
            transfer.timeline().last().unwrap().location.as_deref(),
            Some("Portland North")
        );
    }

    #[test]
    fn contents_can_only_be_verified_during_quality_check() {
        let mut transfer = created_transfer();
        walk_to(&mut transfer, TransferStatus::InCustoms);
        let cmd = |transfer: &Transfer, passed: bool| {
            TransferCommand::VerifyContents(VerifyContents {
                transfer_id: transfer.id_typed(),
                inspector: "qa-1".to_string(),
                passed,
                notes: None,
                occurred_at: at(40),
            })
        };

        assert!(matches!(
            transfer.handle(&cmd(&transfer, true)),
            Err(TransferError::ActionNotAllowed { .. })
        ));

        walk_to(&mut transfer, TransferStatus::QualityCheck);
        let cmd_ = cmd(&transfer, false);
        run(&mut transfer, cmd_).unwrap();
        assert!(transfer.ledger().outstanding_failure(VerificationStep::QualityCheck).is_some());
        let cmd_ = cmd(&transfer, true);
        run(&mut transfer, cmd_).unwrap();
        assert!(transfer.ledger().is_verified(VerificationStep::QualityCheck));
    }

    #[test]
    fn items_are_frozen_once_in_transit() {
        let mut transfer = created_transfer();
        let update = |transfer: &Transfer| {
            TransferCommand::UpdateItems(UpdateItems {
                transfer_id: transfer.id_typed(),
                items: vec![TransferItem::new("Spare fan", 10, 1_500)],
                actor: "planner".to_string(),
                occurred_at: at(1),
            })
        };

        let cmd_ = update(&transfer);
        run(&mut transfer, cmd_).unwrap();
        assert_eq!(transfer.total_value(), 15_000);

        walk_to(&mut transfer, TransferStatus::InTransit);
        assert!(matches!(
            transfer.handle(&update(&transfer)),
            Err(TransferError::ActionNotAllowed { .. })
        ));
    }

    #[test]
    fn completed_transfer_accepts_no_more_commands() {
        let mut transfer = created_transfer();
        walk_to(&mut transfer, TransferStatus::Completed);

        let err = transfer
            .handle(&TransferCommand::UpdateExpectedArrival(UpdateExpectedArrival {
                transfer_id: transfer.id_typed(),
                expected_arrival: at(500),
                actor: "planner".to_string(),
                occurred_at: at(100),
            }))
            .unwrap_err();
        assert!(matches!(err, TransferError::ActionNotAllowed { .. }));
    }

    #[test]
    fn replaying_history_rebuilds_the_same_state() {
        let id = TransferId::new(AggregateId::new());
        let mut transfer = Transfer::empty(id);
        let mut history = Vec::new();
        history.extend(run(&mut transfer, TransferCommand::CreateTransfer(create_command(id, TransferType::Outbound))).unwrap());
        history.extend(try_advance(&mut transfer, TransferStatus::InPreparation, 1).unwrap());

        let rebuilt = Transfer::from_history(id, &history);
        assert_eq!(rebuilt, transfer);
    }

    fn any_target() -> impl Strategy<Value = TransferStatus> {
        prop::sample::select(TransferStatus::ALL.to_vec())
    }

    proptest! {
        /// Property: whatever sequence of advance requests arrives, a guarded
        /// transition only lands when its evidence was already on the ledger,
        /// and total value stays the sum of item totals.
        #[test]
        fn guards_are_sound_under_arbitrary_requests(
            requests in prop::collection::vec((any_target(), any::<bool>()), 1..30)
        ) {
            let mut transfer = created_transfer();
            for (hour, (target, verify_first)) in requests.into_iter().enumerate() {
                let hour = hour as i64 + 1;
                if verify_first {
                    if let Some(step) = transfer.pending_guard() {
                        verify(&mut transfer, step, "checkpoint", hour);
                    }
                }
                let from = transfer.status();
                let guard = from.exit_guard(transfer.transfer_type());
                let had_evidence = guard.map(|s| transfer.ledger().is_verified(s)).unwrap_or(true);

                if try_advance(&mut transfer, target, hour).is_ok() {
                    prop_assert!(from.can_transition_to(target));
                    if target != TransferStatus::Rejected {
                        prop_assert!(had_evidence);
                    }
                } else {
                    prop_assert_eq!(transfer.status(), from);
                }
                prop_assert_eq!(
                    transfer.total_value(),
                    transfer.items().iter().map(TransferItem::total_value).sum::<u64>()
                );
            }
        }
    }
}
