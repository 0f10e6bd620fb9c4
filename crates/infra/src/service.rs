//! Transfer command execution and queries.
//!
//! ```text
//! Command
//!   ↓
//! 1. Lock the transfer's slot (serializes every write to that transfer),
//!    then stamp the command from the clock when one is configured
//!   ↓
//! 2. Handle command against the live snapshot (pure, produces events)
//!   ↓
//! 3. Apply to a working copy; if the status moved, let the settlement
//!    engine add its payment event
//!   ↓
//! 4. Append to the event store (ExpectedVersion::Exact)
//!   ↓
//! 5. Swap the working copy in, publish envelopes to the bus
//! ```
//!
//! Nothing between the handle step and the swap awaits, so a guard check and
//! the writes it allows are atomic with respect to other callers. A caller that
//! is dropped while waiting for the slot lock leaves no trace, and a creation
//! that commits nothing unregisters the slot it inserted.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use waypoint_core::{Aggregate, AggregateRoot, ExpectedVersion};
use waypoint_events::{EventBus, EventEnvelope};
use waypoint_transfers::settlement;
use waypoint_transfers::{
    AdvanceStatus, AttachTracking, CreateTransfer, PaymentStatus, ProcessReceipt, RecordVerification,
    Transfer, TransferCommand, TransferError, TransferEvent, TransferId, UpdateExpectedArrival, UpdateItems,
    VerifyContents,
};

use crate::analytics::{self, AggregateMetrics};
use crate::config::EngineConfig;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::query::{TransferFilter, TransferView};
use crate::transfer_store::{SlotMapPoisoned, TransferSlot, TransferStore};

/// Aggregate type recorded on every stored transfer event.
pub const AGGREGATE_TYPE: &str = "logistics.transfer";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The event store saw a different stream version than the live snapshot.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("store failure: {0}")]
    Store(String),

    /// Events are committed; only the fan-out failed.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for ServiceError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => ServiceError::Concurrency(msg),
            other => ServiceError::Store(other.to_string()),
        }
    }
}

impl From<SlotMapPoisoned> for ServiceError {
    fn from(value: SlotMapPoisoned) -> Self {
        ServiceError::Store(value.to_string())
    }
}

impl ServiceError {
    pub fn transfer_error(&self) -> Option<&TransferError> {
        match self {
            ServiceError::Transfer(err) => Some(err),
            _ => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Source of command timestamps, read once the transfer's lock is held so
/// that commit order and timestamps agree.
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>);

impl Clock {
    pub fn new(now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self(Arc::new(now))
    }

    pub fn system() -> Self {
        Self::new(Utc::now)
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.0)()
    }
}

impl core::fmt::Debug for Clock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Clock")
    }
}

/// The engine's entry point: owns the live transfers, the event store and the bus.
#[derive(Debug)]
pub struct TransferService<S, B> {
    store: S,
    bus: B,
    transfers: TransferStore,
    config: EngineConfig,
    clock: Option<Clock>,
}

impl<S, B> TransferService<S, B> {
    /// Commands keep the `occurred_at` their caller gave them.
    pub fn new(store: S, bus: B, config: EngineConfig) -> Self {
        Self {
            store,
            bus,
            transfers: TransferStore::new(),
            config,
            clock: None,
        }
    }

    /// Restamp every command from `clock` once its transfer is locked.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of registered transfer slots.
    pub fn slot_count(&self) -> ServiceResult<usize> {
        Ok(self.transfers.len()?)
    }

    fn stamp(&self, requested: DateTime<Utc>) -> DateTime<Utc> {
        self.clock.as_ref().map_or(requested, Clock::now)
    }
}

impl<S, B> TransferService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[tracing::instrument(skip(self, cmd), fields(transfer_id = %cmd.transfer_id, transfer_type = %cmd.transfer_type))]
    pub async fn create(&self, cmd: CreateTransfer) -> ServiceResult<TransferView> {
        let (transfer, now) = self.execute(TransferCommand::CreateTransfer(cmd)).await?;
        info!(total_value = transfer.total_value(), "transfer created");
        Ok(self.view(transfer, now))
    }

    #[tracing::instrument(skip(self, cmd), fields(transfer_id = %cmd.transfer_id, step = %cmd.step, verified = cmd.verified))]
    pub async fn record_verification(&self, cmd: RecordVerification) -> ServiceResult<TransferView> {
        let (transfer, now) = self.execute(TransferCommand::RecordVerification(cmd)).await?;
        Ok(self.view(transfer, now))
    }

    #[tracing::instrument(skip(self, cmd), fields(transfer_id = %cmd.transfer_id, to = %cmd.to))]
    pub async fn advance(&self, cmd: AdvanceStatus) -> ServiceResult<TransferView> {
        let (transfer, now) = self.execute(TransferCommand::AdvanceStatus(cmd)).await?;
        info!(status = %transfer.status(), "transfer advanced");
        Ok(self.view(transfer, now))
    }

    #[tracing::instrument(skip(self, cmd), fields(transfer_id = %cmd.transfer_id))]
    pub async fn attach_tracking(&self, cmd: AttachTracking) -> ServiceResult<TransferView> {
        let (transfer, now) = self.execute(TransferCommand::AttachTracking(cmd)).await?;
        Ok(self.view(transfer, now))
    }

    #[tracing::instrument(skip(self, cmd), fields(transfer_id = %cmd.transfer_id))]
    pub async fn process_receipt(&self, cmd: ProcessReceipt) -> ServiceResult<TransferView> {
        let (transfer, now) = self.execute(TransferCommand::ProcessReceipt(cmd)).await?;
        Ok(self.view(transfer, now))
    }

    #[tracing::instrument(skip(self, cmd), fields(transfer_id = %cmd.transfer_id, passed = cmd.passed))]
    pub async fn verify_contents(&self, cmd: VerifyContents) -> ServiceResult<TransferView> {
        let (transfer, now) = self.execute(TransferCommand::VerifyContents(cmd)).await?;
        Ok(self.view(transfer, now))
    }

    #[tracing::instrument(skip(self, cmd), fields(transfer_id = %cmd.transfer_id, items = cmd.items.len()))]
    pub async fn update_items(&self, cmd: UpdateItems) -> ServiceResult<TransferView> {
        let (transfer, now) = self.execute(TransferCommand::UpdateItems(cmd)).await?;
        Ok(self.view(transfer, now))
    }

    #[tracing::instrument(skip(self, cmd), fields(transfer_id = %cmd.transfer_id))]
    pub async fn update_expected_arrival(&self, cmd: UpdateExpectedArrival) -> ServiceResult<TransferView> {
        let (transfer, now) = self.execute(TransferCommand::UpdateExpectedArrival(cmd)).await?;
        Ok(self.view(transfer, now))
    }

    /// Re-run the settlement engine for one transfer.
    ///
    /// Returns the payment status after evaluation (`None` without a contract).
    /// Calling it again after settlement changes nothing.
    #[tracing::instrument(skip(self), fields(transfer_id = %id))]
    pub async fn evaluate_settlement(
        &self,
        id: TransferId,
        at: DateTime<Utc>,
    ) -> ServiceResult<Option<PaymentStatus>> {
        let slot = self.transfers.slot(id)?.ok_or(TransferError::NotFound)?;
        let mut current = slot.lock().await;
        if !current.is_created() {
            return Err(TransferError::NotFound.into());
        }
        let at = self.stamp(at);

        if let Some(payment) = self.settlement_event(&current, at) {
            let committed = self.append(id, current.version(), std::slice::from_ref(&payment))?;
            current.apply(&payment);
            self.publish(&committed)?;
        }

        Ok(current.smart_contract().map(|c| c.payment_status()))
    }

    #[tracing::instrument(skip(self), fields(transfer_id = %id))]
    pub async fn get(&self, id: TransferId, now: DateTime<Utc>) -> ServiceResult<TransferView> {
        let transfer = self.transfers.snapshot(id).await?.ok_or(TransferError::NotFound)?;
        Ok(self.view(transfer, now))
    }

    #[tracing::instrument(skip(self, filter))]
    pub async fn list(&self, filter: &TransferFilter, now: DateTime<Utc>) -> ServiceResult<Vec<TransferView>> {
        let views = self
            .transfers
            .snapshots()
            .await?
            .into_iter()
            .map(|t| self.view(t, now));
        Ok(filter.apply(views))
    }

    /// Metrics over every transfer; `window` defaults to the configured one.
    #[tracing::instrument(skip(self))]
    pub async fn metrics(&self, window: Option<Duration>, now: DateTime<Utc>) -> ServiceResult<AggregateMetrics> {
        let transfers = self.transfers.snapshots().await?;
        let window = window.unwrap_or(self.config.metrics_window);
        Ok(analytics::aggregate(&transfers, window, now, &self.config.criticality))
    }

    /// Rebuild a transfer from its stored stream alone.
    pub fn replay(&self, id: TransferId) -> ServiceResult<Transfer> {
        let stream = self.store.load_stream(id.aggregate_id())?;
        if stream.is_empty() {
            return Err(TransferError::NotFound.into());
        }

        let events = stream
            .iter()
            .map(StoredEvent::decode::<TransferEvent>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Transfer::from_history(id, &events))
    }

    fn view(&self, transfer: Transfer, now: DateTime<Utc>) -> TransferView {
        TransferView::build(transfer, now, &self.config.criticality)
    }

    async fn execute(&self, mut command: TransferCommand) -> ServiceResult<(Transfer, DateTime<Utc>)> {
        let id = command.transfer_id();
        let creating = matches!(command, TransferCommand::CreateTransfer(_));
        let (slot, mut current) = self.lock(id, creating).await?;

        let at = self.stamp(command.occurred_at());
        command.set_occurred_at(at);

        let result = self.commit(&mut current, &command);
        if creating && result.is_err() && !current.is_created() {
            self.transfers.discard(id, &slot)?;
        }
        result.map(|transfer| (transfer, at))
    }

    async fn lock(&self, id: TransferId, creating: bool) -> ServiceResult<(TransferSlot, OwnedMutexGuard<Transfer>)> {
        if !creating {
            let slot = self.transfers.slot(id)?.ok_or(TransferError::NotFound)?;
            let guard = slot.clone().lock_owned().await;
            return Ok((slot, guard));
        }

        loop {
            let slot = self.transfers.slot_or_insert(id)?;
            let guard = slot.clone().lock_owned().await;
            // A failed creation may have discarded this slot while we waited.
            if self.transfers.is_registered(id, &slot)? {
                return Ok((slot, guard));
            }
        }
    }

    fn commit(&self, current: &mut Transfer, command: &TransferCommand) -> ServiceResult<Transfer> {
        let id = command.transfer_id();
        let mut events = current.handle(command)?;
        if events.is_empty() {
            debug!("command repeated state already on record; nothing written");
            return Ok(current.clone());
        }

        let mut working = current.clone();
        for event in &events {
            working.apply(event);
        }

        if events.iter().any(|e| matches!(e, TransferEvent::StatusChanged(_))) {
            if let Some(payment) = self.settlement_event(&working, command.occurred_at()) {
                working.apply(&payment);
                events.push(payment);
            }
        }

        let committed = self.append(id, current.version(), &events)?;
        *current = working;
        self.publish(&committed)?;

        Ok(current.clone())
    }

    /// Settlement errors are logged and leave the payment untouched.
    fn settlement_event(&self, transfer: &Transfer, at: DateTime<Utc>) -> Option<TransferEvent> {
        match settlement::settle(transfer, at) {
            Ok(Some(event)) => {
                if let TransferEvent::PaymentSettled(payment) = &event {
                    info!(
                        contract_id = %payment.contract_id,
                        amount = payment.amount,
                        outcome = %payment.outcome,
                        trigger = %payment.trigger,
                        "payment settled"
                    );
                }
                Some(event)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(transfer_id = %transfer.id_typed(), error = %err, "settlement evaluation rejected");
                None
            }
        }
    }

    fn append(
        &self,
        id: TransferId,
        current_version: u64,
        events: &[TransferEvent],
    ) -> ServiceResult<Vec<StoredEvent>> {
        let uncommitted = events
            .iter()
            .map(|e| UncommittedEvent::from_typed(id.aggregate_id(), AGGREGATE_TYPE, Uuid::now_v7(), e))
            .collect::<Result<Vec<_>, _>>()?;

        let expected = match current_version {
            0 => ExpectedVersion::NoStream,
            v => ExpectedVersion::Exact(v),
        };

        Ok(self.store.append(uncommitted, expected)?)
    }

    fn publish(&self, committed: &[StoredEvent]) -> ServiceResult<()> {
        for e in committed {
            self.bus
                .publish(e.to_envelope())
                .map_err(|err| ServiceError::Publish(format!("{err:?}")))?;
        }
        Ok(())
    }
}
