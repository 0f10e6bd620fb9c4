//! Live transfer snapshots with per-transfer serialization.
//!
//! Every transfer lives in its own slot guarded by a `tokio::sync::Mutex`.
//! The id → slot map is only locked long enough to look up or insert a slot,
//! so operations on different transfers never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use waypoint_transfers::{Transfer, TransferId};

pub type TransferSlot = Arc<Mutex<Transfer>>;

/// Slot map poisoned by a panicking writer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transfer slot map lock poisoned")]
pub struct SlotMapPoisoned;

#[derive(Debug, Default)]
pub struct TransferStore {
    slots: RwLock<HashMap<TransferId, TransferSlot>>,
}

impl TransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of an existing transfer, if any.
    pub fn slot(&self, id: TransferId) -> Result<Option<TransferSlot>, SlotMapPoisoned> {
        let slots = self.slots.read().map_err(|_| SlotMapPoisoned)?;
        Ok(slots.get(&id).cloned())
    }

    /// Slot for `id`, inserting an empty (not yet created) transfer when missing.
    ///
    /// Two concurrent creations of the same id end up on the same slot, so the
    /// second one observes the first and fails with a conflict.
    pub fn slot_or_insert(&self, id: TransferId) -> Result<TransferSlot, SlotMapPoisoned> {
        let mut slots = self.slots.write().map_err(|_| SlotMapPoisoned)?;
        Ok(slots
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(Transfer::empty(id))))
            .clone())
    }

    /// Whether `slot` is still the one registered for `id`.
    pub fn is_registered(&self, id: TransferId, slot: &TransferSlot) -> Result<bool, SlotMapPoisoned> {
        let slots = self.slots.read().map_err(|_| SlotMapPoisoned)?;
        Ok(slots.get(&id).is_some_and(|current| Arc::ptr_eq(current, slot)))
    }

    /// Unregister `slot` if it is still the one for `id`. Called with the slot
    /// locked after a creation that committed nothing.
    pub fn discard(&self, id: TransferId, slot: &TransferSlot) -> Result<(), SlotMapPoisoned> {
        let mut slots = self.slots.write().map_err(|_| SlotMapPoisoned)?;
        if slots.get(&id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(&id);
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize, SlotMapPoisoned> {
        let slots = self.slots.read().map_err(|_| SlotMapPoisoned)?;
        Ok(slots.len())
    }

    /// Every slot currently registered (created or not).
    pub fn all_slots(&self) -> Result<Vec<TransferSlot>, SlotMapPoisoned> {
        let slots = self.slots.read().map_err(|_| SlotMapPoisoned)?;
        Ok(slots.values().cloned().collect())
    }

    /// Consistent copy of one created transfer.
    pub async fn snapshot(&self, id: TransferId) -> Result<Option<Transfer>, SlotMapPoisoned> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let transfer = slot.lock().await;
        Ok(transfer.is_created().then(|| transfer.clone()))
    }

    /// Copies of every created transfer. Each copy is consistent on its own;
    /// the set as a whole is not a single point-in-time cut.
    pub async fn snapshots(&self) -> Result<Vec<Transfer>, SlotMapPoisoned> {
        let mut out = Vec::new();
        for slot in self.all_slots()? {
            let transfer = slot.lock().await;
            if transfer.is_created() {
                out.push(transfer.clone());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::AggregateId;

    #[tokio::test]
    async fn uncreated_slots_are_invisible_to_reads() {
        let store = TransferStore::new();
        let id = TransferId::new(AggregateId::new());

        let slot = store.slot_or_insert(id).unwrap();
        assert!(Arc::ptr_eq(&slot, &store.slot_or_insert(id).unwrap()));

        assert_eq!(store.snapshot(id).await.unwrap(), None);
        assert!(store.snapshots().await.unwrap().is_empty());
        assert!(store.slot(TransferId::new(AggregateId::new())).unwrap().is_none());
    }

    #[tokio::test]
    async fn discard_only_removes_the_registered_slot() {
        let store = TransferStore::new();
        let id = TransferId::new(AggregateId::new());

        let stale = store.slot_or_insert(id).unwrap();
        store.discard(id, &stale).unwrap();
        assert_eq!(store.len().unwrap(), 0);
        assert!(!store.is_registered(id, &stale).unwrap());

        let fresh = store.slot_or_insert(id).unwrap();
        store.discard(id, &stale).unwrap();
        assert!(store.is_registered(id, &fresh).unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }
}
