//! In-process ledger.
//!
//! A single `RwLock` guards the map; `create` and `cancel` hold the write
//! lock across both the existence check and the mutation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use slotgate_id::UserId;
use tokio::sync::RwLock;
use tracing::debug;

use super::{conflict, LedgerError, Slot, SlotLedger, SlotOwner, SlotPeriod, SlotTime};

/// Ledger kept in memory. Used for local runs and tests.
#[derive(Default)]
pub struct MemoryLedger {
    slots: RwLock<BTreeMap<SlotTime, Slot>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotLedger for MemoryLedger {
    async fn create(
        &self,
        owner: &SlotOwner,
        slot_time: SlotTime,
        period: SlotPeriod,
    ) -> Result<Slot, LedgerError> {
        let mut slots = self.slots.write().await;

        if let Some(existing) = slots.get(&slot_time) {
            return Err(conflict(existing.clone(), owner.user_id));
        }

        let slot = Slot::new(owner.clone(), slot_time, period);
        slots.insert(slot_time, slot.clone());
        debug!(slot_time = %slot_time, user_id = %owner.user_id, "Slot created");
        Ok(slot)
    }

    async fn cancel(&self, user_id: UserId, slot_time: SlotTime) -> Result<Slot, LedgerError> {
        let mut slots = self.slots.write().await;

        let Some(existing) = slots.get(&slot_time) else {
            return Err(LedgerError::NotFound(slot_time));
        };

        if !existing.is_owned_by(user_id) {
            return Err(LedgerError::NotOwner {
                slot_time,
                owner: existing.owner.clone(),
            });
        }

        let removed = slots
            .remove(&slot_time)
            .ok_or(LedgerError::NotFound(slot_time))?;
        debug!(slot_time = %slot_time, user_id = %user_id, "Slot cancelled");
        Ok(removed)
    }

    async fn get(&self, slot_time: SlotTime) -> Result<Option<Slot>, LedgerError> {
        Ok(self.slots.read().await.get(&slot_time).cloned())
    }

    async fn list_for_day(&self, day: NaiveDate) -> Result<Vec<Slot>, LedgerError> {
        let slots = self.slots.read().await;
        Ok(slots
            .values()
            .filter(|slot| slot.slot_time.date() == day)
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Slot>, LedgerError> {
        let slots = self.slots.read().await;
        Ok(slots
            .values()
            .filter(|slot| slot.is_owned_by(user_id))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn owner(name: &str) -> SlotOwner {
        SlotOwner {
            user_id: UserId::new(),
            username: name.to_string(),
        }
    }

    fn at(day: u32, label: &str) -> SlotTime {
        SlotTime::on_day(NaiveDate::from_ymd_opt(2026, 10, day).unwrap(), label).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let ledger = MemoryLedger::new();
        let ada = owner("ada");
        let slot_time = at(19, "14:00");

        let slot = ledger
            .create(&ada, slot_time, SlotPeriod::for_time(slot_time))
            .await
            .unwrap();

        assert_eq!(slot.owner, ada);
        assert_eq!(slot.period, SlotPeriod::Pm);
        assert_eq!(ledger.get(slot_time).await.unwrap(), Some(slot));
    }

    #[tokio::test]
    async fn test_rebooking_distinguishes_self_from_other() {
        let ledger = MemoryLedger::new();
        let ada = owner("ada");
        let bob = owner("bob");
        let slot_time = at(19, "14:00");
        ledger.create(&ada, slot_time, SlotPeriod::Pm).await.unwrap();

        let err = ledger.create(&ada, slot_time, SlotPeriod::Pm).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyBookedBySelf(t) if t == slot_time));

        let err = ledger.create(&bob, slot_time, SlotPeriod::Pm).await.unwrap_err();
        match err {
            LedgerError::BookedByOther { owner, .. } => assert_eq!(owner.username, "ada"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_uniqueness_is_system_wide_not_per_user() {
        let ledger = MemoryLedger::new();
        let ada = owner("ada");
        ledger.create(&ada, at(19, "10:00"), SlotPeriod::Am).await.unwrap();
        ledger.create(&ada, at(19, "10:30"), SlotPeriod::Am).await.unwrap();
        ledger.create(&ada, at(20, "10:00"), SlotPeriod::Am).await.unwrap();
        assert_eq!(ledger.list_for_user(ada.user_id).await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_have_exactly_one_winner() {
        let ledger = Arc::new(MemoryLedger::new());
        let slot_time = at(19, "14:00");

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let ledger = ledger.clone();
                let contender = owner(&format!("user{i}"));
                tokio::spawn(async move {
                    ledger.create(&contender, slot_time, SlotPeriod::Pm).await
                })
            })
            .collect();

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) if e.is_already_booked() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(conflicts, 31);
    }

    #[tokio::test]
    async fn test_cancel_by_non_owner_is_rejected() {
        let ledger = MemoryLedger::new();
        let ada = owner("ada");
        let bob = owner("bob");
        let slot_time = at(19, "09:00");
        ledger.create(&ada, slot_time, SlotPeriod::Am).await.unwrap();

        let err = ledger.cancel(bob.user_id, slot_time).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner { .. }));
        assert!(ledger.get(slot_time).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_missing_slot() {
        let ledger = MemoryLedger::new();
        let err = ledger
            .cancel(UserId::new(), at(19, "09:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_frees_slot_for_others() {
        let ledger = MemoryLedger::new();
        let ada = owner("ada");
        let bob = owner("bob");
        let slot_time = at(19, "14:00");
        ledger.create(&ada, slot_time, SlotPeriod::Pm).await.unwrap();

        let removed = ledger.cancel(ada.user_id, slot_time).await.unwrap();
        assert_eq!(removed.owner, ada);

        let slot = ledger.create(&bob, slot_time, SlotPeriod::Pm).await.unwrap();
        assert_eq!(slot.owner, bob);
    }

    #[tokio::test]
    async fn test_list_for_day_is_ordered_and_filtered() {
        let ledger = MemoryLedger::new();
        let ada = owner("ada");
        let bob = owner("bob");
        ledger.create(&bob, at(19, "16:30"), SlotPeriod::Pm).await.unwrap();
        ledger.create(&ada, at(19, "08:00"), SlotPeriod::Am).await.unwrap();
        ledger.create(&ada, at(20, "07:00"), SlotPeriod::Am).await.unwrap();
        ledger.create(&bob, at(19, "12:00"), SlotPeriod::Pm).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let labels: Vec<String> = ledger
            .list_for_day(day)
            .await
            .unwrap()
            .iter()
            .map(|slot| slot.slot_time.label())
            .collect();
        assert_eq!(labels, vec!["08:00", "12:00", "16:30"]);
    }
}
