//! Entitlement: does a user hold a slot that is active right now?
//!
//! The check reads every reservation the user holds rather than only today's,
//! so a slot starting at 23:30 still grants access at midnight.

use std::sync::Arc;

use chrono::NaiveDateTime;
use slotgate_id::UserId;

use crate::ledger::{LedgerError, Slot, SlotLedger};

/// Answers entitlement questions against the ledger. Holds no state of its own.
#[derive(Clone)]
pub struct EntitlementChecker {
    ledger: Arc<dyn SlotLedger>,
}

impl EntitlementChecker {
    pub fn new(ledger: Arc<dyn SlotLedger>) -> Self {
        Self { ledger }
    }

    /// Returns the slot that makes `user_id` entitled at `now`, if any.
    pub async fn active_slot(
        &self,
        user_id: UserId,
        now: NaiveDateTime,
    ) -> Result<Option<Slot>, LedgerError> {
        let slots = self.ledger.list_for_user(user_id).await?;
        Ok(slots
            .into_iter()
            .find(|slot| slot.slot_time.contains(now)))
    }

    /// True iff `now` lies within `[start, start + 30min]` of one of the
    /// user's slots.
    pub async fn is_active(
        &self,
        user_id: UserId,
        now: NaiveDateTime,
    ) -> Result<bool, LedgerError> {
        Ok(self.active_slot(user_id, now).await?.is_some())
    }
}
