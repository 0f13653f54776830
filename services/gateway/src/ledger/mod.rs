//! The slot ledger: the authoritative store of reservations.
//!
//! The ledger is the only shared mutable state in the booking core. Both the
//! REST API and the live channel go through [`SlotLedger`], and every
//! implementation must make `create` atomic with respect to the existence
//! check: for concurrent creates of one `slot_time`, exactly one succeeds.

pub mod grid;
mod memory;
mod postgres;

pub use grid::{canonical_labels, slot_duration, SlotError, SlotPeriod, SlotTime};
pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use slotgate_id::{BookingId, UserId};
use thiserror::Error;

use crate::db::DbError;

/// The user a slot belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOwner {
    pub user_id: UserId,
    /// Username at booking time. Not updated afterwards.
    pub username: String,
}

/// A reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: BookingId,
    pub slot_time: SlotTime,
    pub period: SlotPeriod,
    pub owner: SlotOwner,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    /// Builds a fresh reservation.
    pub fn new(owner: SlotOwner, slot_time: SlotTime, period: SlotPeriod) -> Self {
        Self {
            id: BookingId::new(),
            slot_time,
            period,
            owner,
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner.user_id == user_id
    }
}

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The caller already holds this slot.
    #[error("slot {0} is already booked by the caller")]
    AlreadyBookedBySelf(SlotTime),

    /// Another user holds this slot.
    #[error("slot {slot_time} is already booked by {}", .owner.username)]
    BookedByOther { slot_time: SlotTime, owner: SlotOwner },

    /// No slot exists at this time.
    #[error("no booking at {0}")]
    NotFound(SlotTime),

    /// The slot exists but belongs to someone else.
    #[error("slot {slot_time} belongs to another user")]
    NotOwner { slot_time: SlotTime, owner: SlotOwner },

    /// The slot kept changing hands while the create was being classified.
    #[error("slot {0} is contended; retry")]
    Contended(SlotTime),

    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] DbError),
}

impl LedgerError {
    /// Returns true for either flavour of "slot already taken".
    pub fn is_already_booked(&self) -> bool {
        matches!(
            self,
            LedgerError::AlreadyBookedBySelf(_) | LedgerError::BookedByOther { .. }
        )
    }
}

/// Slot ledger interface.
#[async_trait]
pub trait SlotLedger: Send + Sync {
    /// Reserves `slot_time` for `owner`.
    ///
    /// Fails with [`LedgerError::AlreadyBookedBySelf`] or
    /// [`LedgerError::BookedByOther`] if any reservation exists at that time.
    async fn create(
        &self,
        owner: &SlotOwner,
        slot_time: SlotTime,
        period: SlotPeriod,
    ) -> Result<Slot, LedgerError>;

    /// Removes the reservation at `slot_time`, which must belong to `user_id`.
    async fn cancel(&self, user_id: UserId, slot_time: SlotTime) -> Result<Slot, LedgerError>;

    /// Returns the reservation at `slot_time`, if any.
    async fn get(&self, slot_time: SlotTime) -> Result<Option<Slot>, LedgerError>;

    /// Reservations starting on `day`, ordered by start time.
    async fn list_for_day(&self, day: NaiveDate) -> Result<Vec<Slot>, LedgerError>;

    /// Every reservation held by `user_id`, ordered by start time.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Slot>, LedgerError>;

    /// Checks that the backing store is reachable.
    async fn health_check(&self) -> Result<(), LedgerError>;
}

/// Classifies an existing reservation that blocked a create.
pub(crate) fn conflict(existing: Slot, requester: UserId) -> LedgerError {
    if existing.is_owned_by(requester) {
        LedgerError::AlreadyBookedBySelf(existing.slot_time)
    } else {
        LedgerError::BookedByOther {
            slot_time: existing.slot_time,
            owner: existing.owner,
        }
    }
}
