//! Live booking channel.
//!
//! A connection authenticates once when it is opened, is recorded in the
//! [`ConnectionRegistry`], and joins the [`BroadcastGroup`]. Each client event
//! is handled by [`LiveChannel`]; successful mutations go to the whole group
//! and failures go back to the requester only.

mod group;
mod handler;
mod registry;

pub use group::{BroadcastGroup, DEFAULT_GROUP_CAPACITY};
pub use handler::LiveChannel;
pub use registry::{ConnectionRegistry, Peer, Registration};

use slotgate_events::{ServerEvent, SlotClearedPayload, SlotUpdatedPayload};

use crate::ledger::Slot;

/// Texts of `booking-error` events.
pub mod messages {
    pub const INVALID_SLOT: &str = "Invalid slot selected";
    pub const AUTHENTICATION_REQUIRED: &str = "Authentication required";
    pub const ALREADY_BOOKED_BY_SELF: &str = "You already booked this slot";
    pub const NOT_OWNER: &str = "You can only unbook your own slot";
    pub const MALFORMED_EVENT: &str = "Malformed event";
    pub const BOOKING_FAILED: &str = "Server error during booking";
    pub const UNBOOKING_FAILED: &str = "Server error during unbooking";

    pub fn booked_by(username: &str) -> String {
        format!("Slot already booked by {username}")
    }
}

/// `slot-updated` for a new reservation.
pub fn slot_updated(slot: &Slot) -> ServerEvent {
    ServerEvent::SlotUpdated(SlotUpdatedPayload {
        slot_time: slot.slot_time.label(),
        slot_date: slot.slot_time.date().to_string(),
        user_id: slot.owner.user_id,
        username: slot.owner.username.clone(),
    })
}

/// `slot-cleared` for a cancelled reservation.
pub fn slot_cleared(slot: &Slot) -> ServerEvent {
    ServerEvent::SlotCleared(SlotClearedPayload {
        slot_time: slot.slot_time.label(),
        slot_date: slot.slot_time.date().to_string(),
    })
}
