//! Payload definitions for each channel event.

use serde::{Deserialize, Serialize};
use slotgate_id::UserId;

// =============================================================================
// Event Name Constants
// =============================================================================

/// All event names as constants.
pub mod event_names {
    // Client -> server
    pub const BOOK_SLOT: &str = "book-slot";
    pub const UNBOOK_SLOT: &str = "unbook-slot";

    // Server -> requester
    pub const BOOKING_ERROR: &str = "booking-error";

    // Server -> group
    pub const SLOT_UPDATED: &str = "slot-updated";
    pub const SLOT_CLEARED: &str = "slot-cleared";

    /// Names a client may send.
    pub const CLIENT: &[&str] = &[BOOK_SLOT, UNBOOK_SLOT];
}

// =============================================================================
// Client Payloads
// =============================================================================

/// Payload for `book-slot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSlotPayload {
    /// Slot start as `HH:MM` on today's date.
    pub slot_time: String,

    /// Half-day label (`AM`/`PM`) sent by clients. Optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_period: Option<String>,
}

/// Payload for `unbook-slot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnbookSlotPayload {
    /// Slot start as `HH:MM` on today's date.
    pub slot_time: String,
}

// =============================================================================
// Server Payloads
// =============================================================================

/// Payload for `booking-error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingErrorPayload {
    pub message: String,
}

/// Payload for `slot-updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUpdatedPayload {
    /// `HH:MM`.
    pub slot_time: String,
    /// `YYYY-MM-DD`.
    pub slot_date: String,
    pub user_id: UserId,
    pub username: String,
}

/// Payload for `slot-cleared`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotClearedPayload {
    /// `HH:MM`.
    pub slot_time: String,
    /// `YYYY-MM-DD`.
    pub slot_date: String,
}
