//! Event envelope: the `{"event": ..., "data": ...}` frame shared by both directions.

use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::types::{
    event_names, BookSlotPayload, BookingErrorPayload, SlotClearedPayload, SlotUpdatedPayload,
    UnbookSlotPayload,
};

/// An event sent by a client over the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    BookSlot(BookSlotPayload),
    UnbookSlot(UnbookSlotPayload),
}

impl ClientEvent {
    /// Decodes a text frame.
    ///
    /// Unknown event names are reported separately from malformed payloads so
    /// the server can log them differently.
    pub fn decode(frame: &str) -> Result<Self, EventError> {
        let value: serde_json::Value = serde_json::from_str(frame)
            .map_err(|e| EventError::InvalidPayload(e.to_string()))?;

        let name = value
            .get("event")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EventError::InvalidPayload("missing event name".to_string()))?;

        if !event_names::CLIENT.contains(&name) {
            return Err(EventError::UnknownEventType(name.to_string()));
        }

        serde_json::from_value(value).map_err(|e| EventError::InvalidPayload(e.to_string()))
    }

    /// Returns the wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::BookSlot(_) => event_names::BOOK_SLOT,
            ClientEvent::UnbookSlot(_) => event_names::UNBOOK_SLOT,
        }
    }

    /// Encodes the event as a text frame.
    pub fn encode(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An event sent by the server, either to one connection or to the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    BookingError(BookingErrorPayload),
    SlotUpdated(SlotUpdatedPayload),
    SlotCleared(SlotClearedPayload),
}

impl ServerEvent {
    /// Builds a `booking-error` event.
    pub fn booking_error(message: impl Into<String>) -> Self {
        ServerEvent::BookingError(BookingErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BookingError(_) => event_names::BOOKING_ERROR,
            ServerEvent::SlotUpdated(_) => event_names::SLOT_UPDATED,
            ServerEvent::SlotCleared(_) => event_names::SLOT_CLEARED,
        }
    }

    /// Encodes the event as a text frame.
    pub fn encode(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a text frame. Used by clients and tests.
    pub fn decode(frame: &str) -> Result<Self, EventError> {
        serde_json::from_str(frame).map_err(|e| EventError::InvalidPayload(e.to_string()))
    }
}
