//! Per-event handling for live connections.
//!
//! Every outcome is either a broadcast to the group or a single reply for the
//! requester. Ledger errors never escape [`LiveChannel::handle`].

use std::sync::Arc;

use slotgate_events::{BookSlotPayload, ClientEvent, ServerEvent, UnbookSlotPayload};
use slotgate_id::ConnectionId;
use tracing::{debug, error, warn};

use super::group::BroadcastGroup;
use super::messages;
use super::registry::{ConnectionRegistry, Peer};
use super::{slot_cleared, slot_updated};
use crate::clock::Clock;
use crate::ledger::{LedgerError, Slot, SlotError, SlotLedger, SlotOwner, SlotPeriod, SlotTime};

/// Shared state of the live booking channel.
#[derive(Clone)]
pub struct LiveChannel {
    ledger: Arc<dyn SlotLedger>,
    registry: ConnectionRegistry,
    group: BroadcastGroup,
    clock: Arc<dyn Clock>,
}

impl LiveChannel {
    pub fn new(ledger: Arc<dyn SlotLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            registry: ConnectionRegistry::new(),
            group: BroadcastGroup::default(),
            clock,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn group(&self) -> &BroadcastGroup {
        &self.group
    }

    /// Announces a booking made outside the channel.
    pub fn publish_booked(&self, slot: &Slot) -> usize {
        self.group.publish(slot_updated(slot))
    }

    /// Announces a cancellation made outside the channel.
    pub fn publish_cleared(&self, slot: &Slot) -> usize {
        self.group.publish(slot_cleared(slot))
    }

    /// Decodes and handles one text frame. Returns the reply for the sender,
    /// if any.
    pub async fn handle_frame(
        &self,
        connection_id: ConnectionId,
        frame: &str,
    ) -> Option<ServerEvent> {
        match ClientEvent::decode(frame) {
            Ok(event) => self.handle(connection_id, event).await,
            Err(e) => {
                warn!(error = %e, connection_id = %connection_id, "Dropping malformed event");
                Some(ServerEvent::booking_error(messages::MALFORMED_EVENT))
            }
        }
    }

    pub async fn handle(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Option<ServerEvent> {
        debug!(connection_id = %connection_id, event = event.name(), "Handling event");
        match event {
            ClientEvent::BookSlot(payload) => self.book(connection_id, payload).await,
            ClientEvent::UnbookSlot(payload) => self.unbook(connection_id, payload).await,
        }
    }

    async fn book(
        &self,
        connection_id: ConnectionId,
        payload: BookSlotPayload,
    ) -> Option<ServerEvent> {
        let resolved = self.slot_time(&payload.slot_time).and_then(|slot_time| {
            SlotPeriod::resolve(payload.slot_period.as_deref(), slot_time)
                .map(|period| (slot_time, period))
        });
        let (slot_time, period) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(error = %e, connection_id = %connection_id, "Rejected slot");
                return Some(ServerEvent::booking_error(messages::INVALID_SLOT));
            }
        };

        let Some(peer) = self.peer(connection_id) else {
            return Some(ServerEvent::booking_error(messages::AUTHENTICATION_REQUIRED));
        };
        let owner = SlotOwner {
            user_id: peer.user_id,
            username: peer.username,
        };

        match self.ledger.create(&owner, slot_time, period).await {
            Ok(slot) => {
                self.publish_booked(&slot);
                None
            }
            Err(LedgerError::AlreadyBookedBySelf(_)) => {
                Some(ServerEvent::booking_error(messages::ALREADY_BOOKED_BY_SELF))
            }
            Err(LedgerError::BookedByOther { owner, .. }) => {
                Some(ServerEvent::booking_error(messages::booked_by(&owner.username)))
            }
            Err(e) => {
                error!(
                    error = %e,
                    connection_id = %connection_id,
                    slot_time = %slot_time,
                    "Failed to book slot"
                );
                Some(ServerEvent::booking_error(messages::BOOKING_FAILED))
            }
        }
    }

    async fn unbook(
        &self,
        connection_id: ConnectionId,
        payload: UnbookSlotPayload,
    ) -> Option<ServerEvent> {
        let slot_time = match self.slot_time(&payload.slot_time) {
            Ok(slot_time) => slot_time,
            Err(e) => {
                debug!(error = %e, connection_id = %connection_id, "Rejected slot");
                return Some(ServerEvent::booking_error(messages::INVALID_SLOT));
            }
        };

        let Some(peer) = self.peer(connection_id) else {
            return Some(ServerEvent::booking_error(messages::AUTHENTICATION_REQUIRED));
        };

        match self.ledger.cancel(peer.user_id, slot_time).await {
            Ok(slot) => {
                self.publish_cleared(&slot);
                None
            }
            Err(LedgerError::NotFound(_) | LedgerError::NotOwner { .. }) => {
                Some(ServerEvent::booking_error(messages::NOT_OWNER))
            }
            Err(e) => {
                error!(
                    error = %e,
                    connection_id = %connection_id,
                    slot_time = %slot_time,
                    "Failed to unbook slot"
                );
                Some(ServerEvent::booking_error(messages::UNBOOKING_FAILED))
            }
        }
    }

    /// Channel slot labels are always for the current local day.
    fn slot_time(&self, label: &str) -> Result<SlotTime, SlotError> {
        SlotTime::on_day(self.clock.now().date(), label)
    }

    fn peer(&self, connection_id: ConnectionId) -> Option<Peer> {
        let peer = self.registry.lookup(connection_id);
        if peer.is_none() {
            warn!(connection_id = %connection_id, "Event from unregistered connection");
        }
        peer
    }
}
