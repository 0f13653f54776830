//! # slotgate-events
//!
//! Wire protocol of the live booking channel.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": {...}}`. Field names inside `data` are
//! camelCase.
//!
//! ## Client events
//! - `book-slot`: reserve a half-hour slot for today
//! - `unbook-slot`: release a slot held by the caller
//!
//! ## Server events
//! - `booking-error`: sent only to the connection that caused it
//! - `slot-updated`: broadcast to every connection after a booking
//! - `slot-cleared`: broadcast to every connection after a cancellation

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
