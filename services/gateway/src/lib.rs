//! Slotgate gateway library.
//!
//! The crate ships the `slotgate` binary; the library surface exists so the
//! integration tests can assemble the router over in-memory backends.

pub mod api;
pub mod auth;
pub mod channel;
pub mod clock;
pub mod config;
pub mod db;
pub mod device;
pub mod entitlement;
pub mod ledger;
pub mod state;
