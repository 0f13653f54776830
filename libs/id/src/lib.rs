//! # slotgate-id
//!
//! Stable ID types, parsing, and validation for the slotgate booking gateway.
//!
//! ## ID Format
//!
//! All IDs use a prefixed format: `{prefix}_{ulid}`
//!
//! Examples:
//! - `usr_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `bkg_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `conn_01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! The prefix keeps a user id from being passed where a booking id is
//! expected, and the ULID keeps ids sortable by creation time.

mod error;
#[doc(hidden)]
pub mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
