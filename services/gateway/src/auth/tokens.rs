//! Access token generation and hashing.
//!
//! Token format: `sg_at_<32 random bytes, base64url without padding>`.
//!
//! Tokens are handed to the client once; only the SHA-256 hex digest is
//! stored.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Access token prefix.
pub const ACCESS_TOKEN_PREFIX: &str = "sg_at_";

/// Default access token lifetime.
pub const DEFAULT_ACCESS_TOKEN_LIFETIME_MINUTES: i64 = 60;

/// Token bytes (32 bytes = 256 bits of entropy).
const TOKEN_BYTES: usize = 32;

/// Generate a new access token.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    format!("{}{}", ACCESS_TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

/// Returns true if `token` has the shape of an access token.
///
/// Only the prefix and the encoded length are checked; the store decides
/// whether the token is real.
pub fn looks_like_access_token(token: &str) -> bool {
    token
        .strip_prefix(ACCESS_TOKEN_PREFIX)
        .is_some_and(|body| URL_SAFE_NO_PAD.decode(body).is_ok_and(|b| b.len() == TOKEN_BYTES))
}

/// Hash a token for storage using SHA-256.
/// The hash is returned as a hex string.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
