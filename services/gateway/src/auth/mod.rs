//! Identity: registration, login, and bearer-token resolution.
//!
//! The booking core only asks one question of this module: "which user does
//! this token belong to?" ([`Authenticator::resolve`]). Everything else here
//! exists to issue and revoke those tokens.

mod passwords;
mod postgres;
mod store;
pub mod tokens;

pub use postgres::PgIdentityStore;
pub use store::{AccessTokenRecord, IdentityError, IdentityStore, MemoryIdentityStore, UserRecord};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use slotgate_id::{TokenId, UserId};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::DbError;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 64;

/// Longest accepted password.
pub const MAX_PASSWORD_LEN: usize = 128;

/// A resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// A freshly issued access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username: {0}")]
    InvalidUsername(&'static str),

    #[error("invalid password: {0}")]
    InvalidPassword(&'static str),

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    /// Wrong username or password. Deliberately does not say which.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The presented token does not identify a user.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::UsernameTaken(name) => AuthError::UsernameTaken(name),
            IdentityError::Storage(e) => AuthError::Storage(e),
        }
    }
}

/// Issues and resolves access tokens.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn IdentityStore>,
    token_lifetime: Duration,
}

impl Authenticator {
    pub fn new(store: Arc<dyn IdentityStore>, token_lifetime: Duration) -> Self {
        Self {
            store,
            token_lifetime,
        }
    }

    /// Creates a user. The username is trimmed before it is stored.
    pub async fn register(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let username = validate_username(username)?;
        validate_password(password)?;

        let user = UserRecord {
            id: UserId::new(),
            username: username.to_string(),
            password_hash: passwords::hash_password(password)
                .map_err(|e| AuthError::Hashing(e.to_string()))?,
            created_at: Utc::now(),
        };
        self.store.insert_user(&user).await?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(Identity {
            user_id: user.id,
            username: user.username,
        })
    }

    /// Verifies credentials and issues a new access token.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let user = self
            .store
            .find_user_by_name(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !passwords::verify_password(password, &user.password_hash) {
            debug!(user_id = %user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let token = tokens::generate_access_token();
        let now = Utc::now();
        let record = AccessTokenRecord {
            id: TokenId::new(),
            token_hash: tokens::hash_token(&token),
            user_id: user.id,
            expires_at: now + self.token_lifetime,
            revoked_at: None,
            created_at: now,
        };
        self.store.insert_token(&record).await?;

        info!(user_id = %user.id, token_id = %record.id, "Access token issued");
        Ok(IssuedToken {
            token,
            expires_at: record.expires_at,
            identity: Identity {
                user_id: user.id,
                username: user.username,
            },
        })
    }

    /// Resolves a bearer token to the user it was issued to.
    pub async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        if !tokens::looks_like_access_token(token) {
            return Err(AuthError::AuthenticationFailed("malformed token"));
        }

        let record = self
            .store
            .find_token(&tokens::hash_token(token))
            .await?
            .ok_or(AuthError::AuthenticationFailed("unknown token"))?;

        if record.revoked_at.is_some() {
            return Err(AuthError::AuthenticationFailed("token revoked"));
        }
        if record.expires_at <= Utc::now() {
            return Err(AuthError::AuthenticationFailed("token expired"));
        }

        let user = self
            .store
            .find_user(record.user_id)
            .await?
            .ok_or(AuthError::AuthenticationFailed("user no longer exists"))?;

        Ok(Identity {
            user_id: user.id,
            username: user.username,
        })
    }

    /// Revokes `token`. Revoking an unknown or already revoked token is
    /// not an error.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let revoked = self
            .store
            .revoke_token(&tokens::hash_token(token), Utc::now())
            .await?;
        debug!(revoked, "Logout processed");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AuthError> {
        Ok(self.store.health_check().await?)
    }
}

fn validate_username(raw: &str) -> Result<&str, AuthError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(AuthError::InvalidUsername("must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AuthError::InvalidUsername("must be at most 64 characters"));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-');
    if !username.chars().all(allowed) {
        return Err(AuthError::InvalidUsername(
            "may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(username)
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::InvalidPassword("must not be empty"));
    }
    if password.chars().count() > MAX_PASSWORD_LEN {
        return Err(AuthError::InvalidPassword("must be at most 128 characters"));
    }
    Ok(())
}
