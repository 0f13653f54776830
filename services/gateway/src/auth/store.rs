//! Credential storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slotgate_id::{TokenId, UserId};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::DbError;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// An issued access token. Only the hash of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenRecord {
    pub id: TokenId,
    pub token_hash: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Storage for users and their access tokens.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Inserts a user. Fails with [`IdentityError::UsernameTaken`] on a
    /// duplicate username.
    async fn insert_user(&self, user: &UserRecord) -> Result<(), IdentityError>;

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, IdentityError>;

    async fn find_user_by_name(&self, username: &str)
        -> Result<Option<UserRecord>, IdentityError>;

    async fn insert_token(&self, token: &AccessTokenRecord) -> Result<(), IdentityError>;

    async fn find_token(&self, token_hash: &str)
        -> Result<Option<AccessTokenRecord>, IdentityError>;

    /// Marks a token revoked. Returns false if it was unknown or already
    /// revoked.
    async fn revoke_token(&self, token_hash: &str, at: DateTime<Utc>)
        -> Result<bool, IdentityError>;

    async fn health_check(&self) -> Result<(), IdentityError>;
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<UserId, UserRecord>,
    by_name: HashMap<String, UserId>,
    tokens: HashMap<String, AccessTokenRecord>,
}

/// In-process identity store.
#[derive(Default)]
pub struct MemoryIdentityStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), IdentityError> {
        let mut inner = self.inner.write().await;
        if inner.by_name.contains_key(&user.username) {
            return Err(IdentityError::UsernameTaken(user.username.clone()));
        }
        inner.by_name.insert(user.username.clone(), user.id);
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, IdentityError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_name(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, IdentityError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_name
            .get(username)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn insert_token(&self, token: &AccessTokenRecord) -> Result<(), IdentityError> {
        self.inner
            .write()
            .await
            .tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessTokenRecord>, IdentityError> {
        Ok(self.inner.read().await.tokens.get(token_hash).cloned())
    }

    async fn revoke_token(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, IdentityError> {
        let mut inner = self.inner.write().await;
        match inner.tokens.get_mut(token_hash) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), IdentityError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserRecord {
        UserRecord {
            id: UserId::new(),
            username: name.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let store = MemoryIdentityStore::new();
        let first = user("ada");
        store.insert_user(&first).await.unwrap();

        let err = store.insert_user(&user("ada")).await.unwrap_err();
        assert!(matches!(err, IdentityError::UsernameTaken(name) if name == "ada"));

        let found = store.find_user_by_name("ada").await.unwrap();
        assert_eq!(found, Some(first));
    }

    #[tokio::test]
    async fn test_revoke_is_one_shot() {
        let store = MemoryIdentityStore::new();
        let owner = user("ada");
        let token = AccessTokenRecord {
            id: TokenId::new(),
            token_hash: "abc".to_string(),
            user_id: owner.id,
            expires_at: Utc::now(),
            revoked_at: None,
            created_at: Utc::now(),
        };
        store.insert_token(&token).await.unwrap();

        assert!(store.revoke_token("abc", Utc::now()).await.unwrap());
        assert!(!store.revoke_token("abc", Utc::now()).await.unwrap());
        assert!(!store.revoke_token("missing", Utc::now()).await.unwrap());

        let stored = store.find_token("abc").await.unwrap().unwrap();
        assert!(stored.revoked_at.is_some());
    }
}
