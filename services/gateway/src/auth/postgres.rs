//! Postgres-backed identity store (`users` and `access_tokens` tables).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slotgate_id::{TokenId, UserId};
use sqlx::postgres::PgPool;

use super::store::{AccessTokenRecord, IdentityError, IdentityStore, UserRecord};
use crate::db::{is_unique_violation, DbError};

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), IdentityError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (user_id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(IdentityError::UsernameTaken(user.username.clone()))
            }
            Err(e) => Err(DbError::Query(e).into()),
        }
    }

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, IdentityError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, password_hash, created_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(UserRow::into_record).transpose()?)
    }

    async fn find_user_by_name(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, IdentityError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(UserRow::into_record).transpose()?)
    }

    async fn insert_token(&self, token: &AccessTokenRecord) -> Result<(), IdentityError> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens
                (token_id, token_hash, user_id, expires_at, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id.to_string())
        .bind(&token.token_hash)
        .bind(token.user_id.to_string())
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    async fn find_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessTokenRecord>, IdentityError> {
        let row = sqlx::query_as::<_, AccessTokenRow>(
            r#"
            SELECT token_id, token_hash, user_id, expires_at, revoked_at, created_at
            FROM access_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(AccessTokenRow::into_record).transpose()?)
    }

    async fn revoke_token(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, IdentityError> {
        let result = sqlx::query(
            r#"
            UPDATE access_tokens
            SET revoked_at = $2
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token_hash)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), IdentityError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}

// Database row types

struct UserRow {
    user_id: String,
    username: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self) -> Result<UserRecord, DbError> {
        let id = self.user_id.parse().map_err(|e| DbError::CorruptRow {
            table: "users",
            message: format!("user_id: {e}"),
        })?;
        Ok(UserRecord {
            id,
            username: self.username,
            password_hash: self.password_hash,
            created_at: self.created_at,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UserRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

struct AccessTokenRow {
    token_id: String,
    token_hash: String,
    user_id: String,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl AccessTokenRow {
    fn into_record(self) -> Result<AccessTokenRecord, DbError> {
        let corrupt = |message: String| DbError::CorruptRow {
            table: "access_tokens",
            message,
        };
        let id: TokenId = self
            .token_id
            .parse()
            .map_err(|e| corrupt(format!("token_id: {e}")))?;
        let user_id: UserId = self
            .user_id
            .parse()
            .map_err(|e| corrupt(format!("user_id: {e}")))?;

        Ok(AccessTokenRecord {
            id,
            token_hash: self.token_hash,
            user_id,
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for AccessTokenRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            token_id: row.try_get("token_id")?,
            token_hash: row.try_get("token_hash")?,
            user_id: row.try_get("user_id")?,
            expires_at: row.try_get("expires_at")?,
            revoked_at: row.try_get("revoked_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
