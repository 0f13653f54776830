//! Postgres-backed ledger.
//!
//! `bookings.slot_time` carries a `UNIQUE` constraint. `create` is a plain
//! insert and the constraint violation is the conflict signal; there is no
//! read-before-write.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use slotgate_id::{BookingId, UserId};
use sqlx::postgres::PgPool;
use tracing::{debug, warn};

use super::{conflict, LedgerError, Slot, SlotLedger, SlotOwner, SlotPeriod, SlotTime};
use crate::db::{DbError, UNIQUE_VIOLATION};

/// Name of the unique constraint on `bookings.slot_time`.
const SLOT_TIME_CONSTRAINT: &str = "bookings_slot_time_key";

/// How many times `create` re-inserts when the conflicting row disappears
/// before it can be read.
const MAX_CREATE_ATTEMPTS: usize = 3;

/// Ledger stored in the `bookings` table.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, slot: &Slot) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, user_id, username, slot_time, slot_period, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(slot.id.to_string())
        .bind(slot.owner.user_id.to_string())
        .bind(&slot.owner.username)
        .bind(slot.slot_time.starts_at())
        .bind(slot.period.as_str())
        .bind(slot.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn is_slot_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                && db_err.constraint() == Some(SLOT_TIME_CONSTRAINT)
        }
        _ => false,
    }
}

#[async_trait]
impl SlotLedger for PgLedger {
    async fn create(
        &self,
        owner: &SlotOwner,
        slot_time: SlotTime,
        period: SlotPeriod,
    ) -> Result<Slot, LedgerError> {
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let slot = Slot::new(owner.clone(), slot_time, period);

            match self.insert(&slot).await {
                Ok(()) => {
                    debug!(slot_time = %slot_time, user_id = %owner.user_id, "Slot created");
                    return Ok(slot);
                }
                Err(e) if is_slot_conflict(&e) => {
                    if let Some(existing) = self.get(slot_time).await? {
                        return Err(conflict(existing, owner.user_id));
                    }
                    warn!(
                        slot_time = %slot_time,
                        attempt,
                        "Conflicting booking vanished before it could be read; retrying insert"
                    );
                }
                Err(e) => return Err(DbError::Query(e).into()),
            }
        }

        Err(LedgerError::Contended(slot_time))
    }

    async fn cancel(&self, user_id: UserId, slot_time: SlotTime) -> Result<Slot, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT booking_id, user_id, username, slot_time, slot_period, created_at
            FROM bookings
            WHERE slot_time = $1
            FOR UPDATE
            "#,
        )
        .bind(slot_time.starts_at())
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        let Some(row) = row else {
            return Err(LedgerError::NotFound(slot_time));
        };
        let existing = row.into_slot()?;

        if !existing.is_owned_by(user_id) {
            return Err(LedgerError::NotOwner {
                slot_time,
                owner: existing.owner,
            });
        }

        sqlx::query("DELETE FROM bookings WHERE booking_id = $1")
            .bind(existing.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        tx.commit().await.map_err(DbError::Query)?;

        debug!(slot_time = %slot_time, user_id = %user_id, "Slot cancelled");
        Ok(existing)
    }

    async fn get(&self, slot_time: SlotTime) -> Result<Option<Slot>, LedgerError> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT booking_id, user_id, username, slot_time, slot_period, created_at
            FROM bookings
            WHERE slot_time = $1
            "#,
        )
        .bind(slot_time.starts_at())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(BookingRow::into_slot).transpose()?)
    }

    async fn list_for_day(&self, day: NaiveDate) -> Result<Vec<Slot>, LedgerError> {
        let start = day.and_time(NaiveTime::default());
        let end = start + Duration::days(1);

        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT booking_id, user_id, username, slot_time, slot_period, created_at
            FROM bookings
            WHERE slot_time >= $1 AND slot_time < $2
            ORDER BY slot_time ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows
            .into_iter()
            .map(BookingRow::into_slot)
            .collect::<Result<_, _>>()?)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Slot>, LedgerError> {
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT booking_id, user_id, username, slot_time, slot_period, created_at
            FROM bookings
            WHERE user_id = $1
            ORDER BY slot_time ASC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows
            .into_iter()
            .map(BookingRow::into_slot)
            .collect::<Result<_, _>>()?)
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

struct BookingRow {
    booking_id: String,
    user_id: String,
    username: String,
    slot_time: NaiveDateTime,
    slot_period: String,
    created_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_slot(self) -> Result<Slot, DbError> {
        let corrupt = |message: String| DbError::CorruptRow {
            table: "bookings",
            message,
        };

        let id: BookingId = self
            .booking_id
            .parse()
            .map_err(|e| corrupt(format!("booking_id: {e}")))?;
        let user_id: UserId = self
            .user_id
            .parse()
            .map_err(|e| corrupt(format!("user_id: {e}")))?;
        let slot_time =
            SlotTime::new(self.slot_time).map_err(|e| corrupt(format!("slot_time: {e}")))?;
        let period = SlotPeriod::from_stored(&self.slot_period)
            .ok_or_else(|| corrupt(format!("slot_period: {}", self.slot_period)))?;

        Ok(Slot {
            id,
            slot_time,
            period,
            owner: SlotOwner {
                user_id,
                username: self.username,
            },
            created_at: self.created_at,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for BookingRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            booking_id: row.try_get("booking_id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            slot_time: row.try_get("slot_time")?,
            slot_period: row.try_get("slot_period")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
