//! Booking endpoints.
//!
//! Endpoints:
//! - GET    /v1/bookings[?day=YYYY-MM-DD] - Slots for a day, ascending
//! - POST   /v1/bookings                  - Book a slot
//! - DELETE /v1/bookings/{slot_time}      - Cancel one of the caller's slots
//!
//! Mutations made here are announced on the live channel the same way
//! channel-originated ones are.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use slotgate_id::UserId;

use crate::api::error::ApiError;
use crate::api::request_context::{AuthenticatedUser, RequestContext};
use crate::ledger::{LedgerError, Slot, SlotError, SlotOwner, SlotPeriod, SlotTime};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings).post(create_booking))
        .route("/{slot_time}", delete(cancel_booking))
}

/// JSON view of a reservation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    slot_time: String,
    slot_date: String,
    user_id: UserId,
    username: String,
    slot_period: &'static str,
    starts_at: NaiveDateTime,
    ends_at: NaiveDateTime,
}

impl From<&Slot> for SlotView {
    fn from(slot: &Slot) -> Self {
        Self {
            slot_time: slot.slot_time.label(),
            slot_date: slot.slot_time.date().to_string(),
            user_id: slot.owner.user_id,
            username: slot.owner.username.clone(),
            slot_period: slot.period.as_str(),
            starts_at: slot.slot_time.starts_at(),
            ends_at: slot.slot_time.ends_at(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    day: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookingRequest {
    /// Full timestamp, or `HH:MM` for today.
    slot_time: String,
    #[serde(default)]
    slot_period: Option<String>,
}

/// Reads a slot reference: `YYYY-MM-DDTHH:MM`, or a bare `HH:MM` on `today`.
fn parse_slot_ref(raw: &str, today: NaiveDate) -> Result<SlotTime, SlotError> {
    let raw = raw.trim();
    if raw.contains('-') {
        SlotTime::parse_timestamp(raw)
    } else {
        SlotTime::on_day(today, raw)
    }
}

fn invalid_slot(err: SlotError, request_id: &str) -> ApiError {
    ApiError::bad_request("invalid_slot", format!("Invalid slot selected: {err}"))
        .with_request_id(request_id.to_string())
}

fn ledger_error(err: LedgerError, request_id: &str) -> ApiError {
    let api = match err {
        LedgerError::AlreadyBookedBySelf(_) => {
            ApiError::conflict("already_booked", "You already booked this slot")
        }
        LedgerError::BookedByOther { owner, .. } => ApiError::conflict(
            "booked_by_other",
            format!("Slot already booked by {}", owner.username),
        ),
        LedgerError::NotFound(slot_time) => {
            ApiError::not_found("not_found", format!("No booking at {slot_time}"))
        }
        LedgerError::NotOwner { .. } => {
            ApiError::forbidden("not_owner", "You can only unbook your own slot")
        }
        LedgerError::Contended(slot_time) => ApiError::conflict(
            "slot_contended",
            format!("Slot {slot_time} changed while booking; try again"),
        )
        .retryable(),
        LedgerError::Storage(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Ledger failure");
            ApiError::internal("internal_error", "Booking store unavailable").retryable()
        }
    };
    api.with_request_id(request_id.to_string())
}

async fn list_bookings(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SlotView>>, ApiError> {
    let day = match query.day.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
            ApiError::bad_request("invalid_day", "day must be YYYY-MM-DD")
                .with_request_id(ctx.request_id.clone())
        })?,
        None => state.clock().now().date(),
    };

    let slots = state
        .ledger()
        .list_for_day(day)
        .await
        .map_err(|e| ledger_error(e, &ctx.request_id))?;

    Ok(Json(slots.iter().map(SlotView::from).collect()))
}

async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = &user.ctx.request_id;
    let today = state.clock().now().date();

    let slot_time =
        parse_slot_ref(&body.slot_time, today).map_err(|e| invalid_slot(e, request_id))?;
    let period = SlotPeriod::resolve(body.slot_period.as_deref(), slot_time)
        .map_err(|e| invalid_slot(e, request_id))?;

    let owner = SlotOwner {
        user_id: user.identity.user_id,
        username: user.identity.username.clone(),
    };
    let slot = state
        .ledger()
        .create(&owner, slot_time, period)
        .await
        .map_err(|e| ledger_error(e, request_id))?;

    let listeners = state.live().publish_booked(&slot);
    tracing::info!(
        user_id = %slot.owner.user_id,
        slot_time = %slot.slot_time,
        listeners,
        request_id = %request_id,
        "Slot booked"
    );

    Ok((StatusCode::CREATED, Json(SlotView::from(&slot))))
}

async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(raw): Path<String>,
) -> Result<Json<SlotView>, ApiError> {
    let request_id = &user.ctx.request_id;
    let today = state.clock().now().date();

    let slot_time = parse_slot_ref(&raw, today).map_err(|e| invalid_slot(e, request_id))?;
    let slot = state
        .ledger()
        .cancel(user.identity.user_id, slot_time)
        .await
        .map_err(|e| ledger_error(e, request_id))?;

    state.live().publish_cleared(&slot);
    tracing::info!(
        user_id = %user.identity.user_id,
        slot_time = %slot.slot_time,
        request_id = %request_id,
        "Slot cancelled"
    );

    Ok(Json(SlotView::from(&slot)))
}
