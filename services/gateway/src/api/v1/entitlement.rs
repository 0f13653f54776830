//! GET /v1/entitlement: whether the caller holds the slot covering now.

use axum::{extract::State, Json};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::request_context::AuthenticatedUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementResponse {
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot_start: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot_end: Option<NaiveDateTime>,
}

pub async fn current(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<EntitlementResponse>, ApiError> {
    let now = state.clock().now();
    let slot = state
        .entitlement()
        .active_slot(user.identity.user_id, now)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                request_id = %user.ctx.request_id,
                "Entitlement check failed"
            );
            ApiError::internal("internal_error", "Could not verify slot")
                .retryable()
                .with_request_id(user.ctx.request_id.clone())
        })?;

    Ok(Json(EntitlementResponse {
        active: slot.is_some(),
        slot_start: slot.as_ref().map(|s| s.slot_time.starts_at()),
        slot_end: slot.as_ref().map(|s| s.slot_time.ends_at()),
    }))
}
