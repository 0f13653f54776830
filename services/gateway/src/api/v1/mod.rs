//! API v1 routes.

mod auth;
mod bookings;
mod device;
mod entitlement;
mod live;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/bookings", bookings::routes())
        .nest("/device", device::routes())
        .route("/entitlement", get(entitlement::current))
        // WebSocket: the live booking channel
        .route("/live", get(live::connect))
}
