//! Account and token endpoints.
//!
//! Endpoints:
//! - POST /v1/auth/register - Create an account
//! - POST /v1/auth/login    - Exchange credentials for an access token
//! - POST /v1/auth/logout   - Revoke the presented token
//! - GET  /v1/auth/whoami   - Identity behind the presented token

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotgate_id::UserId;

use crate::api::error::ApiError;
use crate::api::request_context::{AuthenticatedUser, RequestContext};
use crate::auth::{AuthError, Identity};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/whoami", get(whoami))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    user_id: UserId,
    username: String,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.user_id,
            username: identity.username,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    token_type: &'static str,
    user_id: UserId,
    username: String,
    expires_at: DateTime<Utc>,
}

fn auth_error(err: AuthError, request_id: &str) -> ApiError {
    let api = match err {
        AuthError::InvalidUsername(reason) => {
            ApiError::bad_request("invalid_username", format!("Invalid username: {reason}"))
        }
        AuthError::InvalidPassword(reason) => {
            ApiError::bad_request("invalid_password", format!("Invalid password: {reason}"))
        }
        AuthError::UsernameTaken(name) => {
            ApiError::conflict("username_taken", format!("Username '{name}' is already taken"))
        }
        AuthError::InvalidCredentials => {
            ApiError::unauthorized("invalid_credentials", "Invalid username or password")
        }
        AuthError::AuthenticationFailed(_) => {
            ApiError::unauthorized("invalid_token", "Invalid or expired token")
        }
        AuthError::Hashing(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Password hashing failed");
            ApiError::internal("internal_error", "Could not create account")
        }
        AuthError::Storage(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Identity store failure");
            ApiError::internal("internal_error", "Identity store unavailable")
        }
    };
    api.with_request_id(request_id.to_string())
}

async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = state
        .auth()
        .register(&body.username, &body.password)
        .await
        .map_err(|e| auth_error(e, &ctx.request_id))?;

    tracing::info!(user_id = %identity.user_id, request_id = %ctx.request_id, "User registered");
    Ok((StatusCode::CREATED, Json(IdentityResponse::from(identity))))
}

async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Credentials>,
) -> Result<Json<TokenResponse>, ApiError> {
    let issued = state
        .auth()
        .login(&body.username, &body.password)
        .await
        .map_err(|e| auth_error(e, &ctx.request_id))?;

    Ok(Json(TokenResponse {
        token: issued.token,
        token_type: "Bearer",
        user_id: issued.identity.user_id,
        username: issued.identity.username,
        expires_at: issued.expires_at,
    }))
}

async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ApiError> {
    state
        .auth()
        .logout(&user.token)
        .await
        .map_err(|e| auth_error(e, &user.ctx.request_id))?;

    tracing::info!(
        user_id = %user.identity.user_id,
        request_id = %user.ctx.request_id,
        "Token revoked"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn whoami(user: AuthenticatedUser) -> Json<IdentityResponse> {
    Json(user.identity.into())
}
