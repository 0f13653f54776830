//! Request-scoped context extracted from HTTP requests.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::Deserialize;
use slotgate_id::RequestId;

use crate::api::error::ApiError;
use crate::auth::{AuthError, Identity};
use crate::state::AppState;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Bearer token from the `Authorization` header or, for WebSocket
    /// upgrades that cannot set headers, the `token` query parameter.
    pub bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn bearer_from_headers(headers: &HeaderMap, request_id: &str) -> Result<Option<String>, ApiError> {
    let Some(auth_value) = header_string(headers, AUTHORIZATION_HEADER) else {
        return Ok(None);
    };

    let auth_value = auth_value.trim();
    let Some(token) = auth_value.strip_prefix("Bearer ") else {
        return Err(ApiError::unauthorized(
            "invalid_authorization",
            "Authorization must be a Bearer token",
        )
        .with_request_id(request_id.to_string()));
    };

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized(
            "invalid_authorization",
            "Authorization Bearer token cannot be empty",
        )
        .with_request_id(request_id.to_string()));
    }

    Ok(Some(token.to_string()))
}

fn bearer_from_query(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = header_string(&parts.headers, REQUEST_ID_HEADER)
            .unwrap_or_else(|| RequestId::new().to_string());

        let bearer_token = match bearer_from_headers(&parts.headers, &request_id)? {
            Some(token) => Some(token),
            None => bearer_from_query(parts),
        };

        Ok(Self {
            request_id,
            bearer_token,
        })
    }
}

/// A request whose bearer token resolved to a user.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub ctx: RequestContext,
    pub identity: Identity,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;

        let Some(token) = ctx.bearer_token.clone() else {
            return Err(
                ApiError::unauthorized("authentication_required", "Authentication required")
                    .with_request_id(ctx.request_id),
            );
        };

        match state.auth().resolve(&token).await {
            Ok(identity) => Ok(Self {
                ctx,
                identity,
                token,
            }),
            Err(AuthError::AuthenticationFailed(reason)) => {
                tracing::debug!(reason, request_id = %ctx.request_id, "Token rejected");
                Err(
                    ApiError::unauthorized("invalid_token", "Invalid or expired token")
                        .with_request_id(ctx.request_id),
                )
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    request_id = %ctx.request_id,
                    "Failed to resolve token"
                );
                Err(ApiError::internal("internal_error", "Failed to validate token")
                    .with_request_id(ctx.request_id))
            }
        }
    }
}
