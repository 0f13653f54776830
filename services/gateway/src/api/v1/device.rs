//! Device endpoints.
//!
//! Endpoints:
//! - POST /v1/device/compile - Build a sketch without touching the board
//! - GET  /v1/device/session - WebSocket: upload code, read device output

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use slotgate_id::UserId;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::api::error::ApiError;
use crate::api::request_context::AuthenticatedUser;
use crate::device::{DeviceError, SessionEnd};
use crate::state::AppState;

/// Buffered payloads or output lines per direction.
const SESSION_BUFFER: usize = 32;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/compile", post(compile))
        .route("/session", get(session))
}

#[derive(Debug, Deserialize)]
struct CompileRequest {
    code: String,
}

#[derive(Debug, Serialize)]
struct CompileResponse {
    status: &'static str,
    warnings: Option<String>,
}

fn device_error(err: DeviceError, request_id: &str) -> ApiError {
    let api = match err {
        DeviceError::EntitlementDenied => {
            ApiError::forbidden("entitlement_denied", "No active slot")
        }
        DeviceError::Stage(failure) => ApiError::unprocessable(
            "build_failed",
            format!("Compilation failed: {}", failure.detail),
        ),
        DeviceError::Staging(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Failed to stage sketch");
            ApiError::internal("internal_error", "Could not stage code")
        }
        DeviceError::Ledger(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Entitlement check failed");
            ApiError::internal("internal_error", "Could not verify slot").retryable()
        }
    };
    api.with_request_id(request_id.to_string())
}

async fn compile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CompileRequest>,
) -> Result<Json<CompileResponse>, ApiError> {
    let report = state
        .device()
        .compile_once(user.identity.user_id, &body.code)
        .await
        .map_err(|e| device_error(e, &user.ctx.request_id))?;

    let warnings = Some(report.warnings).filter(|w| !w.trim().is_empty());
    Ok(Json(CompileResponse {
        status: "ok",
        warnings,
    }))
}

async fn session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.identity.user_id;
    state
        .device()
        .authorize(user_id)
        .await
        .map_err(|e| device_error(e, &user.ctx.request_id))?;

    Ok(ws.on_upgrade(move |socket| bridge_session(socket, state, user_id)))
}

/// Bridges a WebSocket to a [`crate::device::DeviceSession`]: text frames
/// are code payloads, outbound lines are sent back as text frames.
async fn bridge_session(socket: WebSocket, state: AppState, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();
    let (in_tx, in_rx) = mpsc::channel::<String>(SESSION_BUFFER);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(SESSION_BUFFER);

    info!(user_id = %user_id, "Device session connected");

    let reader = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if in_tx.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = ?e, user_id = %user_id, "WebSocket error");
                    break;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if let Err(e) = sender.send(Message::Text(line.into())).await {
                debug!(error = ?e, user_id = %user_id, "Failed to send to client");
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let end = state
        .device()
        .session(user_id)
        .run(ReceiverStream::new(in_rx), out_tx)
        .await;

    // The session owns the only outbound sender, so the writer drains and exits.
    if let Err(e) = writer.await {
        warn!(error = %e, user_id = %user_id, "Device session writer panicked");
    }
    reader.abort();

    match end {
        SessionEnd::Disconnected => info!(user_id = %user_id, "Device session disconnected"),
        SessionEnd::Denied => info!(user_id = %user_id, "Device session ended: no active slot"),
    }
}
