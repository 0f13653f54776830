//! GET /v1/live: the live booking channel over WebSocket.
//!
//! The token is checked before the upgrade, so a bad credential gets a plain
//! 401 and no connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use slotgate_events::ServerEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::request_context::AuthenticatedUser;
use crate::auth::Identity;
use crate::state::AppState;

pub async fn connect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = user.identity;
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let live = state.live().clone();
    let registration = live.registry().register(&identity);
    let connection_id = registration.id();
    let mut group = live.group().join();

    info!(
        connection_id = %connection_id,
        user_id = %identity.user_id,
        peers = live.registry().len(),
        "Live channel connected"
    );

    let (mut sender, mut receiver) = socket.split();

    loop {
        let outgoing: ServerEvent = tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match live.handle_frame(connection_id, text.as_str()).await {
                        Some(reply) => reply,
                        None => continue,
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = ?e, connection_id = %connection_id, "WebSocket error");
                    break;
                }
            },
            event = group.recv() => match event {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(connection_id = %connection_id, skipped, "Live channel receiver lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        let payload = match outgoing.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, event = outgoing.name(), "Failed to encode event");
                continue;
            }
        };
        if let Err(e) = sender.send(Message::Text(payload.into())).await {
            debug!(error = ?e, connection_id = %connection_id, "Failed to send to client");
            break;
        }
    }

    drop(registration);
    info!(connection_id = %connection_id, user_id = %identity.user_id, "Live channel disconnected");
}
