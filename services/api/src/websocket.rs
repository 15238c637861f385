//! Live notification channel (`GET /ws?token=<jwt>`)
//!
//! The upgrade is always accepted; the token is checked on the open socket
//! and a failed check closes it with a policy-violation frame before any
//! registry entry exists.

use std::borrow::Cow;

use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::{
    error::{ApiError, ApiResult},
    middleware::resolve_user,
    models::user::User,
    registry::{ConnectionHandle, LiveReceiver, live_channel},
    state::AppState,
};

/// Handshake query string
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeParams {
    pub token: Option<String>,
}

/// Upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HandshakeParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.token))
}

async fn authenticate(state: &AppState, token: Option<&str>) -> ApiResult<User> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::AuthMissing)?;
    resolve_user(state, token).await
}

/// Authenticated connection, already registered
struct Session {
    user: User,
    handle: ConnectionHandle,
    events: LiveReceiver,
}

/// Verify the handshake token and register the connection; nothing is
/// registered when verification fails
async fn admit(state: &AppState, token: Option<&str>) -> ApiResult<Session> {
    let user = authenticate(state, token).await?;
    let (tx, events) = live_channel();
    let handle = state.registry.connect(user.id, user.role, tx).await;
    Ok(Session {
        user,
        handle,
        events,
    })
}

async fn handle_socket(mut socket: WebSocket, state: AppState, token: Option<String>) {
    let Session {
        user,
        handle,
        events: mut rx,
    } = match admit(&state, token.as_deref()).await {
        Ok(session) => session,
        Err(err) => {
            warn!("Rejecting live connection: {}", err);
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: Cow::Owned(err.to_string()),
            };
            if let Err(e) = socket.send(Message::Close(Some(frame))).await {
                debug!("Failed to send close frame: {}", e);
            }
            return;
        }
    };

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode live event: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    debug!("Send to user {} failed, closing", user.id);
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("Live connection error for user {}: {}", user.id, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    state.registry.disconnect(user.id, &handle).await;
}
