use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use huddle_types::events::{AuthFailReason, ClientCommand, ServerEvent};

use crate::handlers::{self, GatewayState};
use crate::hub::ConnId;
use crate::identity::{self, AuthError};

/// A client gets this long to present a credential before we hang up.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle one WebSocket connection end to end: authenticate, serve commands,
/// clean up on disconnect.
pub async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (sender, mut receiver) = socket.split();

    let (conn_id, rx) = state.hub.register().await;
    let mut send_task = tokio::spawn(forward_events(sender, rx));

    // Phase 1: the first command must be `auth`.
    let authenticated = match wait_for_auth(&state, conn_id, &mut receiver).await {
        Ok(session) => {
            info!("{} ({}) connected", session.1, session.0);
            state
                .hub
                .send_to(
                    conn_id,
                    ServerEvent::AuthSuccess {
                        user_id: session.0,
                        username: session.1,
                    },
                )
                .await;
            handlers::broadcast_roster(&state).await;
            true
        }
        Err(reason) => {
            if let Some(reason) = reason {
                state
                    .hub
                    .send_to(conn_id, ServerEvent::AuthFail { reason })
                    .await;
            }
            false
        }
    };

    // Phase 2: steady-state command loop.
    if authenticated {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handlers::handle_command(&state, conn_id, cmd).await,
                    Err(e) => {
                        let preview: String = text.chars().take(200).collect();
                        warn!("Bad command on {}: {} -- raw: {}", conn_id, e, preview);
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    }

    // Teardown: dropping the hub sender lets the forwarder drain queued
    // events (auth-fail included) before the socket closes.
    let session = state.hub.unregister(conn_id).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), &mut send_task).await;
    send_task.abort();

    if let Some(session) = session {
        info!("{} ({}) disconnected", session.username, session.user_id);
        handlers::broadcast_roster(&state).await;
    }
}

/// Forward hub events to the socket until the hub side closes or the send fails.
async fn forward_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = rx.recv().await {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize event: {}", e);
                continue;
            }
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
    let _ = sender.close().await;
}

/// Wait for the `auth` command, verify the credential, and install the
/// session. `Err(Some(reason))` means "tell the client, then hang up";
/// `Err(None)` means the client went away first.
async fn wait_for_auth(
    state: &GatewayState,
    conn_id: ConnId,
    receiver: &mut SplitStream<WebSocket>,
) -> Result<(String, String), Option<AuthFailReason>> {
    let token = tokio::time::timeout(AUTH_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(ClientCommand::Auth { token }) => return Some(token),
                    Ok(_) => return None, // anything else before auth: hang up
                    Err(e) => {
                        warn!("Bad pre-auth payload on {}: {}", conn_id, e);
                        return None;
                    }
                }
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
    .ok_or(None)?;

    // Credential verification and lazy user creation hit the DB; keep them
    // off the async runtime.
    let db = state.db.clone();
    let secret = state.jwt_secret.clone();
    let resolved = tokio::task::spawn_blocking(move || identity::authenticate(&db, &secret, &token))
        .await
        .map_err(|e| {
            warn!("Auth task join error: {}", e);
            Some(AuthFailReason::InvalidCredential)
        })?;

    let (user_id, username) = match resolved {
        Ok(identity) => identity,
        Err(AuthError::InvalidCredential) => return Err(Some(AuthFailReason::InvalidCredential)),
        Err(AuthError::DuplicateSession) => return Err(Some(AuthFailReason::DuplicateSession)),
        Err(AuthError::Internal(e)) => {
            warn!("Identity resolution failed: {:#}", e);
            return Err(Some(AuthFailReason::InvalidCredential));
        }
    };

    match state
        .hub
        .begin_session(conn_id, user_id.clone(), username.clone())
        .await
    {
        Ok(_) => Ok((user_id, username)),
        Err(_) => Err(Some(AuthFailReason::DuplicateSession)),
    }
}
