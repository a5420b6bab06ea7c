//! WebSocket handler — the push-only session event feed.
//!
//! DESIGN
//! ======
//! Clients mutate over HTTP; this endpoint only delivers. On upgrade the
//! subscriber is validated against the lifecycle gate and membership, then
//! registered in the per-session watcher map. Mutation handlers call
//! [`broadcast`] after their write commits.
//!
//! Delivery is best-effort `try_send`: a subscriber whose channel is full
//! misses that event rather than stalling the writer. The next snapshot
//! read catches them up.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::event::Event;
use crate::services::{participant, session};
use crate::state::AppState;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// UPGRADE
// =============================================================================

#[derive(Deserialize)]
pub struct WsParams {
    pub code: String,
    pub device: String,
}

/// `GET /api/ws?code=&device=` — subscribe to a session's event feed.
pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let now = OffsetDateTime::now_utc();
    let session = match session::ensure_active(&state.pool, &params.code, now).await {
        Ok(s) => s,
        Err(e) => {
            return (crate::routes::sessions::session_error_to_status(e), "session unavailable").into_response();
        }
    };
    let member = match participant::require_member(&state.pool, session.id, &params.device).await {
        Ok(m) => m,
        Err(e) => {
            return (crate::routes::sessions::participant_error_to_status(e), "not a participant").into_response();
        }
    };

    let session_id = session.id;
    let participant_id = member.id;
    ws.on_upgrade(move |socket| run_ws(socket, state, session_id, participant_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, session_id: Uuid, participant_id: Uuid) {
    let subscriber_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<Event>(SUBSCRIBER_CHANNEL_CAPACITY);

    {
        let mut watchers = state.watchers.write().await;
        watchers.entry(session_id).or_default().insert(subscriber_id, tx);
    }
    info!(%session_id, %participant_id, %subscriber_id, "ws: subscriber connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Push-only feed: inbound frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    deregister(&state, session_id, subscriber_id).await;
    info!(%session_id, %subscriber_id, "ws: subscriber disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &Event) -> Result<(), axum::Error> {
    let Ok(json) = serde_json::to_string(event) else {
        return Ok(());
    };
    socket.send(Message::Text(json.into())).await
}

async fn deregister(state: &AppState, session_id: Uuid, subscriber_id: Uuid) {
    let mut watchers = state.watchers.write().await;
    if let Some(subs) = watchers.get_mut(&session_id) {
        subs.remove(&subscriber_id);
        if subs.is_empty() {
            watchers.remove(&session_id);
        }
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Deliver an event to every subscriber of a session. Best-effort: a full
/// channel skips that subscriber.
pub async fn broadcast(state: &AppState, session_id: Uuid, event: &Event) {
    let watchers = state.watchers.read().await;
    let Some(subs) = watchers.get(&session_id) else {
        return;
    };
    for tx in subs.values() {
        let _ = tx.try_send(event.clone());
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
