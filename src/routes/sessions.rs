//! Session routes — create, snapshot, join/leave, destination.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::event::Event;
use crate::geo::Coord;
use crate::routes::ws;
use crate::services::participant::{self, ParticipantError, RosterEntry};
use crate::services::session::{self, Destination, SessionError};
use crate::state::AppState;

// =============================================================================
// ERROR MAPPING
// =============================================================================

pub(crate) fn session_error_to_status(err: SessionError) -> StatusCode {
    match err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::NotActive(_) => StatusCode::GONE,
        SessionError::CodeExhausted | SessionError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn participant_error_to_status(err: ParticipantError) -> StatusCode {
    match err {
        ParticipantError::NotInSession { .. } => StatusCode::FORBIDDEN,
        ParticipantError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// CREATE / SNAPSHOT
// =============================================================================

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// `POST /api/session` — create a session with a fresh join code.
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), StatusCode> {
    let now = OffsetDateTime::now_utc();
    let row = session::create_session(&state.pool, now)
        .await
        .map_err(session_error_to_status)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session_id: row.id, code: row.code, expires_at: row.expires_at }),
    ))
}

#[derive(Serialize)]
pub struct SessionSnapshotResponse {
    pub code: String,
    pub status: &'static str,
    pub destination: Option<Destination>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub roster: Vec<RosterEntry>,
}

/// `GET /api/session/:code` — session snapshot including the full roster.
/// Readable even for an ended session so clients can learn why they were
/// kicked out; mutations stay gated.
pub async fn get_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<SessionSnapshotResponse>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let code = session::normalize_code(&code);
    let row = session::find_session(&state.pool, &code)
        .await
        .map_err(session_error_to_status)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let roster = participant::roster(&state.pool, row.id, now)
        .await
        .map_err(participant_error_to_status)?;

    Ok(Json(SessionSnapshotResponse {
        code: row.code,
        status: row.status.as_str(),
        destination: row.destination,
        expires_at: row.expires_at,
        roster,
    }))
}

/// `DELETE /api/session/:code` — end the session explicitly. Subsequent
/// mutations are refused by the lifecycle gate; cleanup of rows is left to
/// the expiry sweep.
pub async fn end_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    session::end_session(&state.pool, session.id)
        .await
        .map_err(session_error_to_status)?;
    ws::broadcast(&state, session.id, &Event::SessionEnded).await;

    Ok(Json(serde_json::json!({ "ok": true })))
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

#[derive(Deserialize)]
pub struct JoinBody {
    pub device_id: String,
    pub display_name: String,
}

#[derive(Serialize)]
pub struct JoinResponse {
    pub participant_id: Uuid,
    pub display_name: String,
    pub color: String,
}

/// `POST /api/session/:code/join` — admit a device into the session.
pub async fn join_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<JoinBody>,
) -> Result<Json<JoinResponse>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    let row = participant::join(&state.pool, session.id, &body.device_id, &body.display_name, now)
        .await
        .map_err(participant_error_to_status)?;

    ws::broadcast(
        &state,
        session.id,
        &Event::ParticipantJoined {
            participant_id: row.id,
            display_name: row.display_name.clone(),
            color: row.color.clone(),
        },
    )
    .await;

    Ok(Json(JoinResponse { participant_id: row.id, display_name: row.display_name, color: row.color }))
}

#[derive(Deserialize)]
pub struct LeaveBody {
    pub device_id: String,
}

/// `POST /api/session/:code/leave` — remove a device from the session.
/// Ends the session when the last participant leaves.
pub async fn leave_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<LeaveBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    let outcome = participant::leave(&state.pool, session.id, &body.device_id)
        .await
        .map_err(participant_error_to_status)?;

    ws::broadcast(&state, session.id, &Event::ParticipantLeft { participant_id: outcome.participant_id }).await;
    if outcome.session_ended {
        ws::broadcast(&state, session.id, &Event::SessionEnded).await;
    }

    Ok(Json(serde_json::json!({ "ok": true, "session_ended": outcome.session_ended })))
}

// =============================================================================
// DESTINATION
// =============================================================================

#[derive(Deserialize)]
pub struct DestinationBody {
    pub lat: f64,
    pub lng: f64,
    pub label: Option<String>,
}

/// `PUT /api/session/:code/destination` — set the shared destination.
/// Every cached route in the session is dropped in the same transaction.
pub async fn set_destination(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<DestinationBody>,
) -> Result<Json<Destination>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    let destination = session::set_destination(&state.pool, session.id, Coord::new(body.lat, body.lng), body.label, now)
        .await
        .map_err(session_error_to_status)?;

    ws::broadcast(&state, session.id, &Event::DestinationChanged { destination: Some(destination.clone()) }).await;
    ws::broadcast(&state, session.id, &Event::RoutesInvalidated).await;

    Ok(Json(destination))
}

/// `DELETE /api/session/:code/destination` — clear the shared destination.
pub async fn clear_destination(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    session::clear_destination(&state.pool, session.id)
        .await
        .map_err(session_error_to_status)?;

    ws::broadcast(&state, session.id, &Event::DestinationChanged { destination: None }).await;
    ws::broadcast(&state, session.id, &Event::RoutesInvalidated).await;

    Ok(Json(serde_json::json!({ "ok": true })))
}
