//! Presence routes — location ingestion, delay badges, the live view.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::event::Event;
use crate::geo::Coord;
use crate::routes::sessions::session_error_to_status;
use crate::routes::ws;
use crate::services::presence::{
    self, DelayKind, LiveParticipant, LocationUpdate, PresenceError, RejectReason, SubmitOutcome,
};
use crate::services::session;
use crate::state::AppState;

pub(crate) fn presence_error_to_status(err: PresenceError) -> StatusCode {
    match err {
        PresenceError::NotInSession { .. } => StatusCode::FORBIDDEN,
        PresenceError::NoPresenceRecord => StatusCode::CONFLICT,
        PresenceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// LOCATION
// =============================================================================

#[derive(Deserialize)]
pub struct LocationBody {
    pub device_id: String,
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed_mps: Option<f64>,
    pub accuracy_m: Option<f64>,
}

/// Soft rejections come back through here as a structured result, never as
/// an HTTP error; the client just waits for its next GPS tick.
#[derive(Serialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

/// `POST /api/session/:code/location` — submit one GPS sample.
pub async fn submit_location(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<LocationBody>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    let update = LocationUpdate {
        coord: Coord::new(body.lat, body.lng),
        heading: body.heading,
        speed_mps: body.speed_mps,
        accuracy_m: body.accuracy_m,
    };
    let result = presence::submit_location(&state.pool, session.id, &body.device_id, update, now)
        .await
        .map_err(presence_error_to_status)?;

    if let Some(live) = result.live {
        ws::broadcast(&state, session.id, &Event::PresenceUpdated { participant: live }).await;
    }

    Ok(Json(match result.outcome {
        SubmitOutcome::Accepted => SubmitResponse { accepted: true, reason: None },
        SubmitOutcome::Rejected(reason) => SubmitResponse { accepted: false, reason: Some(reason) },
    }))
}

// =============================================================================
// DELAY
// =============================================================================

#[derive(Deserialize)]
pub struct DeclareDelayBody {
    pub device_id: String,
    pub kind: String,
    pub minutes: u32,
}

#[derive(Serialize)]
pub struct DelayResponse {
    pub participant_id: Uuid,
    pub kind: &'static str,
    pub minutes: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub reported_at: OffsetDateTime,
}

/// `POST /api/session/:code/delay` — declare or replace a delay badge.
pub async fn declare_delay(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<DeclareDelayBody>,
) -> Result<Json<DelayResponse>, StatusCode> {
    let Some(kind) = DelayKind::from_str(&body.kind) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    let (participant_id, annotation) =
        presence::declare_delay(&state.pool, session.id, &body.device_id, kind, body.minutes, now)
            .await
            .map_err(presence_error_to_status)?;

    ws::broadcast(&state, session.id, &Event::DelayChanged { participant_id, delay: Some(annotation) }).await;

    Ok(Json(DelayResponse {
        participant_id,
        kind: annotation.kind.as_str(),
        minutes: annotation.minutes,
        reported_at: annotation.reported_at,
    }))
}

#[derive(Deserialize)]
pub struct ClearDelayBody {
    pub device_id: String,
}

/// `DELETE /api/session/:code/delay` — clear the delay badge. Idempotent.
pub async fn clear_delay(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<ClearDelayBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    let participant_id = presence::clear_delay(&state.pool, session.id, &body.device_id)
        .await
        .map_err(presence_error_to_status)?;

    ws::broadcast(&state, session.id, &Event::DelayChanged { participant_id, delay: None }).await;

    Ok(Json(serde_json::json!({ "ok": true })))
}

// =============================================================================
// LIVE VIEW
// =============================================================================

/// `GET /api/session/:code/participants` — the live map view: only
/// participants heard from inside the liveness window.
pub async fn live_participants(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<LiveParticipant>>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    let live = presence::live_participants(&state.pool, session.id, now)
        .await
        .map_err(presence_error_to_status)?;
    Ok(Json(live))
}
