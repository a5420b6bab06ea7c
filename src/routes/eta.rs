//! ETA routes — the published route-cache view and on-demand recompute.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::routes::sessions::{participant_error_to_status, session_error_to_status};
use crate::services::route::{self, EtaEntry, RouteError, RouteRow};
use crate::services::{participant, presence, session};
use crate::state::AppState;

pub(crate) fn route_error_to_status(err: RouteError) -> StatusCode {
    match err {
        RouteError::Engine(_) => StatusCode::BAD_GATEWAY,
        RouteError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// ETA VIEW
// =============================================================================

#[derive(Serialize)]
pub struct EtasResponse {
    pub has_destination: bool,
    pub etas: Vec<EtaEntry>,
}

/// `GET /api/session/:code/etas` — every cached route in the session,
/// staleness flagged, stale entries served rather than withheld.
pub async fn get_etas(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<EtasResponse>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;

    if session.destination.is_none() {
        return Ok(Json(EtasResponse { has_destination: false, etas: Vec::new() }));
    }

    let routes = route::session_routes(&state.pool, session.id)
        .await
        .map_err(route_error_to_status)?;
    let positions = presence::session_positions(&state.pool, session.id)
        .await
        .map_err(crate::routes::presence::presence_error_to_status)?;

    Ok(Json(EtasResponse { has_destination: true, etas: route::assemble_etas(routes, &positions, now) }))
}

// =============================================================================
// RECOMPUTE
// =============================================================================

#[derive(Deserialize)]
pub struct RecomputeBody {
    pub device_id: String,
}

#[derive(Serialize)]
pub struct RouteResponse {
    pub participant_id: Uuid,
    pub geometry: String,
    pub distance_m: f64,
    pub eta_seconds: f64,
    /// True when this response triggered an external computation; false
    /// when the cached route was already fresh enough.
    pub recomputed: bool,
}

fn route_response(row: RouteRow, recomputed: bool) -> RouteResponse {
    RouteResponse {
        participant_id: row.participant_id,
        geometry: row.geometry,
        distance_m: row.distance_m,
        eta_seconds: row.duration_s,
        recomputed,
    }
}

/// `POST /api/session/:code/route` — refresh one participant's route if any
/// recompute trigger fires; otherwise serve the cached route untouched.
/// Engine failure leaves the cache as it was and maps to 502.
pub async fn recompute_route(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<RecomputeBody>,
) -> Result<Json<RouteResponse>, StatusCode> {
    let now = OffsetDateTime::now_utc();
    let session = session::ensure_active(&state.pool, &code, now)
        .await
        .map_err(session_error_to_status)?;
    let Some(destination) = session.destination else {
        return Err(StatusCode::CONFLICT);
    };

    let member = participant::require_member(&state.pool, session.id, &body.device_id)
        .await
        .map_err(participant_error_to_status)?;
    let origin = presence::get_presence(&state.pool, member.id)
        .await
        .map_err(crate::routes::presence::presence_error_to_status)?
        .ok_or(StatusCode::CONFLICT)?
        .coord;

    let cached = route::get_route(&state.pool, member.id)
        .await
        .map_err(route_error_to_status)?;
    if let Some(row) = cached {
        // All triggers quiet: serve the cache, no external call.
        if !route::needs_recompute(Some(&row), destination.coord, Some(origin), now) {
            return Ok(Json(route_response(row, false)));
        }
    }

    let Some(engine) = &state.engine else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let row = route::refresh_route(&state.pool, engine.as_ref(), session.id, member.id, origin, destination.coord, now)
        .await
        .map_err(route_error_to_status)?;

    Ok(Json(route_response(row, true)))
}
