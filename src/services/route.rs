//! Route cache — per-participant ETA/geometry with read-time staleness.
//!
//! DESIGN
//! ======
//! The external engine call is expensive, so its result is cached one row
//! per participant and served as potentially-stale. Staleness (age or
//! drift from the cached origin) is a flag computed at read time, never a
//! reason to withhold the route; recomputation is a policy the caller
//! applies via `needs_recompute`.
//!
//! ERROR HANDLING
//! ==============
//! An engine failure never modifies the cache: a stale route beats no
//! route. Only a successful computation overwrites the row.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::geo::{self, Coord};
use crate::routing::{RouteEngine, RoutingError};

/// A cached route is stale once older than this.
pub const MAX_ROUTE_AGE: Duration = Duration::minutes(5);

/// A cached route is stale once the participant has moved farther than
/// this from the origin it was computed from.
pub const MAX_DRIFT_M: f64 = 500.0;

const ENGINE_ATTEMPTS: usize = 2;
const ENGINE_RETRY_BASE_MS: u64 = 200;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("routing engine failure: {0}")]
    Engine(#[from] RoutingError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One cached route. Origin and destination are the coordinates the engine
/// actually computed against; the geometry encoding is opaque.
#[derive(Debug, Clone)]
pub struct RouteRow {
    pub participant_id: Uuid,
    pub session_id: Uuid,
    pub geometry: String,
    pub distance_m: f64,
    pub duration_s: f64,
    pub origin: Coord,
    pub destination: Coord,
    pub computed_at: OffsetDateTime,
}

/// One entry of the published ETA view.
#[derive(Debug, Clone, Serialize)]
pub struct EtaEntry {
    pub participant_id: Uuid,
    pub geometry: String,
    pub distance_m: f64,
    pub distance_text: String,
    pub eta_seconds: f64,
    pub eta_text: String,
    pub is_stale: bool,
}

type RouteTuple = (Uuid, Uuid, String, f64, f64, f64, f64, f64, f64, OffsetDateTime);

fn row_from_tuple(t: RouteTuple) -> RouteRow {
    let (participant_id, session_id, geometry, distance_m, duration_s, o_lat, o_lng, d_lat, d_lng, computed_at) = t;
    RouteRow {
        participant_id,
        session_id,
        geometry,
        distance_m,
        duration_s,
        origin: Coord::new(o_lat, o_lng),
        destination: Coord::new(d_lat, d_lng),
        computed_at,
    }
}

const SELECT_ROUTE: &str = "SELECT participant_id, session_id, geometry, distance_m, duration_s,
        origin_lat, origin_lng, destination_lat, destination_lng, computed_at FROM routes";

// =============================================================================
// STALENESS — pure policy
// =============================================================================

/// Read-time staleness: strictly older than 5 minutes, or strictly farther
/// than 500 m of great-circle drift from the cached origin. A participant
/// with no current position cannot drift.
#[must_use]
pub fn is_stale(route: &RouteRow, current_position: Option<Coord>, now: OffsetDateTime) -> bool {
    if now - route.computed_at > MAX_ROUTE_AGE {
        return true;
    }
    current_position.is_some_and(|pos| geo::haversine_m(route.origin, pos) > MAX_DRIFT_M)
}

/// Recomputation policy: no cached route, a destination other than the one
/// the cache was computed against (float-exact — both sides come from
/// stored rows), or plain staleness. Any single trigger suffices.
#[must_use]
pub fn needs_recompute(
    cached: Option<&RouteRow>,
    destination: Coord,
    current_position: Option<Coord>,
    now: OffsetDateTime,
) -> bool {
    let Some(route) = cached else {
        return true;
    };
    if route.destination != destination {
        return true;
    }
    is_stale(route, current_position, now)
}

/// Assemble the published ETA view from cached routes and current
/// positions. Stale entries are flagged, not withheld.
#[must_use]
pub fn assemble_etas(routes: Vec<RouteRow>, positions: &HashMap<Uuid, Coord>, now: OffsetDateTime) -> Vec<EtaEntry> {
    routes
        .into_iter()
        .map(|route| {
            let stale = is_stale(&route, positions.get(&route.participant_id).copied(), now);
            EtaEntry {
                participant_id: route.participant_id,
                distance_text: geo::format_distance(route.distance_m),
                eta_text: geo::format_duration(route.duration_s),
                geometry: route.geometry,
                distance_m: route.distance_m,
                eta_seconds: route.duration_s,
                is_stale: stale,
            }
        })
        .collect()
}

// =============================================================================
// CACHE I/O
// =============================================================================

/// Fetch the cached route for one participant, if any.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_route(pool: &PgPool, participant_id: Uuid) -> Result<Option<RouteRow>, RouteError> {
    let row = sqlx::query_as::<_, RouteTuple>(&format!("{SELECT_ROUTE} WHERE participant_id = $1"))
        .bind(participant_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(row_from_tuple))
}

/// Fetch every cached route in a session.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn session_routes(pool: &PgPool, session_id: Uuid) -> Result<Vec<RouteRow>, RouteError> {
    let rows = sqlx::query_as::<_, RouteTuple>(&format!("{SELECT_ROUTE} WHERE session_id = $1"))
        .bind(session_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(row_from_tuple).collect())
}

/// Delete every cached route in a session. Runs inside the destination
/// transaction; returns the number of rows dropped.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn invalidate_session_routes<'e, E>(executor: E, session_id: Uuid) -> Result<u64, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM routes WHERE session_id = $1")
        .bind(session_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

async fn upsert_route(pool: &PgPool, row: &RouteRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO routes (participant_id, session_id, geometry, distance_m, duration_s,
                             origin_lat, origin_lng, destination_lat, destination_lng, computed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (participant_id) DO UPDATE SET
             geometry = EXCLUDED.geometry, distance_m = EXCLUDED.distance_m, duration_s = EXCLUDED.duration_s,
             origin_lat = EXCLUDED.origin_lat, origin_lng = EXCLUDED.origin_lng,
             destination_lat = EXCLUDED.destination_lat, destination_lng = EXCLUDED.destination_lng,
             computed_at = EXCLUDED.computed_at",
    )
    .bind(row.participant_id)
    .bind(row.session_id)
    .bind(&row.geometry)
    .bind(row.distance_m)
    .bind(row.duration_s)
    .bind(row.origin.lat)
    .bind(row.origin.lng)
    .bind(row.destination.lat)
    .bind(row.destination.lng)
    .bind(row.computed_at)
    .execute(pool)
    .await?;
    Ok(())
}

// =============================================================================
// REFRESH
// =============================================================================

/// Recompute one participant's route via the external engine and overwrite
/// the cache. The engine call holds no locks; the cache write is a
/// separate idempotent upsert. On failure the cache is left untouched.
///
/// # Errors
///
/// `Engine` after the final failed attempt, or a database error from the
/// cache write.
pub async fn refresh_route(
    pool: &PgPool,
    engine: &dyn RouteEngine,
    session_id: Uuid,
    participant_id: Uuid,
    origin: Coord,
    destination: Coord,
    now: OffsetDateTime,
) -> Result<RouteRow, RouteError> {
    let computed = route_with_retry(engine, origin, destination).await?;

    let row = RouteRow {
        participant_id,
        session_id,
        geometry: computed.geometry,
        distance_m: computed.distance_m,
        duration_s: computed.duration_s,
        origin,
        destination,
        computed_at: now,
    };
    upsert_route(pool, &row).await?;

    info!(
        %session_id,
        %participant_id,
        distance_m = row.distance_m,
        duration_s = row.duration_s,
        "route cache refreshed"
    );
    Ok(row)
}

async fn route_with_retry(
    engine: &dyn RouteEngine,
    origin: Coord,
    destination: Coord,
) -> Result<crate::routing::ComputedRoute, RoutingError> {
    let mut attempt = 1;
    loop {
        match engine.route(origin, destination).await {
            Ok(route) => return Ok(route),
            Err(e) if e.retryable() && attempt < ENGINE_ATTEMPTS => {
                warn!(error = %e, attempt, total = ENGINE_ATTEMPTS, "routing engine call failed; retrying");
                tokio::time::sleep(StdDuration::from_millis(attempt as u64 * ENGINE_RETRY_BASE_MS)).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(error = %e, attempt, "routing engine call failed; cache left untouched");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
#[path = "route_test.rs"]
mod tests;
