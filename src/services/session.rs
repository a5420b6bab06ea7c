//! Session lifecycle — creation, the active-session gate, and destination.
//!
//! ARCHITECTURE
//! ============
//! A session is a bounded coordination context identified by a short
//! human-shareable code. Every presence/route/participant operation passes
//! through `ensure_active` first; ended or expired sessions refuse all
//! mutations even before the background sweep has caught them.
//!
//! Setting or clearing the destination deletes every cached route in the
//! session inside the same transaction: the old geometry points at the
//! wrong target entirely, so lazy staleness is not enough.

use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::geo::Coord;
use crate::services::route;

/// Session lifetime from creation.
pub const SESSION_TTL: Duration = Duration::hours(4);

/// Join-code alphabet: digits and capitals minus the confusable 0/O/1/I/L.
pub(crate) const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Join-code length.
pub const CODE_LEN: usize = 6;

const CODE_ATTEMPTS: usize = 5;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session not active: {0}")]
    NotActive(String),
    #[error("could not allocate a unique session code")]
    CodeExhausted,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    /// Parse a stored status. Unknown values map to `Ended` so that a
    /// corrupted row refuses operations rather than accepting them.
    #[must_use]
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            _ => Self::Ended,
        }
    }
}

/// The shared destination, when one has been set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Destination {
    #[serde(flatten)]
    pub coord: Coord,
    pub label: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub set_at: OffsetDateTime,
}

/// Row returned from session queries.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: Uuid,
    pub code: String,
    pub status: SessionStatus,
    pub destination: Option<Destination>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

type SessionTuple = (
    Uuid,
    String,
    String,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<OffsetDateTime>,
    OffsetDateTime,
    OffsetDateTime,
);

fn row_from_tuple(t: SessionTuple) -> SessionRow {
    let (id, code, status, dest_lat, dest_lng, dest_label, dest_set_at, created_at, expires_at) = t;
    let destination = match (dest_lat, dest_lng, dest_set_at) {
        (Some(lat), Some(lng), Some(set_at)) => {
            Some(Destination { coord: Coord::new(lat, lng), label: dest_label, set_at })
        }
        _ => None,
    };
    SessionRow { id, code, status: SessionStatus::from_db(&status), destination, created_at, expires_at }
}

// =============================================================================
// CODE GENERATION
// =============================================================================

/// Generate a 6-character join code from the unambiguous alphabet.
#[must_use]
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Normalize a caller-supplied code for lookup.
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

// =============================================================================
// GATE
// =============================================================================

/// Whether a session admits operations at `now`. Active status and an
/// unelapsed TTL are both required; exactly at `expires_at` still passes.
#[must_use]
pub fn is_open(status: SessionStatus, expires_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    status == SessionStatus::Active && now <= expires_at
}

/// Look up a session by code and enforce the lifecycle gate.
///
/// # Errors
///
/// `NotFound` for an unknown code, `NotActive` for an ended or expired
/// session, or a database error.
pub async fn ensure_active(pool: &PgPool, code: &str, now: OffsetDateTime) -> Result<SessionRow, SessionError> {
    let code = normalize_code(code);
    let Some(row) = find_session(pool, &code).await? else {
        return Err(SessionError::NotFound(code));
    };
    if !is_open(row.status, row.expires_at, now) {
        return Err(SessionError::NotActive(code));
    }
    Ok(row)
}

// =============================================================================
// CRUD
// =============================================================================

/// Create a session with a fresh unique code and a 4-hour TTL.
///
/// # Errors
///
/// `CodeExhausted` if every generated code collided, or a database error.
pub async fn create_session(pool: &PgPool, now: OffsetDateTime) -> Result<SessionRow, SessionError> {
    let expires_at = now + SESSION_TTL;

    for attempt in 1..=CODE_ATTEMPTS {
        let id = Uuid::new_v4();
        let code = generate_code();
        let result = sqlx::query(
            "INSERT INTO sessions (id, code, status, created_at, expires_at) VALUES ($1, $2, 'active', $3, $4)",
        )
        .bind(id)
        .bind(&code)
        .bind(now)
        .bind(expires_at)
        .execute(pool)
        .await;

        match result {
            Ok(_) => {
                info!(%id, %code, "session created");
                return Ok(SessionRow {
                    id,
                    code,
                    status: SessionStatus::Active,
                    destination: None,
                    created_at: now,
                    expires_at,
                });
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                warn!(attempt, %code, "session code collision; regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(SessionError::CodeExhausted)
}

/// Fetch a session by normalized code.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_session(pool: &PgPool, code: &str) -> Result<Option<SessionRow>, SessionError> {
    let row = sqlx::query_as::<_, SessionTuple>(
        "SELECT id, code, status, destination_lat, destination_lng, destination_label, destination_set_at,
                created_at, expires_at
         FROM sessions WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_from_tuple))
}

/// Mark a session ended. Idempotent.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn end_session(pool: &PgPool, session_id: Uuid) -> Result<(), SessionError> {
    sqlx::query("UPDATE sessions SET status = 'ended' WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;
    info!(%session_id, "session ended");
    Ok(())
}

// =============================================================================
// DESTINATION
// =============================================================================

/// Set the shared destination and drop every cached route in the session,
/// atomically.
///
/// # Errors
///
/// Returns a database error if the transaction fails.
pub async fn set_destination(
    pool: &PgPool,
    session_id: Uuid,
    coord: Coord,
    label: Option<String>,
    now: OffsetDateTime,
) -> Result<Destination, SessionError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE sessions
         SET destination_lat = $2, destination_lng = $3, destination_label = $4, destination_set_at = $5
         WHERE id = $1",
    )
    .bind(session_id)
    .bind(coord.lat)
    .bind(coord.lng)
    .bind(&label)
    .bind(now)
    .execute(tx.as_mut())
    .await?;
    let dropped = route::invalidate_session_routes(tx.as_mut(), session_id).await?;
    tx.commit().await?;

    info!(%session_id, dropped, "destination set; route cache invalidated");
    Ok(Destination { coord, label, set_at: now })
}

/// Clear the shared destination and drop every cached route, atomically.
///
/// # Errors
///
/// Returns a database error if the transaction fails.
pub async fn clear_destination(pool: &PgPool, session_id: Uuid) -> Result<(), SessionError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE sessions
         SET destination_lat = NULL, destination_lng = NULL, destination_label = NULL, destination_set_at = NULL
         WHERE id = $1",
    )
    .bind(session_id)
    .execute(tx.as_mut())
    .await?;
    let dropped = route::invalidate_session_routes(tx.as_mut(), session_id).await?;
    tx.commit().await?;

    info!(%session_id, dropped, "destination cleared; route cache invalidated");
    Ok(())
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
