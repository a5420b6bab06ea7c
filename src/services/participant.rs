//! Participant registry — join/leave bookkeeping and marker colors.
//!
//! DESIGN
//! ======
//! One row per (session, device): the UNIQUE key makes rejoin idempotent.
//! Marker colors cycle deterministically through a fixed palette by join
//! order; the sessions row carries a monotonically increasing join counter
//! so departed participants still advance the cycle.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::services::presence;

/// Marker colors assigned round-robin by join order.
pub const MARKER_PALETTE: [&str; 8] = [
    "#E53935", "#1E88E5", "#43A047", "#FB8C00", "#8E24AA", "#00ACC1", "#F4511E", "#3949AB",
];

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ParticipantError {
    #[error("device {device_id} is not a participant of this session")]
    NotInSession { device_id: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Row returned from participant queries.
#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub device_id: String,
    pub display_name: String,
    pub color: String,
    pub joined_at: OffsetDateTime,
    pub last_seen_at: OffsetDateTime,
}

/// Roster entry: every participant, live or not.
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub participant_id: Uuid,
    pub display_name: String,
    pub color: String,
    pub is_live: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Outcome of a leave: whether the departure ended the session.
#[derive(Debug, Clone, Copy)]
pub struct LeaveOutcome {
    pub participant_id: Uuid,
    pub session_ended: bool,
}

type ParticipantTuple = (Uuid, Uuid, String, String, String, OffsetDateTime, OffsetDateTime);

fn row_from_tuple(t: ParticipantTuple) -> ParticipantRow {
    let (id, session_id, device_id, display_name, color, joined_at, last_seen_at) = t;
    ParticipantRow { id, session_id, device_id, display_name, color, joined_at, last_seen_at }
}

const SELECT_PARTICIPANT: &str =
    "SELECT id, session_id, device_id, display_name, color, joined_at, last_seen_at FROM participants";

// =============================================================================
// COLOR ASSIGNMENT
// =============================================================================

/// Palette color for the nth join (0-based), cycling.
#[must_use]
pub fn color_for_join_seq(seq: i64) -> &'static str {
    let len = MARKER_PALETTE.len() as i64;
    MARKER_PALETTE[seq.rem_euclid(len) as usize]
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Admit a device into a session. Rejoining with the same device returns the
/// existing row unchanged.
///
/// # Errors
///
/// Returns a database error if the transaction fails.
pub async fn join(
    pool: &PgPool,
    session_id: Uuid,
    device_id: &str,
    display_name: &str,
    now: OffsetDateTime,
) -> Result<ParticipantRow, ParticipantError> {
    if let Some(existing) = find_member(pool, session_id, device_id).await? {
        return Ok(existing);
    }

    let mut tx = pool.begin().await?;

    // Burn the next join sequence number; the counter never decreases, so
    // colors keep cycling even after departures.
    let counter: i64 =
        sqlx::query_scalar("UPDATE sessions SET join_counter = join_counter + 1 WHERE id = $1 RETURNING join_counter")
            .bind(session_id)
            .fetch_one(tx.as_mut())
            .await?;
    let color = color_for_join_seq(counter - 1);

    let id = Uuid::new_v4();
    let inserted = sqlx::query(
        "INSERT INTO participants (id, session_id, device_id, display_name, color, joined_at, last_seen_at)
         VALUES ($1, $2, $3, $4, $5, $6, $6)
         ON CONFLICT (session_id, device_id) DO NOTHING",
    )
    .bind(id)
    .bind(session_id)
    .bind(device_id)
    .bind(display_name)
    .bind(color)
    .bind(now)
    .execute(tx.as_mut())
    .await?;
    tx.commit().await?;

    if inserted.rows_affected() == 0 {
        // Raced with a concurrent join from the same device; theirs won.
        return find_member(pool, session_id, device_id)
            .await?
            .ok_or(ParticipantError::Database(sqlx::Error::RowNotFound));
    }

    info!(%session_id, participant_id = %id, device_id, color, "participant joined");
    Ok(ParticipantRow {
        id,
        session_id,
        device_id: device_id.to_string(),
        display_name: display_name.to_string(),
        color: color.to_string(),
        joined_at: now,
        last_seen_at: now,
    })
}

/// Remove a device from a session, cascading to its presence and route rows.
/// Ends the session when the last participant leaves.
///
/// # Errors
///
/// `NotInSession` if the device was not a participant, or a database error.
pub async fn leave(pool: &PgPool, session_id: Uuid, device_id: &str) -> Result<LeaveOutcome, ParticipantError> {
    let mut tx = pool.begin().await?;

    let removed: Option<Uuid> =
        sqlx::query_scalar("DELETE FROM participants WHERE session_id = $1 AND device_id = $2 RETURNING id")
            .bind(session_id)
            .bind(device_id)
            .fetch_optional(tx.as_mut())
            .await?;
    let Some(participant_id) = removed else {
        return Err(ParticipantError::NotInSession { device_id: device_id.to_string() });
    };

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM participants WHERE session_id = $1")
        .bind(session_id)
        .fetch_one(tx.as_mut())
        .await?;
    let session_ended = remaining == 0;
    if session_ended {
        sqlx::query("UPDATE sessions SET status = 'ended' WHERE id = $1")
            .bind(session_id)
            .execute(tx.as_mut())
            .await?;
    }
    tx.commit().await?;

    info!(%session_id, %participant_id, remaining, session_ended, "participant left");
    Ok(LeaveOutcome { participant_id, session_ended })
}

// =============================================================================
// LOOKUP
// =============================================================================

/// Fetch a participant by (session, device) if present.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_member(
    pool: &PgPool,
    session_id: Uuid,
    device_id: &str,
) -> Result<Option<ParticipantRow>, ParticipantError> {
    let row = sqlx::query_as::<_, ParticipantTuple>(&format!(
        "{SELECT_PARTICIPANT} WHERE session_id = $1 AND device_id = $2"
    ))
    .bind(session_id)
    .bind(device_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_from_tuple))
}

/// Fetch a participant by (session, device), erroring when absent.
///
/// # Errors
///
/// `NotInSession` if the device has not joined, or a database error.
pub async fn require_member(
    pool: &PgPool,
    session_id: Uuid,
    device_id: &str,
) -> Result<ParticipantRow, ParticipantError> {
    find_member(pool, session_id, device_id)
        .await?
        .ok_or_else(|| ParticipantError::NotInSession { device_id: device_id.to_string() })
}

/// Full roster for a session, in join order, with liveness flags. Unlike the
/// live map view, nobody is dropped here.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn roster(pool: &PgPool, session_id: Uuid, now: OffsetDateTime) -> Result<Vec<RosterEntry>, ParticipantError> {
    let rows = sqlx::query_as::<_, ParticipantTuple>(&format!(
        "{SELECT_PARTICIPANT} WHERE session_id = $1 ORDER BY joined_at ASC"
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(row_from_tuple)
        .map(|p| RosterEntry {
            participant_id: p.id,
            display_name: p.display_name,
            color: p.color,
            is_live: presence::is_live(p.last_seen_at, now),
            joined_at: p.joined_at,
        })
        .collect())
}

/// Touch the liveness timestamp. Called on every gated submission, accepted
/// or soft-rejected: last-seen means the device is alive and talking.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn touch_last_seen(pool: &PgPool, participant_id: Uuid, now: OffsetDateTime) -> Result<(), ParticipantError> {
    sqlx::query("UPDATE participants SET last_seen_at = $2 WHERE id = $1")
        .bind(participant_id)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "participant_test.rs"]
mod tests;
