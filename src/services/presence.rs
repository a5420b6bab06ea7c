//! Presence store — the location ingestion gate, delay overlay, and
//! liveness filter.
//!
//! ARCHITECTURE
//! ============
//! Exactly one presence row per participant, ever: the row is keyed by
//! participant id and written only through a single upsert, so the store
//! holds a snapshot, never a history. Raw GPS samples pass a validating
//! gate first — an accuracy ceiling and an implied-speed ceiling that
//! rejects teleport-grade jumps.
//!
//! The gate's verdict is a pure function over (prior sample, update, now):
//! the boundary numbers are load-bearing and unit-tested without a
//! database. Soft rejections are structured results, not errors; the
//! client just tries again on its next GPS tick.
//!
//! Delay badges and liveness are read-time derivations. Nothing sweeps
//! them; an aged-out badge or a silent participant simply stops appearing
//! on the next read.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::geo::{self, Coord};
use crate::services::participant::{self, ParticipantError};

/// Samples with a reported accuracy radius above this are not trusted.
pub const MAX_ACCURACY_M: f64 = 100.0;

/// Implied-speed ceiling for the teleport guard (~180 km/h).
pub const MAX_SPEED_MPS: f64 = 50.0;

/// A participant is live while their last contact is younger than this.
pub const LIVENESS_WINDOW: Duration = Duration::seconds(60);

/// Delay badges age out of every view after this long.
pub const DELAY_TTL: Duration = Duration::minutes(15);

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("device {device_id} is not a participant of this session")]
    NotInSession { device_id: String },
    #[error("no presence record exists for this participant")]
    NoPresenceRecord,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ParticipantError> for PresenceError {
    fn from(err: ParticipantError) -> Self {
        match err {
            ParticipantError::NotInSession { device_id } => Self::NotInSession { device_id },
            ParticipantError::Database(e) => Self::Database(e),
        }
    }
}

/// A location sample as submitted by a device.
#[derive(Debug, Clone, Copy)]
pub struct LocationUpdate {
    pub coord: Coord,
    pub heading: Option<f64>,
    pub speed_mps: Option<f64>,
    pub accuracy_m: Option<f64>,
}

/// Why a sample was not accepted. Expected, recoverable client behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowAccuracy,
    ImpossibleSpeed,
}

/// Gate verdict for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// Result of a gated submission. `live` carries the updated published
/// entry for broadcast; it is `Some` exactly when the sample was accepted.
#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub outcome: SubmitOutcome,
    pub live: Option<LiveParticipant>,
}

/// The previously committed sample the speed guard validates against.
#[derive(Debug, Clone, Copy)]
pub struct PriorSample {
    pub coord: Coord,
    pub updated_at: OffsetDateTime,
}

/// Self-declared slowdown kind. Closed set; a social signal only — never
/// an input to ETA or route computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayKind {
    Traffic,
    Blocked,
    Slow,
    Other,
}

impl DelayKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Traffic => "traffic",
            Self::Blocked => "blocked",
            Self::Slow => "slow",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "traffic" => Some(Self::Traffic),
            "blocked" => Some(Self::Blocked),
            "slow" => Some(Self::Slow),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A self-declared "I'm late" badge embedded in the presence row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DelayAnnotation {
    pub kind: DelayKind,
    pub minutes: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub reported_at: OffsetDateTime,
}

/// The stored snapshot for one participant. `delay` is raw here — read
/// sites apply [`delay_visible`] before publishing.
#[derive(Debug, Clone)]
pub struct PresenceRow {
    pub participant_id: Uuid,
    pub session_id: Uuid,
    pub coord: Coord,
    pub heading: Option<f64>,
    pub speed_mps: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub updated_at: OffsetDateTime,
    pub delay: Option<DelayAnnotation>,
}

/// One position sample as published to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct PositionSample {
    #[serde(flatten)]
    pub coord: Coord,
    pub heading: Option<f64>,
    pub speed_mps: Option<f64>,
    pub accuracy_m: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A participant as shown on the live map: only live participants appear,
/// and their delay badge is already expiry-filtered.
#[derive(Debug, Clone, Serialize)]
pub struct LiveParticipant {
    pub participant_id: Uuid,
    pub device_id: String,
    pub display_name: String,
    pub color: String,
    pub position: Option<PositionSample>,
    pub delay: Option<DelayAnnotation>,
}

// =============================================================================
// GATE — pure decision logic
// =============================================================================

/// Gate verdict for a submission, given the previously committed sample.
///
/// Checks in order, short-circuiting: accuracy ceiling (exactly 100 m still
/// passes), then implied speed against the prior sample (exactly 50 m/s
/// still passes). The speed guard is skipped on a first-ever submission,
/// when the prior position is the (0, 0) sentinel, and when no time has
/// elapsed since the prior sample.
#[must_use]
pub fn evaluate_update(prior: Option<&PriorSample>, update: &LocationUpdate, now: OffsetDateTime) -> SubmitOutcome {
    if let Some(accuracy) = update.accuracy_m {
        if accuracy > MAX_ACCURACY_M {
            return SubmitOutcome::Rejected(RejectReason::LowAccuracy);
        }
    }

    if let Some(prior) = prior {
        if !prior.coord.is_null_island() {
            let elapsed = (now - prior.updated_at).as_seconds_f64();
            if elapsed > 0.0 {
                let implied_speed = geo::haversine_m(prior.coord, update.coord) / elapsed;
                if implied_speed > MAX_SPEED_MPS {
                    return SubmitOutcome::Rejected(RejectReason::ImpossibleSpeed);
                }
            }
        }
    }

    SubmitOutcome::Accepted
}

/// Liveness: strictly less than 60 seconds since last contact.
#[must_use]
pub fn is_live(last_seen_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    now - last_seen_at < LIVENESS_WINDOW
}

/// Whether a delay badge is still shown: it expires once strictly older
/// than 15 minutes.
#[must_use]
pub fn delay_visible(reported_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    now - reported_at <= DELAY_TTL
}

// =============================================================================
// SUBMIT
// =============================================================================

/// Submit one location sample through the gate.
///
/// The caller has already passed the session lifecycle gate. Membership is
/// the remaining hard precondition; after it, any verdict — accepted or
/// soft-rejected — still touches last-seen, because either way the device
/// is alive and talking.
///
/// # Errors
///
/// `NotInSession` if the device has not joined, or a database error.
pub async fn submit_location(
    pool: &PgPool,
    session_id: Uuid,
    device_id: &str,
    update: LocationUpdate,
    now: OffsetDateTime,
) -> Result<SubmitResult, PresenceError> {
    let member = participant::require_member(pool, session_id, device_id).await?;
    participant::touch_last_seen(pool, member.id, now).await?;

    let prior = fetch_prior(pool, member.id).await?;
    let outcome = evaluate_update(prior.as_ref().map(|p| &p.sample), &update, now);

    match outcome {
        SubmitOutcome::Accepted => {
            upsert_position(pool, member.id, session_id, &update, now).await?;
            let delay = prior
                .and_then(|p| p.delay)
                .filter(|d| delay_visible(d.reported_at, now));
            let live = LiveParticipant {
                participant_id: member.id,
                device_id: member.device_id,
                display_name: member.display_name,
                color: member.color,
                position: Some(PositionSample {
                    coord: update.coord,
                    heading: update.heading,
                    speed_mps: update.speed_mps,
                    accuracy_m: update.accuracy_m,
                    updated_at: now,
                }),
                delay,
            };
            Ok(SubmitResult { outcome, live: Some(live) })
        }
        SubmitOutcome::Rejected(reason) => {
            debug!(participant_id = %member.id, ?reason, "location sample rejected");
            Ok(SubmitResult { outcome, live: None })
        }
    }
}

/// Write the accepted sample. One statement, keyed by participant: inserts
/// the first-ever row, otherwise patches in place. The delay columns are
/// deliberately absent from the update list — a badge survives position
/// patches and dies only by its own clock or an explicit clear.
async fn upsert_position(
    pool: &PgPool,
    participant_id: Uuid,
    session_id: Uuid,
    update: &LocationUpdate,
    now: OffsetDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO presence (participant_id, session_id, lat, lng, heading, speed_mps, accuracy_m, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (participant_id) DO UPDATE SET
             lat = EXCLUDED.lat, lng = EXCLUDED.lng, heading = EXCLUDED.heading,
             speed_mps = EXCLUDED.speed_mps, accuracy_m = EXCLUDED.accuracy_m,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(participant_id)
    .bind(session_id)
    .bind(update.coord.lat)
    .bind(update.coord.lng)
    .bind(update.heading)
    .bind(update.speed_mps)
    .bind(update.accuracy_m)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// The stored row the gate and the broadcast entry are derived from.
struct PriorRecord {
    sample: PriorSample,
    delay: Option<DelayAnnotation>,
}

async fn fetch_prior(pool: &PgPool, participant_id: Uuid) -> Result<Option<PriorRecord>, sqlx::Error> {
    let row = sqlx::query_as::<_, (f64, f64, OffsetDateTime, Option<String>, Option<i32>, Option<OffsetDateTime>)>(
        "SELECT lat, lng, updated_at, delay_kind, delay_minutes, delay_reported_at
         FROM presence WHERE participant_id = $1",
    )
    .bind(participant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(lat, lng, updated_at, dk, dm, dat)| PriorRecord {
        sample: PriorSample { coord: Coord::new(lat, lng), updated_at },
        delay: decode_delay(dk.as_deref(), dm, dat),
    }))
}

// =============================================================================
// DELAY OVERLAY
// =============================================================================

/// Declare or replace the participant's delay badge. Returns the owning
/// participant id and the stored annotation, for broadcast.
///
/// # Errors
///
/// `NotInSession` if the device has not joined, `NoPresenceRecord` if the
/// participant has never reported a position, or a database error.
pub async fn declare_delay(
    pool: &PgPool,
    session_id: Uuid,
    device_id: &str,
    kind: DelayKind,
    minutes: u32,
    now: OffsetDateTime,
) -> Result<(Uuid, DelayAnnotation), PresenceError> {
    let member = participant::require_member(pool, session_id, device_id).await?;
    let minutes = i32::try_from(minutes).unwrap_or(i32::MAX);

    let result = sqlx::query(
        "UPDATE presence SET delay_kind = $2, delay_minutes = $3, delay_reported_at = $4 WHERE participant_id = $1",
    )
    .bind(member.id)
    .bind(kind.as_str())
    .bind(minutes)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PresenceError::NoPresenceRecord);
    }
    Ok((member.id, DelayAnnotation { kind, minutes, reported_at: now }))
}

/// Remove the delay badge. Unconditionally idempotent: clearing an absent
/// badge — or clearing before any position exists — is a successful no-op.
/// Returns the owning participant id, for broadcast.
///
/// # Errors
///
/// `NotInSession` if the device has not joined, or a database error.
pub async fn clear_delay(pool: &PgPool, session_id: Uuid, device_id: &str) -> Result<Uuid, PresenceError> {
    let member = participant::require_member(pool, session_id, device_id).await?;
    sqlx::query(
        "UPDATE presence SET delay_kind = NULL, delay_minutes = NULL, delay_reported_at = NULL
         WHERE participant_id = $1",
    )
    .bind(member.id)
    .execute(pool)
    .await?;
    Ok(member.id)
}

// =============================================================================
// READ VIEWS
// =============================================================================

type LiveTuple = (
    Uuid,
    String,
    String,
    String,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<OffsetDateTime>,
    Option<String>,
    Option<i32>,
    Option<OffsetDateTime>,
);

/// The live map view: only participants heard from within the liveness
/// window, each with position-or-absent and an expiry-filtered delay badge.
/// Pure derivation — triggers no writes.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn live_participants(
    pool: &PgPool,
    session_id: Uuid,
    now: OffsetDateTime,
) -> Result<Vec<LiveParticipant>, PresenceError> {
    let cutoff = now - LIVENESS_WINDOW;
    let rows = sqlx::query_as::<_, LiveTuple>(
        "SELECT p.id, p.device_id, p.display_name, p.color,
                pr.lat, pr.lng, pr.heading, pr.speed_mps, pr.accuracy_m, pr.updated_at,
                pr.delay_kind, pr.delay_minutes, pr.delay_reported_at
         FROM participants p
         LEFT JOIN presence pr ON pr.participant_id = p.id
         WHERE p.session_id = $1 AND p.last_seen_at > $2
         ORDER BY p.joined_at ASC",
    )
    .bind(session_id)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|t| live_entry_from_tuple(t, now)).collect())
}

fn live_entry_from_tuple(t: LiveTuple, now: OffsetDateTime) -> LiveParticipant {
    let (id, device_id, display_name, color, lat, lng, heading, speed_mps, accuracy_m, updated_at, dk, dm, dat) = t;

    let position = match (lat, lng, updated_at) {
        (Some(lat), Some(lng), Some(updated_at)) => {
            Some(PositionSample { coord: Coord::new(lat, lng), heading, speed_mps, accuracy_m, updated_at })
        }
        _ => None,
    };

    let delay = decode_delay(dk.as_deref(), dm, dat).filter(|d| delay_visible(d.reported_at, now));

    LiveParticipant { participant_id: id, device_id, display_name, color, position, delay }
}

fn decode_delay(kind: Option<&str>, minutes: Option<i32>, reported_at: Option<OffsetDateTime>) -> Option<DelayAnnotation> {
    match (kind.and_then(DelayKind::from_str), minutes, reported_at) {
        (Some(kind), Some(minutes), Some(reported_at)) => Some(DelayAnnotation { kind, minutes, reported_at }),
        _ => None,
    }
}

/// Fetch the raw stored snapshot for one participant. Delay unfiltered.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_presence(pool: &PgPool, participant_id: Uuid) -> Result<Option<PresenceRow>, PresenceError> {
    let row = sqlx::query_as::<
        _,
        (
            Uuid,
            Uuid,
            f64,
            f64,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            OffsetDateTime,
            Option<String>,
            Option<i32>,
            Option<OffsetDateTime>,
        ),
    >(
        "SELECT participant_id, session_id, lat, lng, heading, speed_mps, accuracy_m, updated_at,
                delay_kind, delay_minutes, delay_reported_at
         FROM presence WHERE participant_id = $1",
    )
    .bind(participant_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(participant_id, session_id, lat, lng, heading, speed_mps, accuracy_m, updated_at, dk, dm, dat)| PresenceRow {
            participant_id,
            session_id,
            coord: Coord::new(lat, lng),
            heading,
            speed_mps,
            accuracy_m,
            updated_at,
            delay: decode_delay(dk.as_deref(), dm, dat),
        },
    ))
}

/// Current position per participant for a session. Used by the route cache
/// to evaluate drift.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn session_positions(pool: &PgPool, session_id: Uuid) -> Result<HashMap<Uuid, Coord>, PresenceError> {
    let rows = sqlx::query_as::<_, (Uuid, f64, f64)>("SELECT participant_id, lat, lng FROM presence WHERE session_id = $1")
        .bind(session_id)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, lat, lng)| (id, Coord::new(lat, lng)))
        .collect())
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
