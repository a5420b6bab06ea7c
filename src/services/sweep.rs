//! Expiry sweep — background cleanup for sessions past their TTL.
//!
//! DESIGN
//! ======
//! A background task periodically marks expired sessions ended and deletes
//! their participants; the presence and route rows go with them via
//! cascade. Correctness never depends on the sweep having run — the
//! lifecycle gate refuses expired sessions on its own — so a failed tick
//! is just logged and retried on the next one.

use std::time::Duration;

use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::state::AppState;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Spawn the background expiry sweep. Returns a handle for shutdown.
pub fn spawn_sweep_task(state: AppState) -> JoinHandle<()> {
    let interval_secs = env_parse("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
    info!(interval_secs, "session expiry sweep configured");
    tokio::spawn(async move {
        loop {
            match sweep_expired(&state.pool, OffsetDateTime::now_utc()).await {
                Ok(0) => {}
                Ok(swept) => info!(swept, "expired sessions ended and cleaned"),
                Err(e) => error!(error = %e, "expiry sweep failed; retrying next tick"),
            }
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    })
}

/// Mark every active session past its expiry as ended and delete its
/// participants (cascading to presence and routes). Returns the number of
/// sessions swept.
///
/// # Errors
///
/// Returns a database error if the transaction fails.
pub async fn sweep_expired(pool: &PgPool, now: OffsetDateTime) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let expired: Vec<Uuid> = sqlx::query_scalar(
        "UPDATE sessions SET status = 'ended' WHERE status = 'active' AND expires_at < $1 RETURNING id",
    )
    .bind(now)
    .fetch_all(tx.as_mut())
    .await?;

    if !expired.is_empty() {
        sqlx::query("DELETE FROM participants WHERE session_id = ANY($1)")
            .bind(&expired)
            .execute(tx.as_mut())
            .await?;
    }
    tx.commit().await?;

    Ok(expired.len() as u64)
}

#[cfg(test)]
#[path = "sweep_test.rs"]
mod tests;
