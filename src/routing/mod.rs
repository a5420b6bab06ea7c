//! Routing — client for the external road-routing engine.
//!
//! DESIGN
//! ======
//! The engine is an untrusted network dependency: it may be slow, down, or
//! return no route. The `RouteEngine` trait keeps the rest of the crate
//! engine-agnostic and mockable in tests; `OsrmClient` is the one concrete
//! implementation, configured from environment variables. A missing
//! configuration disables ETAs at startup without touching presence.

pub mod osrm;

pub use osrm::OsrmClient;

use crate::geo::Coord;

pub const DEFAULT_ROUTING_PROFILE: &str = "driving";
pub const DEFAULT_ROUTING_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ROUTING_CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by routing-engine operations.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// The required base-URL environment variable is not set.
    #[error("routing engine not configured: env var {var} not set")]
    MissingBaseUrl { var: String },

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The HTTP request to the engine failed (network, timeout).
    #[error("routing request failed: {0}")]
    Request(String),

    /// The engine returned a non-success HTTP status.
    #[error("routing response error: status {status}")]
    Response { status: u16, body: String },

    /// The engine response body could not be deserialized.
    #[error("routing response parse failed: {0}")]
    Parse(String),

    /// The engine answered but produced no route between the points.
    #[error("no route found: {0}")]
    NoRoute(String),
}

impl RoutingError {
    /// Transient failures worth one more attempt.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// A route as returned by the external engine. The geometry encoding is
/// opaque to this crate; it is cached and served verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedRoute {
    pub geometry: String,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Engine-neutral async trait for route computation. Enables mocking.
#[async_trait::async_trait]
pub trait RouteEngine: Send + Sync {
    /// Compute a route from `origin` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns a [`RoutingError`] on transport failure, a non-success
    /// response, or an empty result.
    async fn route(&self, origin: Coord, destination: Coord) -> Result<ComputedRoute, RoutingError>;
}

// =============================================================================
// CONFIG
// =============================================================================

/// Routing client configuration parsed from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub base_url: String,
    pub profile: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl RoutingConfig {
    /// Build typed routing config from environment variables.
    ///
    /// Required:
    /// - `ROUTING_BASE_URL`: OSRM-compatible endpoint, e.g. `https://router.example.com`
    ///
    /// Optional:
    /// - `ROUTING_PROFILE`: `driving` (default)
    /// - `ROUTING_REQUEST_TIMEOUT_SECS`: default 10
    /// - `ROUTING_CONNECT_TIMEOUT_SECS`: default 5
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::MissingBaseUrl`] when unconfigured.
    pub fn from_env() -> Result<Self, RoutingError> {
        let base_url = std::env::var("ROUTING_BASE_URL")
            .map_err(|_| RoutingError::MissingBaseUrl { var: "ROUTING_BASE_URL".into() })?
            .trim_end_matches('/')
            .to_string();
        let profile = std::env::var("ROUTING_PROFILE").unwrap_or_else(|_| DEFAULT_ROUTING_PROFILE.to_string());

        Ok(Self {
            base_url,
            profile,
            request_timeout_secs: env_parse_u64("ROUTING_REQUEST_TIMEOUT_SECS", DEFAULT_ROUTING_REQUEST_TIMEOUT_SECS),
            connect_timeout_secs: env_parse_u64("ROUTING_CONNECT_TIMEOUT_SECS", DEFAULT_ROUTING_CONNECT_TIMEOUT_SECS),
        })
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
