//! OSRM HTTP client.
//!
//! Thin wrapper for the `GET /route/v1/{profile}/{coords}` endpoint. Pure
//! parsing in `parse_response` for testability; transport stays in `route`.

use std::time::Duration;

use super::{ComputedRoute, RouteEngine, RoutingConfig, RoutingError};
use crate::geo::Coord;

// =============================================================================
// CLIENT
// =============================================================================

pub struct OsrmClient {
    http: reqwest::Client,
    base_url: String,
    profile: String,
}

impl OsrmClient {
    /// Build an OSRM client with bounded timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::HttpClientBuild`] if the HTTP client fails.
    pub fn new(config: RoutingConfig) -> Result<Self, RoutingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RoutingError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url, profile: config.profile })
    }

    /// The request URL for an origin/destination pair. OSRM takes
    /// `lng,lat` ordering.
    fn route_url(&self, origin: Coord, destination: Coord) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=polyline",
            self.base_url, self.profile, origin.lng, origin.lat, destination.lng, destination.lat
        )
    }
}

#[async_trait::async_trait]
impl RouteEngine for OsrmClient {
    async fn route(&self, origin: Coord, destination: Coord) -> Result<ComputedRoute, RoutingError> {
        let url = self.route_url(origin, destination);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RoutingError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RoutingError::Request(e.to_string()))?;

        if status != 200 {
            return Err(RoutingError::Response { status, body: text });
        }

        parse_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(serde::Deserialize)]
struct OsrmRoute {
    geometry: String,
    distance: f64,
    duration: f64,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_response(json: &str) -> Result<ComputedRoute, RoutingError> {
    let api: OsrmResponse = serde_json::from_str(json).map_err(|e| RoutingError::Parse(e.to_string()))?;

    if api.code != "Ok" {
        return Err(RoutingError::NoRoute(api.code));
    }

    let Some(best) = api.routes.into_iter().next() else {
        return Err(RoutingError::NoRoute("empty routes array".into()));
    };

    Ok(ComputedRoute { geometry: best.geometry, distance_m: best.distance, duration_s: best.duration })
}

#[cfg(test)]
#[path = "osrm_test.rs"]
mod tests;
