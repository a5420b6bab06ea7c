//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the HTTP API and the websocket event feed under a single Axum
//! router. Handlers translate between JSON and the service layer; every
//! mutation passes the session lifecycle gate before touching anything.

pub mod eta;
pub mod presence;
pub mod sessions;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/session", post(sessions::create_session))
        .route(
            "/api/session/{code}",
            get(sessions::get_session).delete(sessions::end_session),
        )
        .route("/api/session/{code}/join", post(sessions::join_session))
        .route("/api/session/{code}/leave", post(sessions::leave_session))
        .route(
            "/api/session/{code}/destination",
            put(sessions::set_destination).delete(sessions::clear_destination),
        )
        .route("/api/session/{code}/location", post(presence::submit_location))
        .route(
            "/api/session/{code}/delay",
            post(presence::declare_delay).delete(presence::clear_delay),
        )
        .route("/api/session/{code}/participants", get(presence::live_participants))
        .route("/api/session/{code}/etas", get(eta::get_etas))
        .route("/api/session/{code}/route", post(eta::recompute_route))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
