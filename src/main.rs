use std::sync::Arc;

use convoy::routing::{OsrmClient, RouteEngine, RoutingConfig};
use convoy::{db, routes, services, state};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    // Initialize routing client (non-fatal: ETAs disabled if config missing).
    let engine: Option<Arc<dyn RouteEngine>> = match RoutingConfig::from_env() {
        Ok(config) => match OsrmClient::new(config.clone()) {
            Ok(client) => {
                tracing::info!(base_url = %config.base_url, profile = %config.profile, "routing engine initialized");
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!(error = %e, "routing client build failed — ETAs disabled");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "routing engine not configured — ETAs disabled");
            None
        }
    };

    let state = state::AppState::new(pool, engine);

    // Spawn background session expiry sweep.
    let _sweep = services::sweep::spawn_sweep_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "convoy listening");
    axum::serve(listener, app).await.expect("server failed");
}
