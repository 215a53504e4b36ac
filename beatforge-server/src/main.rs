mod api;
mod config;
mod error;
mod models;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber;

use config::Config;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    tracing::info!("Starting beatforge-server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    if let Some(path) = &config.default_calibration_profile_path {
        tracing::info!(path, "default calibration profile configured");
    }

    // Build router
    let app = Router::new()
        .route("/health", get(api::health::health_handler))
        .route("/arrange", post(api::arrange::arrange_handler))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {}: {e}", config.bind_addr));

    tracing::info!("Server listening on {}", config.bind_addr);

    // Run server
    axum::serve(listener, app)
        .await
        .expect("Server error");
}
