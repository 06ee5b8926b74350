use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::api;
use crate::app::App;
use crate::config::ServerConfig;
use crate::{CompanionError, Result};

pub fn app(state: Arc<App>, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Layers applied innermost-first so the stack matches cors -> timeout -> body limit.
    Router::new()
        .nest("/api", api::router(state))
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
        .layer(TimeoutLayer::new(Duration::from_secs(u64::from(
            config.request_timeout_seconds,
        ))))
        .layer(cors)
}

pub async fn run(state: Arc<App>, config: &ServerConfig) -> Result<()> {
    let router = app(state, config);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("Web server running at http://{}", config.bind);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CompanionError::general(format!("Web server failed: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down web server");
}
