//! Router assembly and the serve loop

use crate::routes;
use anyhow::{Context, Result};
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use drugrag_core::config::ServerConfig;
use drugrag_core::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared by every request
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Deadline for one `POST /query`
    pub timeout: Duration,
}

impl AppState {
    /// State whose deadline comes from the pipeline configuration
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let timeout = Duration::from_secs(pipeline.config().request_timeout_secs.max(1));
        Self { pipeline, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Build the application router
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/query", post(routes::query))
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Serve until ctrl-c
pub async fn start_server(state: AppState, config: &ServerConfig) -> Result<()> {
    let app = router(state, &config.allowed_origins);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
