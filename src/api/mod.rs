//! REST API server module
//!
//! Exposes job submission, status polling, cancellation and live events over
//! HTTP, with an OpenAPI 3.1 description of every route.

use crate::error::Error;
use crate::{Config, MediaRelay, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Path prefix every route is mounted under
pub const API_PREFIX: &str = "/api/v1";

/// Create the API router with all route definitions
///
/// # Routes
///
/// All routes live under `/api/v1`.
///
/// ## Jobs (initData-protected when `server.api.require_init_data` is set)
/// - `POST /jobs` - Submit a URL for delivery
/// - `GET /jobs` - List jobs still in the registry
/// - `GET /jobs/:id` - Poll one job
/// - `DELETE /jobs/:id` - Cancel a running job
/// - `GET /resolve?url=...` - Run the provider chain without creating a job
/// - `GET /capabilities` - Providers, transcoder and sink in use
/// - `GET /events` - Server-sent events stream
///
/// ## Upload (checks initData itself, from the `init_data` form field or header)
/// - `POST /upload` - Convert a multipart `file` and return the audio
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI document
///
/// # Errors
///
/// [`Error::Config`] if initData validation is required but no bot token is
/// configured.
pub fn create_router(relay: Arc<MediaRelay>, config: Arc<Config>) -> Result<Router> {
    let verifier = config
        .bot_token()
        .map(auth::InitDataVerifier::new)
        .transpose()?
        .map(Arc::new);
    let state = AppState::new(relay, config.clone(), verifier.clone());

    let protected = Router::new()
        .route("/jobs", get(routes::list_jobs).post(routes::submit_job))
        .route(
            "/jobs/:id",
            get(routes::get_job).delete(routes::cancel_job),
        )
        .route("/resolve", get(routes::resolve))
        .route("/capabilities", get(routes::get_capabilities))
        .route("/events", get(routes::event_stream));

    let protected = if config.server.api.require_init_data {
        let verifier = verifier.ok_or_else(|| Error::Config {
            message: "initData validation requires a bot token".to_string(),
            key: Some("delivery.bot_token".to_string()),
        })?;
        protected.route_layer(middleware::from_fn_with_state(
            verifier,
            auth::require_init_data,
        ))
    } else {
        protected
    };

    let upload = Router::new().route(
        "/upload",
        post(routes::upload).layer(DefaultBodyLimit::max(config.server.api.max_upload_bytes)),
    );

    let public = Router::new()
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    let router = Router::new()
        .nest(API_PREFIX, public.merge(upload).merge(protected))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        Ok(router.layer(cors))
    } else {
        Ok(router)
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin. Methods and headers are always
/// unrestricted so the initData header passes preflight.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops or fails.
///
/// # Example
///
/// ```no_run
/// use media_relay::{Config, MediaRelay};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let relay = Arc::new(MediaRelay::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// media_relay::api::start_api_server(relay, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(relay: Arc<MediaRelay>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(relay, config)?;

    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
