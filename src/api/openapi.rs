//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI document for the media-relay REST API using
//! utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-relay REST API
///
/// Served at `/api/v1/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-relay REST API",
        version = "0.1.0",
        description = "Submit media URLs, follow jobs through resolve, download, transform and delivery, and stream job events",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3000/api/v1", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_job,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::cancel_job,
        crate::api::routes::resolve,

        // System
        crate::api::routes::get_capabilities,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,

        // Upload
        crate::api::routes::upload,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::JobStatus,
        crate::types::JobInfo,
        crate::types::Capabilities,
        crate::types::Event,

        // Config types from config.rs
        crate::config::Config,
        crate::config::ProviderConfig,
        crate::config::ResolveConfig,
        crate::config::DownloadConfig,
        crate::config::TransformConfig,
        crate::config::RegistryConfig,
        crate::config::DeliveryConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,

        // API request/response types from routes
        crate::api::routes::ChatId,
        crate::api::routes::SubmitJobRequest,
        crate::api::routes::SubmitJobResponse,
        crate::api::routes::ResolveQuery,
        crate::api::routes::ResolveResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Jobs - Submit media URLs, poll status, cancel, resolve without downloading"),
        (name = "system", description = "System endpoints - Health checks, capabilities, OpenAPI document, events"),
        (name = "upload", description = "Upload - Convert a file sent from the Mini App and return the audio"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the Telegram initData header scheme to the OpenAPI document
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "telegram_init_data",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Telegram-Init-Data"),
                    ),
                ),
            );
        }
    }
}
