//! Job handlers.

use super::{ResolveQuery, ResolveResponse, SubmitJobRequest, SubmitJobResponse};
use crate::api::AppState;
use crate::api::auth::WebAppUser;
use crate::error::ApiError;
use crate::types::{JobId, JobStatus, SubmitRequest};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST /jobs - Submit a job
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 202, description = "Job accepted", body = SubmitJobResponse),
        (status = 400, description = "Invalid URL or missing chat id", body = crate::error::ApiError),
        (status = 401, description = "Missing or invalid initData", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    user: Option<Extension<WebAppUser>>,
    Json(request): Json<SubmitJobRequest>,
) -> Response {
    let recipient = match (request.chat_id, user) {
        (Some(chat_id), _) => chat_id.to_string(),
        (None, Some(Extension(user))) => user.id.to_string(),
        (None, None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::validation("chat_id is required")),
            )
                .into_response();
        }
    };

    match state
        .relay
        .submit(SubmitRequest {
            url: request.url,
            recipient,
        })
        .await
    {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(SubmitJobResponse {
                job_id,
                status: JobStatus::Queued,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs - List jobs still in the registry
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "Jobs, oldest first", body = Vec<crate::types::JobInfo>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.list_jobs().await)
}

/// GET /jobs/:id - Poll one job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job status", body = crate::types::JobInfo),
        (status = 404, description = "Unknown or evicted job", body = crate::error::ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    match state.relay.status(id).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /jobs/:id - Cancel a running job
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 202, description = "Cancellation requested"),
        (status = 404, description = "Unknown or evicted job", body = crate::error::ApiError),
        (status = 409, description = "Job already finished", body = crate::error::ApiError)
    )
)]
pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    match state.relay.cancel(id).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({"job_id": id, "status": "cancelling"})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /resolve - Run the provider chain without creating a job
#[utoipa::path(
    get,
    path = "/api/v1/resolve",
    tag = "jobs",
    params(ResolveQuery),
    responses(
        (status = 200, description = "Resolved stream metadata", body = ResolveResponse),
        (status = 400, description = "Invalid URL", body = crate::error::ApiError),
        (status = 502, description = "Every provider failed", body = crate::error::ApiError)
    )
)]
pub async fn resolve(State(state): State<AppState>, Query(query): Query<ResolveQuery>) -> Response {
    match state.relay.resolve(&query.url).await {
        Ok(resolution) => {
            let extension = resolution.descriptor.container_extension();
            let descriptor = resolution.descriptor;
            (
                StatusCode::OK,
                Json(ResolveResponse {
                    provider: resolution.provider,
                    attempts: resolution.attempts,
                    title: descriptor.title,
                    uploader: descriptor.uploader,
                    duration_secs: descriptor.duration_secs,
                    thumbnail_url: descriptor.thumbnail_url,
                    extension,
                }),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}
