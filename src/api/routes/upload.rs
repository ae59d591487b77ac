//! Upload handler: convert a file sent from the Mini App and return the audio.

use crate::api::AppState;
use crate::api::auth::INIT_DATA_HEADER;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{Multipart, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};

/// Header naming the Telegram user a converted upload was issued for
pub const USER_ID_HEADER: &str = "x-user-id";

/// POST /upload - Convert an uploaded file to audio
///
/// Multipart fields: `file` (required) and `init_data` (required unless sent
/// in the `X-Telegram-Init-Data` header). initData is always checked here,
/// whether or not the job routes require it.
#[utoipa::path(
    post,
    path = "/api/v1/upload",
    tag = "upload",
    request_body(content = Vec<u8>, description = "Multipart form with `file` and `init_data`", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted audio file (audio/mpeg for mp3)"),
        (status = 400, description = "Missing file or malformed initData user", body = crate::error::ApiError),
        (status = 401, description = "Missing or invalid initData", body = crate::error::ApiError),
        (status = 413, description = "Upload larger than server.api.max_upload_bytes"),
        (status = 422, description = "Conversion failed or no transcoder available", body = crate::error::ApiError),
        (status = 503, description = "No bot token configured, or shutting down", body = crate::error::ApiError)
    )
)]
pub async fn upload(State(state): State<AppState>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    let Some(verifier) = state.init_data.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(
                "upload_unavailable",
                "uploads need delivery.bot_token to check initData",
            )),
        )
            .into_response();
    };

    let mut init_data = headers
        .get(INIT_DATA_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (
                    e.status(),
                    Json(ApiError::validation(format!("invalid multipart body: {}", e.body_text()))),
                )
                    .into_response();
            }
        };
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.mp4").to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((file_name, bytes.to_vec())),
                    Err(e) => {
                        return (
                            e.status(),
                            Json(ApiError::new(
                                "invalid_file",
                                format!("Failed to read file: {}", e.body_text()),
                            )),
                        )
                            .into_response();
                    }
                }
            }
            "init_data" => {
                if let Ok(text) = field.text().await {
                    init_data = Some(text);
                }
            }
            _ => {}
        }
    }

    let Some(init_data) = init_data.filter(|data| !data.is_empty()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::unauthorized("Missing init_data")),
        )
            .into_response();
    };
    let user = match verifier.verify(&init_data) {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!(error = %e, "upload initData rejected");
            return e.into_response();
        }
    };

    let Some((file_name, bytes)) = file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("missing_file", "No file provided in 'file' field")),
        )
            .into_response();
    };

    tracing::info!(user_id = user.id, file = %file_name, size = bytes.len(), "upload received");
    let converted = match state.relay.convert_upload(&file_name, &bytes).await {
        Ok(converted) => converted,
        Err(e) => return e.into_response(),
    };

    let disposition = content_disposition(&converted.file_name);
    let mut response = (StatusCode::OK, converted.data).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(converted.content_type));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(USER_ID_HEADER, HeaderValue::from(user.id));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    response
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    let encoded = url::form_urlencoded::byte_serialize(file_name.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_keeps_ascii_names_and_encodes_the_rest() {
        assert_eq!(
            content_disposition("My Clip.mp3"),
            "attachment; filename=\"My Clip.mp3\"; filename*=UTF-8''My%20Clip.mp3"
        );
        assert_eq!(
            content_disposition("Песня.mp3"),
            "attachment; filename=\"_____.mp3\"; filename*=UTF-8''%D0%9F%D0%B5%D1%81%D0%BD%D1%8F.mp3"
        );
    }
}
