//! Telegram WebApp initData authentication for the REST API
//!
//! When `ApiConfig::require_init_data` is set, protected routes require an
//! `X-Telegram-Init-Data` header carrying the raw `initData` query string a
//! Telegram Mini App receives. The signature is checked as Telegram documents
//! it for WebApps (not the Login Widget):
//!
//! ```text
//! secret_key        = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//! data_check_string = sorted "key=value" lines, excluding "hash", joined by "\n"
//! hash              = hex(HMAC_SHA256(key = secret_key, msg = data_check_string))
//! ```
//!
//! The validated [`WebAppUser`] is stored in the request extensions so
//! handlers can fall back to it as the delivery recipient.

use crate::error::{ApiError, Error, Result};
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the raw initData string
pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";

/// Telegram user described by validated initData
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WebAppUser {
    /// Telegram user id (also the private chat id with the bot)
    pub id: i64,
    /// Username, if the user has one
    #[serde(default)]
    pub username: Option<String>,
    /// First name
    #[serde(default)]
    pub first_name: Option<String>,
}

/// Why an initData string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitDataError {
    /// No `hash` field
    #[error("initData has no hash")]
    MissingHash,
    /// Signature does not match the bot token
    #[error("bad initData signature")]
    BadSignature,
    /// Signed, but without a `user` field
    #[error("no user in initData")]
    MissingUser,
    /// `user` field is not the expected JSON object
    #[error("invalid user json in initData: {0}")]
    InvalidUser(String),
}

impl InitDataError {
    fn status(&self) -> StatusCode {
        match self {
            InitDataError::MissingHash | InitDataError::BadSignature => StatusCode::UNAUTHORIZED,
            InitDataError::MissingUser | InitDataError::InvalidUser(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for InitDataError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status == StatusCode::UNAUTHORIZED {
            ApiError::unauthorized(self.to_string())
        } else {
            ApiError::validation(self.to_string())
        };
        (status, Json(body)).into_response()
    }
}

/// Checks initData signatures for one bot
#[derive(Clone)]
pub struct InitDataVerifier {
    secret_key: Vec<u8>,
}

impl std::fmt::Debug for InitDataVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitDataVerifier").finish_non_exhaustive()
    }
}

impl InitDataVerifier {
    /// Derive the WebApp secret key from the bot token
    pub fn new(bot_token: &str) -> Result<Self> {
        let secret_key = hmac_sha256(b"WebAppData", bot_token.as_bytes())?;
        Ok(Self { secret_key })
    }

    /// Validate `init_data` and return the user it was issued for
    ///
    /// `auth_date` is not checked for age.
    pub fn verify(&self, init_data: &str) -> std::result::Result<WebAppUser, InitDataError> {
        let mut received_hash = None;
        let mut fields: Vec<(String, String)> = Vec::new();
        for (key, value) in url::form_urlencoded::parse(init_data.as_bytes()) {
            if key == "hash" {
                received_hash = Some(value.into_owned());
            } else {
                fields.push((key.into_owned(), value.into_owned()));
            }
        }

        let received_hash = received_hash
            .filter(|hash| !hash.is_empty())
            .ok_or(InitDataError::MissingHash)?;
        let received = hex::decode(received_hash).map_err(|_| InitDataError::BadSignature)?;

        fields.sort();
        let data_check_string = fields
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n");

        let mut mac = HmacSha256::new_from_slice(&self.secret_key)
            .map_err(|_| InitDataError::BadSignature)?;
        mac.update(data_check_string.as_bytes());
        mac.verify_slice(&received)
            .map_err(|_| InitDataError::BadSignature)?;

        let user = fields
            .iter()
            .find(|(key, _)| key == "user")
            .map(|(_, value)| value)
            .ok_or(InitDataError::MissingUser)?;
        serde_json::from_str(user).map_err(|e| InitDataError::InvalidUser(e.to_string()))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| Error::Config {
        message: format!("invalid HMAC key: {e}"),
        key: Some("delivery.bot_token".to_string()),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Middleware that requires valid initData on every request it wraps
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware};
/// use media_relay::api::auth::{InitDataVerifier, require_init_data};
/// use std::sync::Arc;
///
/// # fn example() -> media_relay::Result<()> {
/// let verifier = Arc::new(InitDataVerifier::new("123456:bot-token")?);
/// let router: Router = Router::new()
///     .layer(middleware::from_fn_with_state(verifier, require_init_data));
/// # Ok(())
/// # }
/// ```
pub async fn require_init_data(
    State(verifier): State<Arc<InitDataVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(INIT_DATA_HEADER)
        .and_then(|value| value.to_str().ok());

    let Some(init_data) = header else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::unauthorized("Missing X-Telegram-Init-Data header")),
        )
            .into_response();
    };

    match verifier.verify(init_data) {
        Ok(user) => {
            tracing::debug!(user_id = user.id, "initData accepted");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "initData rejected");
            e.into_response()
        }
    }
}
