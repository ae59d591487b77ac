//! Delivery through the Telegram Bot API (`sendAudio`)

use super::{DeliveryRequest, DeliverySink};
use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, Error};
use crate::types::{DeliveryReceipt, audio_mime_for_extension};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    result: Option<TelegramMessage>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
}

/// Sends artifacts to a chat as audio messages
///
/// The bot token is part of every request URL, so transport errors are
/// reported without their URL.
#[derive(Clone)]
pub struct TelegramSink {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    performer: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSink")
            .field("api_base", &self.api_base)
            .field("performer", &self.performer)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TelegramSink {
    /// Build a sink from the delivery settings
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if no bot token is configured.
    pub fn from_config(config: &DeliveryConfig) -> crate::Result<Self> {
        let bot_token = config
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Config {
                message: "a bot token is required for Telegram delivery".to_string(),
                key: Some("delivery.bot_token".to_string()),
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            performer: config.performer.clone(),
            timeout: config.timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn build_form(&self, request: &DeliveryRequest) -> Result<Form, DeliveryError> {
        let performer = self.performer.clone().or_else(|| request.performer.clone());
        let audio = tokio::fs::read(&request.artifact_path)
            .await
            .map_err(|e| DeliveryError::Transport(format!("failed to read artifact: {e}")))?;
        let audio_part = Part::bytes(audio)
            .file_name(request.file_name.clone())
            .mime_str(audio_mime(&request.artifact_path))
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let mut form = Form::new()
            .text("chat_id", request.recipient.clone())
            .text("caption", caption(&request.title, performer.as_deref()))
            .text("title", request.title.clone());
        if let Some(performer) = performer {
            form = form.text("performer", performer);
        }
        if let Some(duration) = request.duration_secs {
            form = form.text("duration", (duration.round() as u64).to_string());
        }
        form = form.part("audio", audio_part);

        if let Some(thumbnail_path) = &request.thumbnail_path {
            match tokio::fs::read(thumbnail_path).await {
                Ok(bytes) => {
                    let part = Part::bytes(bytes)
                        .file_name("thumbnail.jpg")
                        .mime_str("image/jpeg")
                        .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;
                    form = form.part("thumbnail", part);
                }
                Err(e) => {
                    debug!(?thumbnail_path, error = %e, "thumbnail unreadable, sending without it");
                }
            }
        }
        Ok(form)
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError> {
        let form = self.build_form(request).await?;
        let send = self
            .client
            .post(self.method_url("sendAudio"))
            .multipart(form)
            .send();

        let response = match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(DeliveryError::Transport(e.without_url().to_string())),
            Err(_) => return Err(DeliveryError::Timeout(self.timeout)),
        };

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;
        let parsed: Option<TelegramResponse> = serde_json::from_slice(&body).ok();

        match parsed {
            Some(TelegramResponse {
                ok: true,
                result: Some(message),
                ..
            }) if status.is_success() => {
                debug!(chat_id = %request.recipient, message_id = message.message_id, "audio delivered");
                Ok(DeliveryReceipt {
                    confirmation: message.message_id.to_string(),
                })
            }
            Some(TelegramResponse {
                description: Some(description),
                ..
            }) => Err(DeliveryError::Rejected(format!(
                "{description} (HTTP {})",
                status.as_u16()
            ))),
            _ => Err(DeliveryError::Rejected(format!(
                "unexpected Bot API response (HTTP {})",
                status.as_u16()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

/// Message caption: title, then the performer line when there is one
fn caption(title: &str, performer: Option<&str>) -> String {
    match performer {
        Some(performer) if !performer.is_empty() => format!("🎵 {title}\n\n{performer}"),
        _ => format!("🎵 {title}"),
    }
}

fn audio_mime(path: &Path) -> &'static str {
    audio_mime_for_extension(path.extension().and_then(|e| e.to_str()).unwrap_or_default())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink_for(server: &MockServer) -> TelegramSink {
        TelegramSink::from_config(&DeliveryConfig {
            bot_token: Some("123:ABC".into()),
            api_base: server.uri(),
            performer: Some("@relay_bot".into()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request(dir: &TempDir) -> DeliveryRequest {
        let artifact_path = dir.path().join("song.mp3");
        std::fs::write(&artifact_path, "ID3 fake mp3 payload").unwrap();
        DeliveryRequest {
            recipient: "42".into(),
            artifact_path,
            file_name: "Artist - Song.mp3".into(),
            title: "Artist - Song".into(),
            performer: None,
            duration_secs: Some(211.6),
            thumbnail_path: None,
        }
    }

    #[tokio::test]
    async fn sends_audio_and_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendAudio"))
            .and(body_string_contains("Artist - Song.mp3"))
            .and(body_string_contains("🎵 Artist - Song\n\n@relay_bot"))
            .and(body_string_contains("ID3 fake mp3 payload"))
            .and(body_string_contains("212"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 777, "chat": {"id": 42}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let receipt = sink_for(&server).deliver(&request(&dir)).await.unwrap();
        assert_eq!(receipt.confirmation, "777");
    }

    #[tokio::test]
    async fn api_rejection_carries_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = sink_for(&server).deliver(&request(&dir)).await.unwrap_err();
        match err {
            DeliveryError::Rejected(message) => assert!(message.contains("chat not found")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ok_false_with_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": false})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = sink_for(&server).deliver(&request(&dir)).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected(_)));
    }

    #[tokio::test]
    async fn missing_artifact_is_a_transport_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let mut request = request(&dir);
        request.artifact_path = dir.path().join("gone.mp3");

        let err = sink_for(&server).deliver(&request).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let result = TelegramSink::from_config(&DeliveryConfig::default());
        match result {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("delivery.bot_token")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn caption_omits_empty_performer() {
        assert_eq!(caption("Song", Some("@bot")), "🎵 Song\n\n@bot");
        assert_eq!(caption("Song", None), "🎵 Song");
    }

    #[test]
    fn debug_output_hides_token() {
        let sink = TelegramSink::from_config(&DeliveryConfig {
            bot_token: Some("123:SECRET".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(!format!("{sink:?}").contains("SECRET"));
    }
}
