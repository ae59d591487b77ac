//! End-to-end pipeline tests against mocked upstreams
//!
//! A single wiremock server plays the scraping API, the media host and the
//! Telegram Bot API, so every job goes through the real provider chain,
//! streaming downloader and Telegram sink.
//!
//! ```bash
//! cargo test --test pipeline
//! ```

mod common;

use common::{
    MEDIA_SIZE, WaitResult, assert_scratch_empty, base_config, direct_link, job_info, mount_media,
    mount_scraper_failure, mount_scraper_redirect_chain, mount_scraper_success,
    mount_telegram_accepting, mount_telegram_rejecting, scraper, wait_for_outcome,
};
use media_relay::{Error, JobStatus, MediaRelay, SubmitRequest};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

const OUTCOME_TIMEOUT: Duration = Duration::from_secs(15);

fn submit(url: impl Into<String>) -> SubmitRequest {
    SubmitRequest {
        url: url.into(),
        recipient: "1001".into(),
    }
}

/// Multipart body of the only `sendAudio` request the server received
async fn sent_audio_body(server: &MockServer) -> String {
    let requests = server.received_requests().await.unwrap_or_default();
    let uploads: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path().ends_with("/sendAudio"))
        .collect();
    assert_eq!(uploads.len(), 1, "expected exactly one upload");
    String::from_utf8_lossy(&uploads[0].body).into_owned()
}

#[tokio::test]
async fn scraper_result_is_downloaded_and_sent_to_telegram() {
    let server = MockServer::start().await;
    mount_scraper_success(&server, "/media/song.m4a", "Great Song").await;
    mount_media(&server, "/media/song.m4a").await;
    mount_telegram_accepting(&server, 77).await;

    let dir = TempDir::new().unwrap();
    let mut config = base_config(&dir, &server.uri());
    config.providers = vec![scraper(format!("{}/scrape", server.uri())), direct_link()];
    let temp_dir = config.download.temp_dir.clone();

    let relay = MediaRelay::new(config).await.unwrap();
    let mut events = relay.subscribe();
    let id = relay
        .submit(submit("https://example.com/watch?v=abc"))
        .await
        .unwrap();

    match wait_for_outcome(&mut events, id, OUTCOME_TIMEOUT).await {
        WaitResult::Done(confirmation) => assert_eq!(confirmation, "77"),
        other => panic!("expected delivery, got {other:?}"),
    }

    let info = job_info(&relay, id).await;
    assert_eq!(info.status, JobStatus::Done);
    assert_eq!(info.provider.as_deref(), Some("scraper-api"));
    assert_eq!(info.title.as_deref(), Some("Great Song"));
    assert_eq!(info.downloaded_bytes, MEDIA_SIZE as u64);
    assert_scratch_empty(&temp_dir);

    let body = sent_audio_body(&server).await;
    assert!(body.contains("1001"), "chat id missing from upload");
    assert!(body.contains("Great Song.m4a"), "file name missing from upload");
    assert!(body.contains("@relay_bot"), "performer missing from upload");
}

#[tokio::test]
async fn direct_link_takes_over_when_the_scraper_is_down() {
    let server = MockServer::start().await;
    mount_scraper_failure(&server).await;
    mount_media(&server, "/files/track.mp3").await;
    mount_telegram_accepting(&server, 5).await;

    let dir = TempDir::new().unwrap();
    let mut config = base_config(&dir, &server.uri());
    config.providers = vec![scraper(format!("{}/scrape", server.uri())), direct_link()];
    let temp_dir = config.download.temp_dir.clone();

    let relay = MediaRelay::new(config).await.unwrap();
    let mut events = relay.subscribe();
    let id = relay
        .submit(submit(format!("{}/files/track.mp3", server.uri())))
        .await
        .unwrap();

    assert!(matches!(
        wait_for_outcome(&mut events, id, OUTCOME_TIMEOUT).await,
        WaitResult::Done(_)
    ));
    let info = job_info(&relay, id).await;
    assert_eq!(info.provider.as_deref(), Some("direct-link"));
    assert_scratch_empty(&temp_dir);
}

#[tokio::test]
async fn telegram_rejection_fails_the_job_in_sending() {
    let server = MockServer::start().await;
    mount_scraper_success(&server, "/media/song.m4a", "Song").await;
    mount_media(&server, "/media/song.m4a").await;
    mount_telegram_rejecting(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = base_config(&dir, &server.uri());
    config.providers = vec![scraper(format!("{}/scrape", server.uri()))];
    let temp_dir = config.download.temp_dir.clone();

    let relay = MediaRelay::new(config).await.unwrap();
    let mut events = relay.subscribe();
    let id = relay.submit(submit("https://example.com/a")).await.unwrap();

    match wait_for_outcome(&mut events, id, OUTCOME_TIMEOUT).await {
        WaitResult::Failed { stage, error } => {
            assert_eq!(stage, JobStatus::Sending);
            assert!(error.contains("chat not found"), "unexpected error: {error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    let info = job_info(&relay, id).await;
    assert_eq!(info.status, JobStatus::Error);
    assert_scratch_empty(&temp_dir);
}

#[tokio::test]
async fn redirect_chain_past_the_bound_never_reaches_sending() {
    let server = MockServer::start().await;
    mount_scraper_redirect_chain(&server, 6).await;
    mount_telegram_accepting(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let mut config = base_config(&dir, &server.uri());
    config.download.max_redirects = 5;
    config.providers = vec![scraper(format!("{}/scrape", server.uri()))];
    let temp_dir = config.download.temp_dir.clone();

    let relay = MediaRelay::new(config).await.unwrap();
    let mut events = relay.subscribe();
    let id = relay
        .submit(submit("https://example.com/redirecting"))
        .await
        .unwrap();

    match wait_for_outcome(&mut events, id, OUTCOME_TIMEOUT).await {
        WaitResult::Failed { stage, error } => {
            assert_eq!(stage, JobStatus::Downloading);
            assert!(error.contains("too many redirects"), "unexpected error: {error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_scratch_empty(&temp_dir);

    let uploads = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().ends_with("/sendAudio"))
        .count();
    assert_eq!(uploads, 0);
}

#[tokio::test]
async fn exhausted_chain_reports_the_last_provider() {
    let server = MockServer::start().await;
    mount_scraper_failure(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = base_config(&dir, &server.uri());
    config.providers = vec![direct_link(), scraper(format!("{}/scrape", server.uri()))];

    let relay = MediaRelay::new(config).await.unwrap();
    let mut events = relay.subscribe();
    let id = relay
        .submit(submit("https://example.com/watch?v=nothing"))
        .await
        .unwrap();

    match wait_for_outcome(&mut events, id, OUTCOME_TIMEOUT).await {
        WaitResult::Failed { stage, error } => {
            assert_eq!(stage, JobStatus::Downloading);
            assert!(error.contains("all 2 providers exhausted"), "{error}");
            assert!(error.contains("scraper-api"), "{error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn relay_without_bot_token_cannot_be_built() {
    let dir = TempDir::new().unwrap();
    let mut config = base_config(&dir, "http://127.0.0.1:9");
    config.delivery.bot_token = None;

    let err = MediaRelay::new(config).await.unwrap_err();
    match err {
        Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("delivery.bot_token")),
        other => panic!("expected config error, got {other}"),
    }
}

#[tokio::test]
async fn shutdown_refuses_new_jobs() {
    let dir = TempDir::new().unwrap();
    let relay = MediaRelay::new(base_config(&dir, "http://127.0.0.1:9"))
        .await
        .unwrap();

    relay.shutdown().await;
    assert!(relay.is_shutting_down());
    assert!(matches!(
        relay.submit(submit("https://example.com/a")).await,
        Err(Error::ShuttingDown)
    ));
}
