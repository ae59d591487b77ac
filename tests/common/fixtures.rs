//! wiremock fixtures for upstream services

use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::config::TEST_BOT_TOKEN;

/// Size of the fake audio files served by the fixtures
pub const MEDIA_SIZE: usize = 4096;

/// Fake audio bytes (above the default minimum artifact size)
pub fn media_bytes() -> Vec<u8> {
    (0..MEDIA_SIZE).map(|i| (i % 251) as u8).collect()
}

/// Serve fake audio at `route`
pub async fn mount_media(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(media_bytes()),
        )
        .mount(server)
        .await;
}

/// Scraper endpoint that answers every source with a descriptor for `media_route`
pub async fn mount_scraper_success(server: &MockServer, media_route: &str, title: &str) {
    Mock::given(method("GET"))
        .and(path("/scrape"))
        .and(header("x-api-key", "scraper-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "link": format!("{}{}", server.uri(), media_route),
            "title": title,
            "author": "Some Band",
            "duration": 181.0,
            "ext": "m4a",
        })))
        .mount(server)
        .await;
}

/// Scraper endpoint that is down
pub async fn mount_scraper_failure(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/scrape"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
}

/// Scraper endpoint pointing at the start of a redirect chain of `hops`
pub async fn mount_scraper_redirect_chain(server: &MockServer, hops: usize) {
    Mock::given(method("GET"))
        .and(path("/scrape"))
        .and(query_param("url", "https://example.com/redirecting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/r/0", server.uri()),
            "title": "Redirecting",
            "ext": "mp3",
        })))
        .mount(server)
        .await;

    for hop in 0..hops {
        Mock::given(method("GET"))
            .and(path(format!("/r/{hop}")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("/r/{}", hop + 1)),
            )
            .mount(server)
            .await;
    }
    mount_media(server, &format!("/r/{hops}")).await;
}

/// Telegram `sendAudio` that accepts the upload as message `message_id`
pub async fn mount_telegram_accepting(server: &MockServer, message_id: i64) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{TEST_BOT_TOKEN}/sendAudio")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": message_id },
        })))
        .mount(server)
        .await;
}

/// Telegram `sendAudio` that rejects the chat
pub async fn mount_telegram_rejecting(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/bot.+/sendAudio$"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found",
        })))
        .mount(server)
        .await;
}
