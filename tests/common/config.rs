//! Test configuration helpers

use media_relay::{Config, ProviderConfig};
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::TempDir;

/// Bot token the Telegram mock expects
pub const TEST_BOT_TOKEN: &str = "123456:TEST-TOKEN";

/// Config with scratch storage in `dir`, no ffmpeg, and Telegram at `telegram_base`
pub fn base_config(dir: &TempDir, telegram_base: &str) -> Config {
    let mut config = Config::default();
    config.download.temp_dir = dir.path().join("temp");
    config.download.connect_timeout = Duration::from_secs(5);
    config.download.timeout = Duration::from_secs(10);
    config.resolve.provider_timeout = Duration::from_secs(5);
    config.transform.ffmpeg_path = None;
    config.transform.search_path = false;
    config.transform.accepted_extensions = vec!["mp3".into(), "m4a".into()];
    config.delivery.bot_token = Some(TEST_BOT_TOKEN.to_string());
    config.delivery.api_base = telegram_base.to_string();
    config.delivery.performer = Some("@relay_bot".to_string());
    config.delivery.timeout = Duration::from_secs(5);
    config
}

/// Scraper API provider entry for `endpoint`
pub fn scraper(endpoint: String) -> ProviderConfig {
    ProviderConfig::ScraperApi {
        endpoint,
        api_key: Some("scraper-key".to_string()),
        params: BTreeMap::new(),
    }
}

/// Direct-link provider entry for the usual audio extensions
pub fn direct_link() -> ProviderConfig {
    ProviderConfig::DirectLink {
        extensions: vec!["mp3".into(), "m4a".into()],
    }
}

/// Live test settings loaded from `.env`
pub struct LiveSettings {
    /// Bot token of a real Telegram bot
    pub bot_token: String,
    /// Chat the bot may post to
    pub chat_id: String,
    /// Media page to fetch
    pub source_url: String,
}

/// Load live settings, or `None` if any variable is missing
///
/// Reads `RELAY_BOT_TOKEN`, `RELAY_CHAT_ID` and `RELAY_SOURCE_URL`.
pub fn load_live_settings() -> Option<LiveSettings> {
    dotenvy::dotenv().ok();
    Some(LiveSettings {
        bot_token: std::env::var("RELAY_BOT_TOKEN").ok()?,
        chat_id: std::env::var("RELAY_CHAT_ID").ok()?,
        source_url: std::env::var("RELAY_SOURCE_URL").ok()?,
    })
}
