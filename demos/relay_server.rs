//! REST API server demo
//!
//! Runs media-relay with the REST API enabled and delivers to Telegram.
//!
//! Environment (a `.env` file is loaded if present):
//! - `BOT_TOKEN` - Telegram bot token (required)
//! - `PORT` - API port (default: 3000)
//! - `REQUIRE_INIT_DATA` - set to `1` to require Telegram WebApp initData
//! - `RUST_LOG` - tracing filter (default: `info,media_relay=debug`)
//!
//! After starting, you can:
//! - Submit a job via POST http://localhost:3000/api/v1/jobs
//! - Poll it via GET http://localhost:3000/api/v1/jobs/{id}
//! - Stream events via GET http://localhost:3000/api/v1/events

use media_relay::config::{ApiConfig, Config, ServerIntegrationConfig};
use media_relay::{MediaRelay, run_with_shutdown};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,media_relay=debug")),
        )
        .init();

    let bot_token = std::env::var("BOT_TOKEN").map_err(|_| "BOT_TOKEN is not set")?;
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let require_init_data = std::env::var("REQUIRE_INIT_DATA").is_ok_and(|v| v == "1");

    let mut config = Config {
        server: ServerIntegrationConfig {
            api: ApiConfig {
                bind_address: SocketAddr::from(([0, 0, 0, 0], port)),
                require_init_data,
                ..Default::default()
            },
        },
        ..Default::default()
    };
    config.delivery.bot_token = Some(bot_token);

    let relay = MediaRelay::new(config).await?;
    println!("{:#?}", relay.capabilities().await);

    println!("🚀 Starting media-relay REST API server");
    println!("📡 API Base: http://localhost:{port}/api/v1");
    println!("🔄 Events stream: http://localhost:{port}/api/v1/events");
    println!();
    println!("Example commands:");
    println!("  # Submit a job");
    println!("  curl -X POST http://localhost:{port}/api/v1/jobs \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"url\": \"https://example.com/track.mp3\", \"chat_id\": 123456789}}'");
    println!();
    println!("  # Convert a video to mp3 (initData from the Mini App)");
    println!("  curl -F file=@clip.mp4 -F init_data=\"$INIT_DATA\" \\");
    println!("    -o clip.mp3 http://localhost:{port}/api/v1/upload");
    println!();
    println!("  # Stream events (Server-Sent Events)");
    println!("  curl -N http://localhost:{port}/api/v1/events");

    let server = Arc::new(relay.clone()).spawn_api_server();

    run_with_shutdown(relay).await;
    server.abort();

    Ok(())
}
