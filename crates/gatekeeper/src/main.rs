//! # Gatekeeper - keypad CAPTCHA for group chats
//!
//! Mutes every new member and lifts the restriction once they solve a
//! rendered puzzle through an inline keypad in a private chat.
//!
//! ## Architecture
//! ```text
//! Telegram → Dispatcher → Verifier ─┬─ SessionLocks
//!                                   ├─ SessionStore (Redis | files | memory)
//!                                   ├─ CaptchaGenerator
//!                                   └─ Platform (restrict, send, edit)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod access;
mod bot;
mod captcha;
mod config;
mod keypad;
mod locks;
mod machine;
mod messages;
mod platform;
mod retry;
mod routes;
mod state;
mod store;
mod verifier;

use config::AppConfig;
use state::AppState;

/// Gatekeeper - keypad CAPTCHA bot
#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/gatekeeper.toml")]
    config: String,

    /// Bot API token (overrides config)
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Health endpoint listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("🔐 Starting Gatekeeper v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!("📋 Configuration loaded from {}", args.config);

    let state = AppState::new(&config).await?;

    // Pending challenges from before a restart must still expire
    state
        .verifier
        .recover_timeouts()
        .await
        .context("Failed to restore expiry timers")?;
    state.verifier.spawn_sweeper(config.store.sweep_interval());

    if let Some(addr) = config.health.listen_addr.clone() {
        let app = routes::create_router(state.clone());
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind health endpoint on {addr}"))?;
        info!("🚀 Health endpoint listening on {}", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "Health server error");
            }
        });
    }

    bot::run(state.bot.clone(), state.verifier.clone()).await;

    info!("👋 Gatekeeper shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
