//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use teloxide::Bot;

use crate::captcha::CaptchaGenerator;
use crate::config::{AppConfig, StoreBackend};
use crate::platform::TelegramPlatform;
use crate::store::{FileSessionStore, MemorySessionStore, RedisSessionStore, SessionStore};
use crate::verifier::Verifier;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Verification orchestrator
    pub verifier: Arc<Verifier>,

    /// Bot client used by the dispatcher
    pub bot: Bot,

    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Open the session store, connect to Telegram and wire the verifier
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let store = open_store(config).await?;
        tracing::info!(backend = store.name(), "Session store ready");

        let generator = Arc::new(
            CaptchaGenerator::new(&config.captcha).context("Failed to initialise CAPTCHA generator")?,
        );

        let platform = Arc::new(
            TelegramPlatform::connect(&config.bot.token)
                .await
                .context("Failed to connect to Telegram")?,
        );
        let bot = platform.bot().clone();

        let verifier = Arc::new(Verifier::new(store, generator, platform, config));

        Ok(Self {
            verifier,
            bot,
            started_at: Instant::now(),
        })
    }
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.store.backend {
        StoreBackend::Redis => Arc::new(
            RedisSessionStore::connect(&config.store.redis_url, config.store.session_ttl_secs)
                .await
                .context("Failed to connect to Redis")?,
        ),
        StoreBackend::File => Arc::new(
            FileSessionStore::open(&config.store.directory)
                .await
                .with_context(|| format!("Failed to open session directory {}", config.store.directory))?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("Memory session store selected, sessions will not survive a restart");
            Arc::new(MemorySessionStore::new())
        }
    };
    Ok(store)
}
