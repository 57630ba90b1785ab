//! Configuration management for Gatekeeper.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use gatekeeper_common::constants::{
    DEFAULT_DIGITS, DEFAULT_HEALTH_ADDR, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_RELOADS,
    DEFAULT_REDIS_URL, DEFAULT_SESSION_DIR, DEFAULT_SESSION_TTL_SECS, DEFAULT_SWEEP_INTERVAL_SECS,
    DEFAULT_TIMEOUT_SECS, MAX_ENTERED_DIGITS,
};
use gatekeeper_common::{Difficulty, GeneratorMode};

use crate::messages::Messages;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Telegram bot credentials
    #[serde(default)]
    pub bot: BotConfig,

    /// Session persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Puzzle generation
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Attempt/reload budgets and timeout policy
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Platform call retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// User-facing texts
    #[serde(default)]
    pub messages: Messages,

    /// Health endpoint
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    /// Bot API token (required)
    #[serde(default)]
    pub token: String,
}

/// Session store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Directory for the file backend
    #[serde(default = "default_session_dir")]
    pub directory: String,

    /// Lifetime of a session whose link was never followed. Redis also
    /// applies it as the record expiry.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Period of the abandoned-session sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            directory: default_session_dir(),
            session_ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl StoreConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// CAPTCHA-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default)]
    pub mode: GeneratorMode,

    /// Keypad alphabet, also the pool codes are drawn from
    #[serde(default = "default_digits")]
    pub digits: String,

    #[serde(default)]
    pub difficulty: Difficulty,

    /// Code length in default mode
    #[serde(default = "default_code_length")]
    pub code_length: usize,

    /// TrueType font for glyphs; stroke glyphs are drawn when unset
    #[serde(default)]
    pub font_path: Option<String>,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            mode: GeneratorMode::default(),
            digits: default_digits(),
            difficulty: Difficulty::default(),
            code_length: default_code_length(),
            font_path: None,
        }
    }
}

/// What happens to a member whose challenge timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryAction {
    /// Post a notice, leave the member muted in the chat
    #[default]
    Notify,
    /// Post a notice and remove the member (rejoin allowed)
    Remove,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// Seconds to solve an issued challenge
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Wrong submissions tolerated; one more removes the member
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Non-positive values hide the remaining-attempts counter on the submit button
    #[serde(default = "default_max_incorrect_to_auto_reload")]
    pub max_incorrect_to_auto_reload: i64,

    /// Reload credits granted per challenge
    #[serde(default = "default_max_reloads")]
    pub max_reloads: u32,

    #[serde(default)]
    pub expiry_action: ExpiryAction,
}

impl VerificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            max_incorrect_to_auto_reload: default_max_incorrect_to_auto_reload(),
            max_reloads: default_max_reloads(),
            expiry_action: ExpiryAction::default(),
        }
    }
}

/// Retry policy for platform and store calls
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total tries, including the first
    #[serde(default = "default_retry_attempts")]
    pub attempts: usize,

    #[serde(default = "default_retry_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay(),
            max_delay_ms: default_retry_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Listen address; health endpoints are disabled when unset
    #[serde(default = "default_health_addr")]
    pub listen_addr: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_health_addr(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_session_dir() -> String { DEFAULT_SESSION_DIR.to_string() }
fn default_session_ttl() -> u64 { DEFAULT_SESSION_TTL_SECS }
fn default_sweep_interval() -> u64 { DEFAULT_SWEEP_INTERVAL_SECS }
fn default_digits() -> String { DEFAULT_DIGITS.to_string() }
fn default_code_length() -> usize { MAX_ENTERED_DIGITS }
fn default_timeout() -> u64 { DEFAULT_TIMEOUT_SECS }
fn default_max_attempts() -> u32 { DEFAULT_MAX_ATTEMPTS }
fn default_max_incorrect_to_auto_reload() -> i64 { 2 }
fn default_max_reloads() -> u32 { DEFAULT_MAX_RELOADS }
fn default_retry_attempts() -> usize { 3 }
fn default_retry_base_delay() -> u64 { 200 }
fn default_retry_max_delay() -> u64 { 2_000 } // never hold a session lock for long
fn default_health_addr() -> Option<String> { Some(DEFAULT_HEALTH_ADDR.to_string()) }

impl AppConfig {
    /// Load configuration from file and environment, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("GATEKEEPER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to load configuration")?;

        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;

        // Apply CLI overrides
        if let Some(ref token) = args.token {
            config.bot.token = token.clone();
        }
        if let Some(ref redis_url) = args.redis_url {
            config.store.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.health.listen_addr = Some(listen.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Refuse to start on settings that would make challenges unusable
    pub fn validate(&self) -> Result<()> {
        if self.bot.token.trim().is_empty() {
            bail!("bot.token is required (set BOT_TOKEN or GATEKEEPER__BOT__TOKEN)");
        }

        let digits = &self.captcha.digits;
        if digits.is_empty() {
            bail!("captcha.digits cannot be empty");
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            bail!("captcha.digits must contain only the characters 0-9, got {digits:?}");
        }
        if digits.chars().collect::<HashSet<_>>().len() != digits.len() {
            bail!("captcha.digits contains duplicates: {digits:?}");
        }

        // Arithmetic answers may use any digit
        if self.captcha.mode == GeneratorMode::Math && !('0'..='9').all(|c| digits.contains(c)) {
            bail!("captcha.mode = \"math\" needs all digits 0-9 in captcha.digits, got {digits:?}");
        }

        // Codes longer than the input buffer could never be entered
        if !(1..=MAX_ENTERED_DIGITS).contains(&self.captcha.code_length) {
            bail!(
                "captcha.code_length must be between 1 and {MAX_ENTERED_DIGITS}, got {}",
                self.captcha.code_length
            );
        }

        if self.verification.timeout_secs == 0 {
            bail!("verification.timeout_secs must be positive");
        }
        if self.store.session_ttl_secs == 0 || self.store.sweep_interval_secs == 0 {
            bail!("store.session_ttl_secs and store.sweep_interval_secs must be positive");
        }
        if self.retry.attempts == 0 {
            bail!("retry.attempts must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.bot.token = "123456:ABC-DEF".into();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.captcha.digits, "1234567890");
        assert_eq!(config.verification.max_attempts, 2);
        assert_eq!(config.verification.max_reloads, 2);
        assert_eq!(config.verification.timeout(), Duration::from_secs(30));
        assert_eq!(config.verification.expiry_action, ExpiryAction::Notify);
    }

    #[test]
    fn test_validate_accepts_defaults_with_token() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_token() {
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_alphabet() {
        for digits in ["", "12a4", "1123"] {
            let mut config = valid();
            config.captcha.digits = digits.into();
            assert!(config.validate().is_err(), "accepted {digits:?}");
        }
    }

    #[test]
    fn test_validate_math_mode_needs_full_keypad() {
        let mut config = valid();
        config.captcha.mode = GeneratorMode::Math;
        assert!(config.validate().is_ok());
        config.captcha.digits = "123".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unenterable_code_length() {
        let mut config = valid();
        config.captcha.code_length = 5;
        assert!(config.validate().is_err());
        config.captcha.code_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_session_lifetimes() {
        let mut config = valid();
        config.store.session_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.store.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_difficulty_is_clamped() {
        let toml = r#"
            [bot]
            token = "42:xyz"

            [captcha]
            difficulty = 42
        "#;

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.captcha.difficulty, Difficulty::MAX);
        assert_eq!(config.captcha.difficulty.noise_lines(), Difficulty::MAX.noise_lines());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let toml = r#"
            [bot]
            token = "42:xyz"

            [store]
            backend = "file"
            directory = "/tmp/sessions"

            [captcha]
            mode = "math"
            difficulty = 3

            [verification]
            max_attempts = 4
            expiry_action = "remove"
        "#;

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.captcha.mode, GeneratorMode::Math);
        assert_eq!(config.captcha.difficulty.value(), 3);
        assert_eq!(config.verification.max_attempts, 4);
        assert_eq!(config.verification.expiry_action, ExpiryAction::Remove);
        assert_eq!(config.verification.max_reloads, 2);
        assert!(config.validate().is_ok());
    }
}
