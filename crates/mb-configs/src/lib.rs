//! # mb-configs
//!
//! Layered application configuration: built-in defaults, then an optional
//! `moodboard.toml`, then `MOODBOARD__*` environment variables (a `.env`
//! file is read first when present).
//!
//! Nested keys use a double underscore, e.g.
//! `MOODBOARD__REALTIME__RETENTION_SECS=600`.

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "MOODBOARD";
pub const CONFIG_FILE: &str = "moodboard";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// May embed credentials, hence secret.
    pub database_url: SecretString,
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` overrides it.
    pub log_filter: String,
    pub log_json: bool,
    pub realtime: RealtimeConfig,
    pub emotion: EmotionConfig,
    pub invite: InviteConfig,
}

#[derive(Debug, Deserialize)]
pub struct RealtimeConfig {
    /// How long a cache for an inactive query key is kept.
    pub retention_secs: u64,
}

impl RealtimeConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct EmotionConfig {
    pub enabled: bool,
    /// Total tagging attempts per post, first try included.
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize)]
pub struct InviteConfig {
    pub salt: SecretString,
}

impl AppConfig {
    /// Loads from `.env`, `moodboard.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
        }

        let config = Self::defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::finish(config)
    }

    /// Defaults overlaid with an inline TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("database_url", "sqlite::memory:")?
            .set_default("log_filter", "info")?
            .set_default("log_json", false)?
            .set_default("realtime.retention_secs", 300)?
            .set_default("emotion.enabled", true)?
            .set_default("emotion.max_attempts", 2)?
            .set_default("invite.salt", "moodboard-dev-salt")?)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.emotion.max_attempts == 0 {
            return Err(ConfigError::Invalid("emotion.max_attempts must be at least 1".into()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter must not be empty".into()));
        }
        Ok(())
    }
}
