//! Configuration management for perch-bot.
//!
//! Secrets come from environment variables, settings from a TOML file.
//!
//! # Configuration Sources
//!
//! ## Environment
//! - `DISCORD_TOKEN` - Discord bot token (the bot does not start without it)
//! - `PORT` - overrides `gateway.port`
//! - `PERCH_CONFIG_DIR` - directory holding `config.toml`
//!
//! ## Settings (TOML File)
//! Located at `~/.config/perch-bot/config.toml`:
//! ```toml
//! [gateway]
//! port = 3000
//!
//! [generators]
//! cache_capacity = 100
//! ```

mod secrets;
mod settings;

pub use secrets::Secrets;
pub use settings::{
    BrowserSettings, DiscordSettings, GatewaySettings, GeneratorSettings, LoggingSettings,
    RateLimitSettings, SearchSettings, Settings, SettingsError, WatchdogSettings,
};

/// Combined configuration containing both secrets and settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secrets loaded from environment variables
    pub secrets: Secrets,
    /// Settings loaded from TOML configuration file
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid PORT value '{0}'")]
    InvalidPort(String),
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// A missing `DISCORD_TOKEN` is not an error here: the liveness server
    /// still runs and reports the missing token.
    pub fn load() -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env();
        let mut settings = Settings::load()?;

        if let Some(port) = port_override(std::env::var("PORT").ok())? {
            settings.gateway.port = port;
        }

        Ok(Self { secrets, settings })
    }

    /// Get the Discord token (if configured).
    pub fn discord_token(&self) -> Option<&str> {
        self.secrets.discord_token.as_deref()
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        self.settings.bind_addr()
    }
}

fn port_override(raw: Option<String>) -> Result<Option<u16>, ConfigError> {
    match raw {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidPort(value)),
    }
}
