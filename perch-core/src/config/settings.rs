//! Settings configuration loaded from TOML files.
//!
//! This module handles non-sensitive configuration stored in TOML format
//! in the XDG config directory (~/.config/perch-bot/config.toml).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# perch-bot configuration file
# Located at: ~/.config/perch-bot/config.toml
#
# This file contains non-sensitive configuration.
# The bot token is loaded from the environment:
#   - DISCORD_TOKEN
# The listen port can also be overridden with PORT.

[gateway]
host = "0.0.0.0"
port = 3000
# Expose GET /api?generator=<name>&list=<list>
api_enabled = false

[discord]
command_prefix = "!perch "
question_default_generator = "yesno"

[generators]
base_url = "https://perchance.org"
cache_capacity = 100
staleness_check_seconds = 3
load_attempts = 30
load_poll_interval_ms = 1000
request_timeout_seconds = 30

[browser]
headless = true
no_sandbox = false
# executable = "/usr/bin/chromium"

[search]
timeout_seconds = 15
cache_ttl_minutes = 15
engines = [
  "https://google.com/search?q={query}+site%3Aperchance.org",
  "https://www.bing.com/search?q={query}+site%3Aperchance.org",
  "https://duckduckgo.com/?q={query}+site%3Aperchance.org",
]

[rate_limit]
fallback_retry_seconds = 5

[watchdog]
poll_interval_seconds = 5
unresponsive_after_seconds = 30
request_timeout_seconds = 5
# gateway_command = "/usr/local/bin/perch-gateway"

[logging]
level = "info"
"#;

/// Settings loaded from TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Liveness / API server configuration
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Discord command surface
    #[serde(default)]
    pub discord: DiscordSettings,

    /// Generator download, cache and loading
    #[serde(default)]
    pub generators: GeneratorSettings,

    /// Headless browser used as the generator sandbox
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Search fallback for `>query` commands
    #[serde(default)]
    pub search: SearchSettings,

    /// Discord rate-limit handling
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Supervisor process settings
    #[serde(default)]
    pub watchdog: WatchdogSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Gateway server settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// Host to bind to
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Whether to serve the generator HTTP API
    #[serde(default)]
    pub api_enabled: bool,
}

/// Discord command settings
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordSettings {
    /// Prefix that marks a command message (including the trailing space)
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Generator used by `Perch, ...` questions without a `(generator)` suffix
    #[serde(default = "default_question_generator")]
    pub question_default_generator: String,
}

/// Generator loading and caching settings
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSettings {
    /// Perchance origin hosting the download and stats APIs
    #[serde(default = "default_generator_base_url")]
    pub base_url: String,

    /// Maximum number of loaded generator instances
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Minimum seconds between edit-time checks for one generator
    #[serde(default = "default_staleness_check_seconds")]
    pub staleness_check_seconds: u64,

    /// Readiness polls before a load is abandoned
    #[serde(default = "default_load_attempts")]
    pub load_attempts: u32,

    /// Delay between readiness polls in milliseconds
    #[serde(default = "default_load_poll_interval_ms")]
    pub load_poll_interval_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_generator_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

/// Headless browser settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    /// Explicit Chrome/Chromium executable (auto-detected when unset)
    #[serde(default)]
    pub executable: Option<String>,

    /// Run without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Pass `--no-sandbox` (needed in most containers)
    #[serde(default)]
    pub no_sandbox: bool,
}

/// Search fallback settings
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// URL templates tried in order; `{query}` is replaced by the `+`-joined query
    #[serde(default = "default_search_engines")]
    pub engines: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Cache TTL in minutes
    #[serde(default = "default_search_cache_ttl_minutes")]
    pub cache_ttl_minutes: u64,
}

/// Discord rate-limit settings
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Suppression window used when Discord reports a 429 without a usable delay
    #[serde(default = "default_fallback_retry_seconds")]
    pub fallback_retry_seconds: u64,
}

/// Watchdog settings
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSettings {
    /// Seconds between `/status` probes
    #[serde(default = "default_watchdog_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Seconds without an `online` answer before the gateway is restarted
    #[serde(default = "default_watchdog_unresponsive_after_seconds")]
    pub unresponsive_after_seconds: u64,

    /// Probe request timeout in seconds
    #[serde(default = "default_watchdog_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Gateway executable (searched in ./target and PATH when unset)
    #[serde(default)]
    pub gateway_command: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_command_prefix() -> String {
    "!perch ".to_string()
}

fn default_question_generator() -> String {
    "yesno".to_string()
}

fn default_generator_base_url() -> String {
    "https://perchance.org".to_string()
}

fn default_cache_capacity() -> usize {
    100
}

fn default_staleness_check_seconds() -> u64 {
    3
}

fn default_load_attempts() -> u32 {
    30
}

fn default_load_poll_interval_ms() -> u64 {
    1000
}

fn default_generator_request_timeout_seconds() -> u64 {
    30
}

fn default_search_engines() -> Vec<String> {
    vec![
        "https://google.com/search?q={query}+site%3Aperchance.org".to_string(),
        "https://www.bing.com/search?q={query}+site%3Aperchance.org".to_string(),
        "https://duckduckgo.com/?q={query}+site%3Aperchance.org".to_string(),
    ]
}

fn default_search_timeout_seconds() -> u64 {
    15
}

fn default_search_cache_ttl_minutes() -> u64 {
    15
}

fn default_fallback_retry_seconds() -> u64 {
    5
}

fn default_watchdog_poll_interval_seconds() -> u64 {
    5
}

fn default_watchdog_unresponsive_after_seconds() -> u64 {
    30
}

fn default_watchdog_request_timeout_seconds() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            api_enabled: false,
        }
    }
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            question_default_generator: default_question_generator(),
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            base_url: default_generator_base_url(),
            cache_capacity: default_cache_capacity(),
            staleness_check_seconds: default_staleness_check_seconds(),
            load_attempts: default_load_attempts(),
            load_poll_interval_ms: default_load_poll_interval_ms(),
            request_timeout_seconds: default_generator_request_timeout_seconds(),
        }
    }
}

impl GeneratorSettings {
    pub fn staleness_check_interval(&self) -> Duration {
        Duration::from_secs(self.staleness_check_seconds)
    }

    pub fn load_poll_interval(&self) -> Duration {
        Duration::from_millis(self.load_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: false,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            engines: default_search_engines(),
            timeout_seconds: default_search_timeout_seconds(),
            cache_ttl_minutes: default_search_cache_ttl_minutes(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            fallback_retry_seconds: default_fallback_retry_seconds(),
        }
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_watchdog_poll_interval_seconds(),
            unresponsive_after_seconds: default_watchdog_unresponsive_after_seconds(),
            request_timeout_seconds: default_watchdog_request_timeout_seconds(),
            gateway_command: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Get the configuration file path.
    ///
    /// Uses XDG config directory: `~/.config/perch-bot/config.toml`
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("PERCH_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("perch-bot");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_CONFIG_TOML)?;

        Ok(())
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }

    /// URL the watchdog probes for liveness.
    ///
    /// A wildcard bind host is probed through loopback.
    pub fn status_url(&self) -> String {
        let host = match self.gateway.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}/status", host, self.gateway.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.gateway.host, "0.0.0.0");
        assert_eq!(settings.gateway.port, 3000);
        assert!(!settings.gateway.api_enabled);

        assert_eq!(settings.discord.command_prefix, "!perch ");
        assert_eq!(settings.discord.question_default_generator, "yesno");

        assert_eq!(settings.generators.cache_capacity, 100);
        assert_eq!(settings.generators.staleness_check_seconds, 3);
        assert_eq!(settings.generators.load_attempts, 30);
        assert_eq!(
            settings.generators.load_poll_interval(),
            Duration::from_secs(1)
        );

        assert_eq!(settings.search.engines.len(), 3);
        assert!(settings.search.engines[0].starts_with("https://google.com/"));

        assert_eq!(settings.watchdog.poll_interval_seconds, 5);
        assert_eq!(settings.watchdog.unresponsive_after_seconds, 30);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_default_toml_matches_default_struct() {
        let parsed = Settings::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        let defaults = Settings::default();

        assert_eq!(parsed.gateway.port, defaults.gateway.port);
        assert_eq!(parsed.gateway.host, defaults.gateway.host);
        assert_eq!(parsed.search.engines, defaults.search.engines);
        assert_eq!(
            parsed.generators.cache_capacity,
            defaults.generators.cache_capacity
        );
        assert_eq!(parsed.browser.headless, defaults.browser.headless);
        assert!(parsed.watchdog.gateway_command.is_none());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[generators]
cache_capacity = 5

[gateway]
port = 8080
api_enabled = true
"#;
        let settings = Settings::from_toml(toml).unwrap();
        assert_eq!(settings.generators.cache_capacity, 5);
        assert_eq!(settings.generators.load_attempts, 30);
        assert_eq!(settings.gateway.port, 8080);
        assert!(settings.gateway.api_enabled);
        assert_eq!(settings.discord.command_prefix, "!perch ");
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("nested");
        unsafe { std::env::set_var("PERCH_CONFIG_DIR", &config_dir) }

        let loaded = Settings::load();
        unsafe { std::env::remove_var("PERCH_CONFIG_DIR") }

        let loaded = loaded.unwrap();
        let written = fs::read_to_string(config_dir.join("config.toml")).unwrap();
        assert_eq!(written, DEFAULT_CONFIG_TOML);
        assert_eq!(loaded.gateway.port, 3000);
        assert_eq!(loaded.watchdog.unresponsive_after_seconds, 30);
    }

    #[test]
    fn test_bind_addr_and_status_url() {
        let mut settings = Settings::default();
        assert_eq!(settings.bind_addr(), "0.0.0.0:3000");
        assert_eq!(settings.status_url(), "http://127.0.0.1:3000/status");

        settings.gateway.host = "10.0.0.7".to_string();
        settings.gateway.port = 4000;
        assert_eq!(settings.status_url(), "http://10.0.0.7:4000/status");
    }
}
