pub mod command;
pub mod config;

// Config re-exports
pub use config::{
    BrowserSettings, Config, ConfigError, DiscordSettings, GatewaySettings, GeneratorSettings,
    LoggingSettings, RateLimitSettings, SearchSettings, Secrets, Settings,
    SettingsError, WatchdogSettings,
};

// Command re-exports
pub use command::{
    AssignedValue, Assignment, Command, CommandError, Invocation, RunCommand, extract_invocation,
    parse_command,
};
