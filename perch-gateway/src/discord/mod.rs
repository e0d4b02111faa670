//! Discord chat adapter.

mod bot;
mod send;

use std::sync::Arc;

use serenity::prelude::*;
use tracing::info;

use crate::state::AppState;

pub use bot::Bot;
pub use send::{is_rate_limited, send_reply};

/// Build the Discord client; call `start()` on it to connect.
pub async fn start_discord_bot(token: &str, state: Arc<AppState>) -> Result<Client, DiscordError> {
    info!("Starting Discord bot...");

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(token, intents)
        .event_handler(Bot::new(state))
        .await
        .map_err(|e| DiscordError::ClientError(e.to_string()))
}

/// Discord-related errors
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("Failed to create Discord client: {0}")]
    ClientError(String),

    #[error("Discord client stopped: {0}")]
    Stopped(String),
}
