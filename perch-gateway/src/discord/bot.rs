use std::sync::Arc;
use std::time::Duration;

use perch_core::extract_invocation;
use serenity::async_trait;
use serenity::http::RatelimitInfo;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::pipeline::Outcome;
use crate::render::RenderedReply;
use crate::state::AppState;

use super::send::{is_rate_limited, send_reply};

/// Generator loads can take a while; keep typing visible for at most this long.
const TYPING_TIMEOUT: Duration = Duration::from_secs(60);

struct TimedTyping {
    _handle: JoinHandle<()>,
}

impl TimedTyping {
    fn start(channel_id: ChannelId, http: &Arc<serenity::http::Http>) -> Self {
        let typing = channel_id.start_typing(http);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(TYPING_TIMEOUT).await;
            drop(typing);
        });
        Self { _handle: handle }
    }
}

impl Drop for TimedTyping {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

/// Discord event handler running chat commands through the pipeline.
pub struct Bot {
    state: Arc<AppState>,
}

impl Bot {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn deliver(&self, ctx: &Context, msg: &Message, reply: RenderedReply) {
        match send_reply(&ctx.http, msg, reply).await {
            Ok(()) => self.state.rate_limit.record_delivered(),
            // A 429 with a retry delay is retried inside serenity; only one
            // without a usable delay surfaces here
            Err(err) if is_rate_limited(&err) => {
                let delay = self.state.rate_limit_delay();
                warn!(retry_after = ?delay, "Discord rejected the reply with 429");
                self.state.rate_limit.record_limited(delay);
            }
            Err(err) => error!("Failed to send reply: {}", err),
        }
    }
}

/// Suppression window for a rate limit Discord reported.
fn suppression_window(reported: Duration, fallback: Duration) -> Duration {
    if reported.is_zero() { fallback } else { reported }
}

#[async_trait]
impl EventHandler for Bot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
    }

    async fn ratelimit(&self, data: RatelimitInfo) {
        let delay = suppression_window(data.timeout, self.state.rate_limit_delay());
        warn!(
            retry_after = ?delay,
            path = %data.path,
            global = data.global,
            "Discord rate limit hit"
        );
        self.state.rate_limit.record_limited(delay);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Ignore messages from bots (including ourselves)
        if msg.author.bot {
            return;
        }

        let discord = &self.state.settings.discord;
        let Some(invocation) = extract_invocation(
            &msg.content,
            &discord.command_prefix,
            &discord.question_default_generator,
        ) else {
            return;
        };

        info!(
            event_kind = "chat_io",
            "Discord command from {} ({}): {}", msg.author.name, msg.author.id, invocation.body
        );

        let outcome = {
            let _typing = TimedTyping::start(msg.channel_id, &ctx.http);
            self.state.pipeline.handle(invocation).await
        };

        match outcome {
            Outcome::Reply(reply) => self.deliver(&ctx, &msg, reply).await,
            Outcome::Restart(reply) => {
                self.deliver(&ctx, &msg, reply).await;
                self.state.request_shutdown();
            }
            Outcome::Suppressed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitGate;

    #[test]
    fn reported_delay_wins_over_fallback() {
        assert_eq!(
            suppression_window(Duration::from_millis(2500), Duration::from_secs(5)),
            Duration::from_millis(2500)
        );
        assert_eq!(
            suppression_window(Duration::ZERO, Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reported_delay_sets_gate_window() {
        let gate = RateLimitGate::new();
        gate.record_limited(suppression_window(
            Duration::from_millis(2500),
            Duration::from_secs(5),
        ));

        tokio::time::advance(Duration::from_millis(2400)).await;
        assert!(gate.is_suppressed());
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!gate.is_suppressed());
    }
}
