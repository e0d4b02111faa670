//! One chat command from invocation text to reply.

use std::sync::Arc;

use perch_core::{Command, Invocation, RunCommand, parse_command};
use tracing::{info, warn};

use crate::generator::Resolver;
use crate::rate_limit::RateLimitGate;
use crate::render::{RenderedReply, Renderer, finalize_reply};
use crate::web::GeneratorFinder;

pub const RESET_BOT_REPLY: &str = "The bot has been reset.";

/// What the chat adapter should do with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Send this reply.
    Reply(RenderedReply),
    /// Send this reply, then shut the process down for a restart.
    Restart(RenderedReply),
    /// Drop the command; replies are currently rate limited.
    Suppressed,
}

pub struct Pipeline {
    resolver: Arc<Resolver>,
    finder: Arc<dyn GeneratorFinder>,
    renderer: Renderer,
    gate: RateLimitGate,
}

impl Pipeline {
    pub fn new(
        resolver: Arc<Resolver>,
        finder: Arc<dyn GeneratorFinder>,
        renderer: Renderer,
        gate: RateLimitGate,
    ) -> Self {
        Self {
            resolver,
            finder,
            renderer,
            gate,
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub async fn handle(&self, invocation: Invocation) -> Outcome {
        let mut invocation = invocation;
        let mut found = None;

        if let Some(query) = invocation.search_query() {
            match self.finder.find_generator(query).await {
                Ok(name) => {
                    invocation = Invocation::with_body(name.clone());
                    found = Some(name);
                }
                Err(err) => {
                    warn!(query, error = %err, "Generator search failed");
                    return Outcome::Reply(RenderedReply::text(err.to_string()));
                }
            }
        }

        let command = match parse_command(&invocation.body) {
            Ok(command) => command,
            Err(err) => return Outcome::Reply(RenderedReply::text(err.reply_text())),
        };

        let run = match command {
            Command::ResetEntry { generator } => {
                return Outcome::Reply(RenderedReply::text(self.reset_entry(&generator).await));
            }
            _ if self.gate.is_suppressed() => {
                warn!(body = %invocation.body, "Dropping command while rate limited");
                return Outcome::Suppressed;
            }
            Command::ResetBot => {
                info!("Bot reset requested");
                return Outcome::Restart(RenderedReply::text(RESET_BOT_REPLY));
            }
            Command::Run(run) => run,
        };

        let raw = self.run(&run).await;
        let rendered = self.renderer.render(&raw).await;
        Outcome::Reply(RenderedReply {
            text: finalize_reply(
                &rendered.text,
                self.gate.warning_pending(),
                found.as_deref(),
            ),
            attachments: rendered.attachments,
        })
    }

    async fn reset_entry(&self, generator: &str) -> String {
        if self.resolver.cache().invalidate(generator).await {
            format!("Deleted '{generator}' from the cache.")
        } else {
            format!("'{generator}' wasn't in the cache.")
        }
    }

    /// Resolve `run.repeat` results, trimmed and newline-joined.
    async fn run(&self, run: &RunCommand) -> String {
        let mut results = Vec::with_capacity(run.repeat as usize);
        for _ in 0..run.repeat {
            let text = self
                .resolver
                .resolve_text(&run.generator, run.list.as_deref(), &run.assignments)
                .await;
            results.push(text.trim().to_string());
        }
        results.join("\n")
    }
}
