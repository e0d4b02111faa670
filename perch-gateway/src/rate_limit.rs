//! Reply gate for Discord rate limiting.
//!
//! When Discord rejects a reply with HTTP 429, new commands are dropped until
//! the retry delay has passed, and the next reply that does go out carries a
//! short note explaining the gap.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default)]
struct GateState {
    /// Replies are suppressed until this instant
    limited_until: Option<Instant>,
    /// Prefix the next reply with the rate-limit note
    warn_next: bool,
}

/// Shared rate-limit state; clones observe the same gate.
#[derive(Debug, Clone, Default)]
pub struct RateLimitGate {
    state: Arc<RwLock<GateState>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(state: &GateState) -> bool {
        state
            .limited_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Whether incoming commands should be dropped.
    pub fn is_suppressed(&self) -> bool {
        let state = self.state.read().expect("RateLimitGate lock poisoned");
        Self::active(&state)
    }

    /// Whether the next reply should carry the rate-limit note.
    pub fn warning_pending(&self) -> bool {
        let state = self.state.read().expect("RateLimitGate lock poisoned");
        state.warn_next && Self::active(&state)
    }

    /// Record a 429: suppress and warn for `retry_after`.
    pub fn record_limited(&self, retry_after: Duration) {
        let mut state = self.state.write().expect("RateLimitGate lock poisoned");
        state.limited_until = Some(Instant::now() + retry_after);
        state.warn_next = true;
    }

    /// Record a delivered reply.
    pub fn record_delivered(&self) {
        let mut state = self.state.write().expect("RateLimitGate lock poisoned");
        state.warn_next = false;
    }
}
