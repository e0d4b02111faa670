//! Tracks when the gateway last answered its status probe.

use std::time::Duration;

use tokio::time::Instant;

/// Answer the gateway's `/status` endpoint gives while healthy.
pub const ONLINE_TEXT: &str = "online";

/// Whether a status probe body counts as a healthy answer.
pub fn is_online(body: &str) -> bool {
    body.trim() == ONLINE_TEXT
}

/// Grace-period tracker for one gateway child.
///
/// A freshly spawned child counts as seen, so it gets the whole grace period
/// to boot before it can be flagged.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    last_seen: Instant,
    grace: Duration,
}

impl LivenessTracker {
    pub fn new(grace: Duration) -> Self {
        Self {
            last_seen: Instant::now(),
            grace,
        }
    }

    pub fn record_online(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn silent_for(&self) -> Duration {
        self.last_seen.elapsed()
    }

    /// True once the child has been silent for longer than the grace period.
    pub fn is_unresponsive(&self) -> bool {
        self.silent_for() > self.grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_body_is_recognised() {
        assert!(is_online("online"));
        assert!(is_online("online\n"));
        assert!(!is_online("Hi, I'm awake!"));
        assert!(!is_online(""));
    }

    #[tokio::test(start_paused = true)]
    async fn flags_only_after_grace_period() {
        let tracker = LivenessTracker::new(Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!tracker.is_unresponsive());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(tracker.is_unresponsive());
    }

    #[tokio::test(start_paused = true)]
    async fn online_answer_restarts_grace_period() {
        let mut tracker = LivenessTracker::new(Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(25)).await;
        tracker.record_online();
        tokio::time::advance(Duration::from_secs(25)).await;

        assert!(!tracker.is_unresponsive());
        assert_eq!(tracker.silent_for(), Duration::from_secs(25));
    }
}
