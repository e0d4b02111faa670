use std::time::Duration;

use perch_core::Settings;
use tokio::sync::Notify;

use crate::pipeline::Pipeline;
use crate::rate_limit::RateLimitGate;

/// Shared state for the Discord handler.
pub struct AppState {
    pub settings: Settings,
    pub pipeline: Pipeline,
    pub rate_limit: RateLimitGate,
    shutdown: Notify,
}

impl AppState {
    pub fn new(settings: Settings, pipeline: Pipeline, rate_limit: RateLimitGate) -> Self {
        Self {
            settings,
            pipeline,
            rate_limit,
            shutdown: Notify::new(),
        }
    }

    /// Suppression window when Discord gives no retry delay.
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.settings.rate_limit.fallback_retry_seconds)
    }

    /// Ask the process to exit so the supervisor restarts it.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }
}
