use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use perch_core::GeneratorSettings;
use tracing::{debug, info, warn};

use super::{GeneratorError, GeneratorRuntime, RuntimeHost};

/// Remote source of generator pages and their edit times.
#[async_trait]
pub trait GeneratorCatalog: Send + Sync {
    /// Full HTML of the generator page.
    async fn download(&self, name: &str) -> Result<String, GeneratorError>;

    /// Last edit time in epoch milliseconds.
    async fn last_edit_time(&self, name: &str) -> Result<i64, GeneratorError>;
}

/// How long to wait for a booted page to expose its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPolicy {
    pub attempts: u32,
    pub poll_interval: Duration,
}

impl LoadPolicy {
    pub fn from_settings(settings: &GeneratorSettings) -> Self {
        Self {
            attempts: settings.load_attempts,
            poll_interval: settings.load_poll_interval(),
        }
    }
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Downloads a generator and boots it until ready.
pub struct GeneratorLoader {
    catalog: Arc<dyn GeneratorCatalog>,
    host: Arc<dyn RuntimeHost>,
    policy: LoadPolicy,
}

impl GeneratorLoader {
    pub fn new(
        catalog: Arc<dyn GeneratorCatalog>,
        host: Arc<dyn RuntimeHost>,
        policy: LoadPolicy,
    ) -> Self {
        Self {
            catalog,
            host,
            policy,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn GeneratorCatalog> {
        &self.catalog
    }

    /// Download `name`, boot it, and wait for readiness.
    ///
    /// The instance is closed before returning [`GeneratorError::Timeout`].
    pub async fn load(&self, name: &str) -> Result<Arc<dyn GeneratorRuntime>, GeneratorError> {
        let html = self.catalog.download(name).await?;
        debug!(generator = name, bytes = html.len(), "Downloaded generator page");

        let runtime = self.host.boot(name, html).await?;

        let mut polls = 0;
        loop {
            match runtime.is_ready().await {
                Ok(true) => {
                    info!(generator = name, polls, "Generator ready");
                    return Ok(runtime);
                }
                Ok(false) => {}
                Err(err) => debug!(generator = name, error = %err, "readiness probe failed"),
            }
            if polls >= self.policy.attempts {
                break;
            }
            polls += 1;
            tokio::time::sleep(self.policy.poll_interval).await;
        }

        warn!(generator = name, polls, "Generator never became ready");
        runtime.close().await;
        Err(GeneratorError::Timeout(name.to_string()))
    }
}
