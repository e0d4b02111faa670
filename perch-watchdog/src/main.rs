//! Supervisor that keeps the perch gateway running.
//!
//! Spawns the gateway, probes its `/status` endpoint, and restarts it when
//! it exits or stops answering.

mod liveness;
mod spawner;
mod supervisor;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Errors that end the watchdog
#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("Failed to spawn gateway process from any known location")]
    SpawnFailed,

    #[error("Failed to wait on gateway process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to kill gateway process: {0}")]
    Kill(#[source] std::io::Error),

    #[error("Failed to build status client: {0}")]
    Client(String),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = perch_core::Config::load()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.settings.logging.level.as_str().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let status_url = config.settings.status_url();

    // Dropping the supervisor future drops the child, which kills it
    tokio::select! {
        result = supervisor::run(&config.settings.watchdog, &status_url) => {
            if let Err(e) = &result {
                error!("Watchdog stopped: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping gateway");
        }
    }

    Ok(())
}
