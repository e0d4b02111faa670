//! Restart loop: keep one gateway child alive and answering.

use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;

use perch_core::WatchdogSettings;
use tokio::process::Child;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::WatchdogError;
use crate::liveness::{LivenessTracker, is_online};
use crate::spawner::spawn_gateway;

#[derive(Debug, Clone)]
pub struct WatchPolicy {
    pub poll_interval: Duration,
    pub unresponsive_after: Duration,
}

impl WatchPolicy {
    pub fn from_settings(settings: &WatchdogSettings) -> Self {
        Self {
            poll_interval: Duration::from_secs(settings.poll_interval_seconds),
            unresponsive_after: Duration::from_secs(settings.unresponsive_after_seconds),
        }
    }
}

/// Why a child stopped being watched.
#[derive(Debug)]
pub enum ChildEnd {
    Exited(ExitStatus),
    /// Killed after going silent
    Unresponsive(Duration),
}

enum Tick {
    Exited(std::io::Result<ExitStatus>),
    Poll,
}

/// GET the status URL; anything but an `online` body counts as silence.
pub async fn probe_status(client: &reqwest::Client, url: &str) -> bool {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!("Status probe failed: {}", e);
            return false;
        }
    };
    match response.text().await {
        Ok(body) => is_online(&body),
        Err(e) => {
            debug!("Status probe body unreadable: {}", e);
            false
        }
    }
}

/// Watch `child` until it exits or stays silent past the grace period, in
/// which case it is killed.
pub async fn watch_child<F, Fut>(
    child: &mut Child,
    policy: &WatchPolicy,
    mut probe: F,
) -> Result<ChildEnd, WatchdogError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut liveness = LivenessTracker::new(policy.unresponsive_after);

    loop {
        let tick = tokio::select! {
            status = child.wait() => Tick::Exited(status),
            _ = sleep(policy.poll_interval) => Tick::Poll,
        };

        match tick {
            Tick::Exited(status) => return Ok(ChildEnd::Exited(status.map_err(WatchdogError::Wait)?)),
            Tick::Poll if liveness.is_unresponsive() => {
                let silent = liveness.silent_for();
                child.kill().await.map_err(WatchdogError::Kill)?;
                return Ok(ChildEnd::Unresponsive(silent));
            }
            Tick::Poll => {
                if probe().await {
                    liveness.record_online();
                }
            }
        }
    }
}

/// Spawn the gateway and restart it forever.
pub async fn run(settings: &WatchdogSettings, status_url: &str) -> Result<(), WatchdogError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_seconds))
        .build()
        .map_err(|e| WatchdogError::Client(e.to_string()))?;
    let policy = WatchPolicy::from_settings(settings);

    info!(
        "Watching {} (every {:?}, restart after {:?} of silence)",
        status_url, policy.poll_interval, policy.unresponsive_after
    );

    loop {
        let mut child = spawn_gateway(settings.gateway_command.as_deref())?;

        match watch_child(&mut child, &policy, || probe_status(&client, status_url)).await? {
            ChildEnd::Exited(status) => info!("Gateway exited ({}), restarting", status),
            ChildEnd::Unresponsive(silent) => {
                warn!("Gateway silent for {:?}, killed and restarting", silent)
            }
        }

        // Keeps a gateway that dies on startup from spinning
        sleep(policy.poll_interval).await;
    }
}
