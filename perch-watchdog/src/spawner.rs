use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::WatchdogError;

const GATEWAY_BINARY: &str = "perch-gateway";

/// Where to look for the gateway executable, in order.
pub fn candidate_paths(configured: Option<&str>) -> Vec<String> {
    match configured {
        Some(command) => vec![command.to_string()],
        None => vec![
            format!("./target/release/{GATEWAY_BINARY}"),
            format!("./target/debug/{GATEWAY_BINARY}"),
            GATEWAY_BINARY.to_string(),
        ],
    }
}

/// Spawn the gateway as a child process from the first path that works.
///
/// The child shares the watchdog's stdout and stderr and is killed if its
/// handle is dropped.
pub fn spawn_gateway(configured: Option<&str>) -> Result<Child, WatchdogError> {
    for path in candidate_paths(configured) {
        info!("Trying to spawn gateway from: {}", path);

        let result = Command::new(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        match result {
            Ok(child) => {
                info!("Spawned gateway process (PID: {:?})", child.id());
                return Ok(child);
            }
            Err(e) => warn!("Failed to spawn from {}: {}", path, e),
        }
    }

    error!("Could not spawn gateway from any known location");
    Err(WatchdogError::SpawnFailed)
}
