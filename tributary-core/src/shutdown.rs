//! Graceful shutdown, cancellation and exit-code classification.

use crate::config::DEFAULT_ACCEPTED_EXIT_CODES;
use crate::{ConnectorError, ConnectorProcess, ConnectorResult};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time allowed for the OS to reap a force-killed process
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll until the process exits or the timeout elapses. Returns whether it exited.
///
/// A timeout too large to represent as a deadline waits indefinitely.
pub async fn wait_for_exit(process: &dyn ConnectorProcess, timeout: Duration) -> bool {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if !process.is_alive() {
            return true;
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                EXIT_POLL_INTERVAL.min(deadline - now)
            }
            None => EXIT_POLL_INTERVAL,
        };
        tokio::time::sleep(pause).await;
    }
}

/// Stop a process, escalating only as far as needed:
/// 1. wait `grace_period` for it to exit on its own
/// 2. send the polite termination request and wait `last_chance`
/// 3. force kill
pub async fn gentle_close(
    process: &dyn ConnectorProcess,
    grace_period: Duration,
    last_chance: Duration,
) {
    if let Some(pid) = process.pid() {
        debug!("Gently closing destination process (pid {})", pid);
    }

    if wait_for_exit(process, grace_period).await {
        return;
    }

    info!(
        "Destination did not exit within {:?}, sending termination request",
        grace_period
    );
    if let Err(e) = process.terminate() {
        warn!("Failed to send termination request to destination: {}", e);
    }

    if wait_for_exit(process, last_chance).await {
        return;
    }

    warn!(
        "Destination still running {:?} after termination request, killing it",
        last_chance
    );
    if let Err(e) = process.kill() {
        warn!("Failed to kill destination process: {}", e);
    }

    wait_for_exit(process, KILL_REAP_TIMEOUT).await;
}

/// Force-stop a process. Returns whether a kill was sent; a process that already
/// exited is left alone.
pub fn cancel_process(process: &dyn ConnectorProcess) -> ConnectorResult<bool> {
    if !process.is_alive() {
        debug!("Destination process already exited, nothing to kill");
        return Ok(false);
    }

    process
        .kill()
        .map_err(|source| ConnectorError::Cancel { source })?;
    Ok(true)
}

/// Decides which exit outcomes count as a clean shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCodePolicy {
    accepted: Vec<i32>,
}

impl ExitCodePolicy {
    pub fn new(accepted: impl Into<Vec<i32>>) -> Self {
        Self {
            accepted: accepted.into(),
        }
    }

    pub fn is_accepted(&self, code: i32) -> bool {
        self.accepted.contains(&code)
    }

    /// Classify the state of a process after the shutdown sequence
    pub fn classify(&self, still_alive: bool, exit_code: Option<i32>) -> ConnectorResult<()> {
        match (still_alive, exit_code) {
            (true, _) | (false, None) => Err(ConnectorError::still_running()),
            (false, Some(code)) if self.is_accepted(code) => Ok(()),
            (false, Some(code)) => Err(ConnectorError::exited_with(code)),
        }
    }
}

impl Default for ExitCodePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ACCEPTED_EXIT_CODES.to_vec())
    }
}
