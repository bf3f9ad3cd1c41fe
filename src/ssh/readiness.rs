//! Docker readiness probe run before provisioning a container host.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use super::{SshError, SshSession};
use crate::resource::Deadline;

/// No-op docker command used to decide whether the daemon is up.
pub const READINESS_PROBE_COMMAND: &str = "docker volume ls";

/// Retry policy for [`wait_until_ready`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadinessPolicy {
    /// Maximum number of probe attempts.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each attempt.
    pub initial_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
    /// Timeout applied to each probe command.
    pub probe_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(60),
        }
    }
}

impl ReadinessPolicy {
    /// Returns the delay to wait after failed attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1_u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Errors returned by [`wait_until_ready`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReadinessError {
    /// Raised when docker still answered with exit status 1 on the last
    /// permitted attempt.
    #[error("docker was not ready after {attempts} attempts: {stderr}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Stderr of the last attempt.
        stderr: String,
    },
    /// Raised when the probe failed in a way that is not retried.
    #[error("readiness probe exited with status {status_text}: {stderr}")]
    Failed {
        /// Exit status of the probe, if any.
        exit_code: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr of the probe.
        stderr: String,
    },
    /// Raised when the operation deadline passed before docker answered.
    #[error("docker was not ready before the operation deadline ({attempts} attempts)")]
    DeadlineExceeded {
        /// Attempts made.
        attempts: u32,
    },
    /// Raised when the probe could not run at all.
    #[error("readiness probe could not run: {0}")]
    Ssh(#[from] SshError),
}

/// Runs [`READINESS_PROBE_COMMAND`] until it succeeds.
///
/// Only exit status 1 (docker not answering yet) is retried, with
/// exponential backoff; every other failure ends the wait immediately. Probe
/// timeouts and backoff sleeps are both capped by `deadline`. Returns the
/// number of attempts made.
///
/// # Errors
///
/// Returns [`ReadinessError`] when the probe fails terminally, the attempt
/// budget is exhausted, or the deadline passes.
pub async fn wait_until_ready<S>(
    session: &S,
    policy: &ReadinessPolicy,
    deadline: &Deadline,
) -> Result<u32, ReadinessError>
where
    S: SshSession + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let limit = deadline.cap(policy.probe_timeout);
        if limit.is_zero() {
            return Err(ReadinessError::DeadlineExceeded { attempts: attempt });
        }
        attempt += 1;
        let output = session.run(READINESS_PROBE_COMMAND, limit).await?;
        if output.is_success() {
            debug!(attempt, "docker is ready");
            return Ok(attempt);
        }
        if output.exit_code != Some(1) {
            return Err(ReadinessError::Failed {
                exit_code: output.exit_code,
                status_text: output
                    .exit_code
                    .map_or_else(|| String::from("unknown"), |code| code.to_string()),
                stderr: output.stderr,
            });
        }
        if attempt >= max_attempts {
            return Err(ReadinessError::Exhausted {
                attempts: attempt,
                stderr: output.stderr,
            });
        }
        let delay = deadline.cap(policy.backoff_for(attempt));
        debug!(attempt, ?delay, "docker not ready yet");
        sleep(delay).await;
    }
}
