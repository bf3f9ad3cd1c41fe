//! Bounded wait for a host's deployment to finish.
//!
//! The decision of what to do with an observed state is the pure function
//! [`next_action`]; [`DeploymentPoller`] only owns the timing.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::cartel::{CartelClient, CartelError, DeploymentState};
use crate::resource::Deadline;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(15);

/// What the poller should do after observing a state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PollAction {
    /// Not terminal yet.
    ContinuePolling,
    /// The deployment succeeded.
    Done,
    /// The deployment reached a fail state, named in the payload.
    Fail(String),
}

/// Maps an observed deployment state to the poller's next step.
#[must_use]
pub fn next_action(state: &DeploymentState) -> PollAction {
    match state {
        DeploymentState::Succeeded => PollAction::Done,
        DeploymentState::Failed | DeploymentState::Terminated | DeploymentState::ShuttingDown => {
            PollAction::Fail(state.as_str().to_owned())
        }
        DeploymentState::Provisioning
        | DeploymentState::Indeterminate
        | DeploymentState::Other(_) => PollAction::ContinuePolling,
    }
}

/// Errors raised while waiting for a deployment.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError {
    /// Raised when the deployment reaches a fail state.
    #[error("instance {instance_id} reached deployment state {state}")]
    FailState {
        /// State that ended the wait.
        state: String,
        /// Instance being waited on.
        instance_id: String,
    },
    /// Raised when the deadline passes first.
    #[error("timed out waiting for instance {instance_id} to deploy")]
    Timeout {
        /// Instance being waited on.
        instance_id: String,
    },
    /// Raised when Cartel answers with a non-retryable error.
    #[error(transparent)]
    Remote(#[from] CartelError),
}

/// Polls Cartel until a deployment succeeds, fails, or runs out of time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeploymentPoller {
    initial_delay: Duration,
    min_interval: Duration,
    max_interval: Duration,
}

impl Default for DeploymentPoller {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            min_interval: DEFAULT_MIN_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

impl DeploymentPoller {
    /// Overrides the delay before the first poll.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Overrides the bounds the per-operation poll interval is drawn from.
    #[must_use]
    pub const fn with_interval_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }

    /// Draws the poll interval for one operation, uniformly within the
    /// configured bounds.
    pub fn draw_interval(&self, rng: &mut impl Rng) -> Duration {
        let low = millis(self.min_interval);
        let high = millis(self.max_interval);
        if high <= low {
            return self.min_interval;
        }
        Duration::from_millis(rng.gen_range(low..=high))
    }

    /// Waits until the deployment of `name` reports `succeeded`.
    ///
    /// Transient Cartel errors and "not found" answers keep the wait going,
    /// since a freshly created host may not have a deployment record yet.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::FailState`] on a fail state,
    /// [`PollError::Timeout`] once `deadline` passes, and
    /// [`PollError::Remote`] for any other Cartel failure.
    pub async fn wait_until_succeeded<C>(
        &self,
        client: &C,
        name: &str,
        instance_id: &str,
        deadline: &Deadline,
    ) -> Result<(), PollError>
    where
        C: CartelClient + ?Sized,
    {
        let mut rng = StdRng::from_entropy();
        let interval = self.draw_interval(&mut rng);
        debug!(name, instance_id, ?interval, "waiting for deployment");

        sleep(deadline.cap(self.initial_delay)).await;
        loop {
            if deadline.is_expired() {
                return Err(PollError::Timeout {
                    instance_id: instance_id.to_owned(),
                });
            }

            match client.get_deployment_state(name).await {
                Ok(state) => match next_action(&state) {
                    PollAction::Done => {
                        debug!(name, instance_id, "deployment succeeded");
                        return Ok(());
                    }
                    PollAction::Fail(reached) => {
                        return Err(PollError::FailState {
                            state: reached,
                            instance_id: instance_id.to_owned(),
                        });
                    }
                    PollAction::ContinuePolling => {
                        debug!(name, %state, "deployment still in progress");
                    }
                },
                Err(err) if err.is_transient() || err.is_not_found() => {
                    debug!(name, error = %err, "deployment state unavailable, retrying");
                }
                Err(err) => return Err(PollError::Remote(err)),
            }

            sleep(deadline.cap(interval)).await;
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests;
