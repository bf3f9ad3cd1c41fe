//! Container-host lifecycle reconciliation.
//!
//! [`HostReconciler`] drives create, read, update, and delete of one host
//! against an injected [`CartelClient`] and [`SshConnector`]. Operations
//! mutate the persisted [`HostState`] in place and collect warnings in
//! [`Diagnostics`](crate::diagnostics::Diagnostics); fatal outcomes are
//! returned as [`ReconcileError`].

use std::time::Duration;

use tokio::time::timeout;

use crate::cartel::{CartelClient, CartelError, CartelFuture};
use crate::poller::DeploymentPoller;
use crate::resource::{COMMAND_TIMEOUT, Deadline, Timeouts};
use crate::spec::HostSpec;
use crate::ssh::{ReadinessPolicy, SshAuth, SshConfig, SshConnector};

mod create;
mod delete;
mod error;
mod policy;
mod provision;
mod read;
mod state;
mod update;

pub use error::ReconcileError;
pub(crate) use provision::{run_commands, transfer_files};
pub use read::normalize_tags;
pub use state::{HostObservation, HostState};

/// Tag written and cleared to prove write access to an existing host.
pub const OWNERSHIP_PROBE_TAG: &str = "tf-crud-check";

/// Reconciles container hosts.
#[derive(Debug)]
pub struct HostReconciler<C, S> {
    client: C,
    ssh: S,
    poller: DeploymentPoller,
    readiness: ReadinessPolicy,
    timeouts: Timeouts,
    command_timeout: Duration,
}

impl<C, S> HostReconciler<C, S>
where
    C: CartelClient,
    S: SshConnector,
{
    /// Creates a reconciler with default timing.
    #[must_use]
    pub fn new(client: C, ssh: S) -> Self {
        Self {
            client,
            ssh,
            poller: DeploymentPoller::default(),
            readiness: ReadinessPolicy::default(),
            timeouts: Timeouts::default(),
            command_timeout: COMMAND_TIMEOUT,
        }
    }

    /// Overrides the deployment poller.
    #[must_use]
    pub const fn with_poller(mut self, poller: DeploymentPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Overrides the docker readiness policy.
    #[must_use]
    pub const fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Overrides the operation timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Overrides the per-command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Returns the injected Cartel client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Fills in the Cartel bastion when the spec does not name one.
    fn resolve_bastion(&self, spec: &mut HostSpec) {
        if spec
            .bastion_host
            .as_deref()
            .is_none_or(|host| host.trim().is_empty())
        {
            let bastion = self.client.bastion_host();
            spec.bastion_host = (!bastion.trim().is_empty()).then_some(bastion);
        }
    }
}

fn ssh_config(spec: &HostSpec, host: &str) -> SshConfig {
    let auth = SshAuth {
        private_key: spec.private_key.clone(),
        agent: spec.agent,
    };
    SshConfig::new(spec.user.clone().unwrap_or_default(), host, auth)
        .via_bastion(spec.bastion_host.as_deref())
}

/// Awaits a Cartel call, treating the deadline passing as a transport failure.
async fn within<T>(
    deadline: &Deadline,
    action: &str,
    call: CartelFuture<'_, T>,
) -> Result<T, CartelError> {
    timeout(deadline.remaining(), call)
        .await
        .unwrap_or_else(|_| {
            Err(CartelError::Transport {
                action: action.to_owned(),
                message: String::from("no response before the operation deadline"),
            })
        })
}

fn remote(operation: &'static str, name: &str, source: CartelError) -> ReconcileError {
    ReconcileError::Remote {
        operation,
        name: name.to_owned(),
        source,
    }
}
