//! Create: adopt or create the host, wait for it, then provision it.

use std::collections::BTreeMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cartel::{CartelClient, CartelError, CreateRequest, Instance};
use crate::diagnostics::Diagnostics;
use crate::files::{PlannedFile, plan_files};
use crate::poller::PollError;
use crate::resource::Deadline;
use crate::ssh::{ReadinessError, SshConnector, wait_until_ready};

use super::{
    HostReconciler, HostState, OWNERSHIP_PROBE_TAG, ReconcileError, remote, run_commands,
    ssh_config, transfer_files, within,
};

/// Where a created or adopted host lives.
struct Placement {
    instance_id: String,
    private_ip: String,
}

impl From<Instance> for Placement {
    fn from(instance: Instance) -> Self {
        Self {
            instance_id: instance.instance_id,
            private_ip: instance.private_ip,
        }
    }
}

impl<C, S> HostReconciler<C, S>
where
    C: CartelClient,
    S: SshConnector,
{
    /// Creates the host described by `state.spec`, or adopts an existing
    /// host of the same name once write access is proven, then provisions it
    /// and reads it back.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] for validation and file-plan problems
    /// before any remote call, and for every fatal create, deployment,
    /// readiness, or command failure afterwards. Failures that may leave a
    /// partial host behind apply the keep-or-destroy policy first.
    pub async fn create(
        &self,
        state: &mut HostState,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ReconcileError> {
        let deadline = Deadline::after(self.timeouts.create);
        self.resolve_bastion(&mut state.spec);
        state.spec.validate()?;
        let plan = plan_files(&state.spec.files)?;

        let name = state.spec.name.clone();
        info!(name, "creating container host");

        let existing = self
            .lookup(&name)
            .await
            .map_err(|source| remote("look up instances", &name, source))?;
        let placement = if existing.is_some() {
            self.adopt(&name).await?
        } else {
            self.create_remote(state, &deadline, diagnostics).await?
        };

        if let Err(err) = self
            .poller
            .wait_until_succeeded(&self.client, &name, &placement.instance_id, &deadline)
            .await
        {
            self.apply_failure_policy(state, Some(&placement.instance_id), diagnostics)
                .await;
            return Err(match err {
                PollError::FailState {
                    state: reached,
                    instance_id,
                } => ReconcileError::DeploymentFailState {
                    instance_id,
                    state: reached,
                },
                PollError::Timeout { instance_id } => {
                    ReconcileError::DeploymentTimeout { instance_id }
                }
                PollError::Remote(source) => remote("poll deployment state", &name, source),
            });
        }
        state.id = Some(placement.instance_id.clone());

        if state.spec.needs_provisioning() {
            self.provision(state, &placement, &plan, &deadline, diagnostics)
                .await?;
        }

        self.read(state, diagnostics).await
    }

    /// Finds a host by name in the full listing.
    async fn lookup(&self, name: &str) -> Result<Option<Instance>, CartelError> {
        let instances = self.client.get_all_instances().await?;
        Ok(instances.into_iter().find(|instance| instance.name == name))
    }

    /// Proves write access with a throwaway tag, then adopts the host.
    async fn adopt(&self, name: &str) -> Result<Placement, ReconcileError> {
        let names = [name.to_owned()];
        let probe = BTreeMap::from([(OWNERSHIP_PROBE_TAG.to_owned(), Uuid::new_v4().to_string())]);
        let clear = BTreeMap::from([(OWNERSHIP_PROBE_TAG.to_owned(), String::new())]);
        for tags in [&probe, &clear] {
            self.client
                .add_tags(&names, tags)
                .await
                .map_err(|source| ReconcileError::Ownership {
                    name: name.to_owned(),
                    source,
                })?;
        }

        let details = self
            .client
            .get_details(name)
            .await
            .map_err(|source| remote("get instance details", name, source))?;
        info!(name, instance_id = %details.instance_id, "adopting existing instance");
        Ok(Placement::from(details))
    }

    async fn create_remote(
        &self,
        state: &mut HostState,
        deadline: &Deadline,
        diagnostics: &mut Diagnostics,
    ) -> Result<Placement, ReconcileError> {
        let name = state.spec.name.clone();
        let request = CreateRequest::from_spec(&state.spec);

        let source = match within(deadline, "create", self.client.create(&request)).await {
            Ok(ack) => {
                info!(name, instance_id = %ack.instance_id, "instance created");
                return Ok(Placement {
                    instance_id: ack.instance_id,
                    private_ip: ack.ip_address,
                });
            }
            Err(source) if source.is_already_exists() => {
                return Err(ReconcileError::AlreadyExists { name, source });
            }
            Err(source) => source,
        };

        if !source.is_server_error() {
            self.apply_failure_policy(state, None, diagnostics).await;
            return Err(ReconcileError::CreateFatal { name, source });
        }

        warn!(name, error = %source, "create answered with a server error, checking whether it went through");
        let found = match self.lookup(&name).await {
            Ok(found) => found,
            Err(err) => {
                warn!(name, error = %err, "instance lookup after failed create also failed");
                None
            }
        };
        if let Some(instance) = found {
            info!(name, instance_id = %instance.instance_id, "adopting instance created despite the error");
            return Ok(Placement::from(instance));
        }

        self.apply_failure_policy(state, None, diagnostics).await;
        Err(ReconcileError::CreateTransient { name, source })
    }

    /// Readiness probe, file transfer, and commands on a fresh host.
    async fn provision(
        &self,
        state: &mut HostState,
        placement: &Placement,
        plan: &[PlannedFile],
        deadline: &Deadline,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ReconcileError> {
        let name = state.spec.name.clone();
        let config = ssh_config(&state.spec, &placement.private_ip);
        let session = match self.ssh.connect(&config).await {
            Ok(session) => session,
            Err(err) => {
                self.apply_failure_policy(state, Some(&placement.instance_id), diagnostics)
                    .await;
                return Err(ReconcileError::SshReadiness {
                    name,
                    source: ReadinessError::Ssh(err),
                });
            }
        };

        if state.spec.is_container_host()
            && let Err(source) = wait_until_ready(&session, &self.readiness, deadline).await
        {
            drop(session);
            self.apply_failure_policy(state, Some(&placement.instance_id), diagnostics)
                .await;
            return Err(ReconcileError::SshReadiness { name, source });
        }

        transfer_files(&session, plan, self.command_timeout, deadline, diagnostics).await;
        run_commands(
            &session,
            &name,
            &state.spec.commands,
            self.command_timeout,
            deadline,
            &mut state.result,
        )
        .await
    }
}
