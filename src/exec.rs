//! One-shot provisioner (`hsdp_container_host_exec`).
//!
//! Runs files and commands against an existing host. It owns no remote
//! lifecycle: read and delete are no-ops, and any change to `triggers`
//! replaces the resource so the commands run again.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::diagnostics::Diagnostics;
use crate::files::{FileSpec, plan_files};
use crate::reconciler::{ReconcileError, run_commands, transfer_files};
use crate::resource::{COMMAND_TIMEOUT, Deadline, Timeouts};
use crate::spec::{ValidationError, ValidationErrors, check_limit, check_ssh_credentials, limits};
use crate::ssh::{ReadinessPolicy, SecretString, SshAuth, SshConfig, SshConnector, wait_until_ready};

/// Desired state of an exec resource.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ExecSpec {
    /// Arbitrary values; any change forces replacement.
    pub triggers: BTreeMap<String, String>,
    /// Host to provision.
    pub host: String,
    /// Bastion; defaults to the provider bastion.
    pub bastion_host: Option<String>,
    /// SSH user.
    pub user: Option<String>,
    /// SSH private key.
    pub private_key: Option<SecretString>,
    /// Whether to use the local SSH agent.
    pub agent: bool,
    /// Commands to run, in order.
    pub commands: Vec<String>,
    /// Files to copy before the commands run.
    pub files: BTreeSet<FileSpec>,
}

impl ExecSpec {
    /// Validates the spec, consulting `SSH_AUTH_SOCK` when `agent` is set.
    ///
    /// # Errors
    ///
    /// Returns every violated rule as [`ValidationErrors`].
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_with_agent(std::env::var_os("SSH_AUTH_SOCK").is_some())
    }

    /// Validates the spec with an explicit agent availability answer.
    ///
    /// # Errors
    ///
    /// Returns every violated rule as [`ValidationErrors`].
    pub fn validate_with_agent(&self, agent_available: bool) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        if self.host.trim().is_empty() {
            errors.push(ValidationError::MissingField { field: "host" });
        }
        check_limit(
            "commands",
            self.commands.len(),
            limits::MAX_EXEC_COMMANDS,
            &mut errors,
        );
        check_ssh_credentials(
            self.user.as_deref(),
            self.private_key.as_ref(),
            self.agent,
            agent_available,
            &mut errors,
        );
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// Returns `true` when moving to `desired` needs a new resource.
    #[must_use]
    pub fn requires_replacement(&self, desired: &Self) -> bool {
        self.triggers != desired.triggers
    }
}

/// Persisted state of an exec resource.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ExecState {
    /// Random identity assigned on success.
    pub id: Option<String>,
    /// Applied spec.
    pub spec: ExecSpec,
    /// Stdout of the last command.
    pub result: Option<String>,
}

impl ExecState {
    /// Creates state for a resource that has not run yet.
    #[must_use]
    pub fn new(spec: ExecSpec) -> Self {
        Self {
            spec,
            ..Self::default()
        }
    }
}

/// Runs exec resources.
#[derive(Debug)]
pub struct ExecProvisioner<S> {
    ssh: S,
    default_bastion: Option<String>,
    readiness: ReadinessPolicy,
    timeout: Duration,
    command_timeout: Duration,
}

impl<S: SshConnector> ExecProvisioner<S> {
    /// Creates a provisioner that falls back to `default_bastion`.
    #[must_use]
    pub fn new(ssh: S, default_bastion: Option<String>) -> Self {
        Self {
            ssh,
            default_bastion,
            readiness: ReadinessPolicy::default(),
            timeout: Timeouts::default().create,
            command_timeout: COMMAND_TIMEOUT,
        }
    }

    /// Overrides the docker readiness policy.
    #[must_use]
    pub const fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Overrides the per-command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Copies files, waits for docker, and runs the commands. On success the
    /// state receives a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] for validation, file-plan, SSH, readiness,
    /// and command failures. File copy failures are warnings.
    pub async fn create(
        &self,
        state: &mut ExecState,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ReconcileError> {
        let deadline = Deadline::after(self.timeout);
        if state
            .spec
            .bastion_host
            .as_deref()
            .is_none_or(|host| host.trim().is_empty())
        {
            state.spec.bastion_host.clone_from(&self.default_bastion);
        }
        state.spec.validate()?;
        let plan = plan_files(&state.spec.files)?;

        let host = state.spec.host.clone();
        let auth = SshAuth {
            private_key: state.spec.private_key.clone(),
            agent: state.spec.agent,
        };
        let config = SshConfig::new(state.spec.user.clone().unwrap_or_default(), host.as_str(), auth)
            .via_bastion(state.spec.bastion_host.as_deref());
        let session = self
            .ssh
            .connect(&config)
            .await
            .map_err(|source| ReconcileError::Ssh {
                name: host.clone(),
                source,
            })?;

        transfer_files(&session, &plan, self.command_timeout, &deadline, diagnostics).await;
        wait_until_ready(&session, &self.readiness, &deadline)
            .await
            .map_err(|source| ReconcileError::SshReadiness {
                name: host.clone(),
                source,
            })?;
        run_commands(
            &session,
            &host,
            &state.spec.commands,
            self.command_timeout,
            &deadline,
            &mut state.result,
        )
        .await?;

        let id = Uuid::new_v4().to_string();
        info!(host, id, "exec provisioner finished");
        state.id = Some(id);
        Ok(())
    }

    /// Stores `desired` without touching the host.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::ReplacementRequired`] when the triggers
    /// changed.
    pub fn update(&self, state: &mut ExecState, desired: ExecSpec) -> Result<(), ReconcileError> {
        if state.spec.requires_replacement(&desired) {
            return Err(ReconcileError::ReplacementRequired {
                fields: vec![String::from("triggers")],
            });
        }
        let bastion = state.spec.bastion_host.take();
        state.spec = desired;
        if state.spec.bastion_host.is_none() {
            state.spec.bastion_host = bastion.or_else(|| self.default_bastion.clone());
        }
        Ok(())
    }

    /// Leaves the stored state as is; there is nothing to observe remotely.
    #[expect(clippy::unused_self, reason = "keeps the lifecycle surface uniform")]
    pub fn read(&self, state: &ExecState) {
        debug!(host = %state.spec.host, id = ?state.id, "exec resource has nothing to refresh");
    }

    /// Forgets the resource. Nothing happens remotely.
    #[expect(clippy::unused_self, reason = "keeps the lifecycle surface uniform")]
    pub fn delete(&self, state: &mut ExecState) {
        info!(host = %state.spec.host, "forgetting exec resource");
        state.id = None;
    }
}
