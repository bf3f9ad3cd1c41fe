//! Update: apply the typed diff attribute by attribute.

use std::collections::BTreeMap;

use tracing::info;

use crate::cartel::CartelClient;
use crate::diagnostics::Diagnostics;
use crate::diff::{FileChange, HostDiff};
use crate::files::{PlannedFile, plan_files};
use crate::resource::Deadline;
use crate::spec::{BILLING_TAG, HostSpec};
use crate::ssh::SshConnector;

use super::{
    HostReconciler, HostState, ReconcileError, remote, run_commands, ssh_config, transfer_files,
};

impl<C, S> HostReconciler<C, S>
where
    C: CartelClient,
    S: SshConnector,
{
    /// Moves the host from `state.spec` to `desired`.
    ///
    /// Sub-steps run in a fixed order (tags, user groups, security groups,
    /// protection, files) and each one updates `state` as soon as it lands.
    /// Nothing is rolled back when a later step fails.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Validation`] or [`ReconcileError::Plan`]
    /// before any remote call, [`ReconcileError::ReplacementRequired`] when
    /// an immutable attribute changed, [`ReconcileError::MissingId`] when the host is not
    /// in state, and the first failing sub-step otherwise.
    pub async fn update(
        &self,
        state: &mut HostState,
        mut desired: HostSpec,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ReconcileError> {
        let deadline = Deadline::after(self.timeouts.update);
        self.resolve_bastion(&mut desired);
        desired.validate()?;
        let plan = plan_files(&desired.files)?;

        let diff = HostDiff::between(&state.spec, &desired);
        if !diff.replace.is_empty() {
            return Err(ReconcileError::ReplacementRequired {
                fields: diff.replace.iter().map(|field| (*field).to_owned()).collect(),
            });
        }
        if state.id.is_none() {
            return Err(ReconcileError::MissingId {
                name: desired.name.clone(),
            });
        }

        let name = desired.name.clone();
        let names = [name.clone()];
        info!(name, "updating container host");

        if !diff.tags.is_empty() {
            self.client
                .add_tags(&names, &diff.tags)
                .await
                .map_err(|source| remote("update tags", &name, source))?;
            state.spec.tags = with_billing(desired.tags.clone(), &state.spec.tags);
        }

        if !diff.user_groups.remove.is_empty() {
            self.client
                .remove_user_groups(&name, &diff.user_groups.remove)
                .await
                .map_err(|source| remote("remove user groups", &name, source))?;
            for group in &diff.user_groups.remove {
                state.spec.user_groups.remove(group);
            }
        }
        if !diff.user_groups.add.is_empty() {
            self.client
                .add_user_groups(&name, &diff.user_groups.add)
                .await
                .map_err(|source| remote("add user groups", &name, source))?;
            state
                .spec
                .user_groups
                .extend(diff.user_groups.add.iter().cloned());
        }

        if !diff.security_groups.remove.is_empty() {
            self.client
                .remove_security_groups(&name, &diff.security_groups.remove)
                .await
                .map_err(|source| remote("remove security groups", &name, source))?;
            for group in &diff.security_groups.remove {
                state.spec.security_groups.remove(group);
            }
        }
        if !diff.security_groups.add.is_empty() {
            self.client
                .add_security_groups(&name, &diff.security_groups.add)
                .await
                .map_err(|source| remote("add security groups", &name, source))?;
            state
                .spec
                .security_groups
                .extend(diff.security_groups.add.iter().cloned());
        }

        if let Some(protect) = diff.protect {
            self.client
                .set_protection(&name, protect)
                .await
                .map_err(|source| remote("set protection", &name, source))?;
            state.spec.protect = protect;
        }

        if let Some(change) = &diff.files {
            self.update_files(state, &desired, change, &plan, &deadline, diagnostics)
                .await?;
        }

        desired.tags = with_billing(desired.tags, &state.spec.tags);
        state.spec = desired;
        self.read(state, diagnostics).await
    }

    async fn update_files(
        &self,
        state: &mut HostState,
        desired: &HostSpec,
        change: &FileChange,
        plan: &[PlannedFile],
        deadline: &Deadline,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ReconcileError> {
        if !change.permission_only.is_empty() {
            diagnostics.warn(
                format!(
                    "file mode or ownership changed for {}",
                    change.permission_only.join(", ")
                ),
                "the files are copied again and the new mode and ownership applied; files no longer declared keep what they had",
            );
        }

        if plan.is_empty() && !change.rerun_commands {
            state.spec.files.clone_from(&desired.files);
            return Ok(());
        }

        let instance = self
            .client
            .get_details(&desired.name)
            .await
            .map_err(|source| remote("get instance details", &desired.name, source))?;
        let session = self
            .ssh
            .connect(&ssh_config(desired, &instance.private_ip))
            .await
            .map_err(|source| ReconcileError::Ssh {
                name: desired.name.clone(),
                source,
            })?;

        transfer_files(&session, plan, self.command_timeout, deadline, diagnostics).await;
        state.spec.files.clone_from(&desired.files);

        if change.rerun_commands {
            run_commands(
                &session,
                &desired.name,
                &desired.commands,
                self.command_timeout,
                deadline,
                &mut state.result,
            )
            .await?;
        }
        Ok(())
    }
}

fn with_billing(
    mut tags: BTreeMap<String, String>,
    stored: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    if !tags.contains_key(BILLING_TAG)
        && let Some(value) = stored.get(BILLING_TAG)
    {
        tags.insert(BILLING_TAG.to_owned(), value.clone());
    }
    tags
}
