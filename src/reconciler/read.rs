//! Read: refresh state from Cartel and detect drift.

use std::collections::BTreeMap;

use tracing::debug;

use crate::cartel::{CartelClient, DeploymentState, Instance};
use crate::diagnostics::Diagnostics;
use crate::spec::{BASE_SECURITY_GROUP, BILLING_TAG};
use crate::ssh::SshConnector;

use super::{HostObservation, HostReconciler, HostState, ReconcileError, remote};

/// Drops `billing` and empty values from remote tags, then sets `billing`
/// to the first non-empty of the stored and remote values, or to empty.
#[must_use]
pub fn normalize_tags(
    remote_tags: &BTreeMap<String, String>,
    stored_billing: Option<&String>,
) -> BTreeMap<String, String> {
    let billing = [stored_billing, remote_tags.get(BILLING_TAG)]
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
        .cloned()
        .unwrap_or_default();
    let mut tags: BTreeMap<String, String> = remote_tags
        .iter()
        .filter(|(key, value)| *key != BILLING_TAG && !value.is_empty())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    tags.insert(BILLING_TAG.to_owned(), billing);
    tags
}

impl<C, S> HostReconciler<C, S>
where
    C: CartelClient,
    S: SshConnector,
{
    /// Refreshes `state` from Cartel.
    ///
    /// A host without a deployment, or whose deployment is not `succeeded`,
    /// has its id cleared so the host runtime plans a new one. State without
    /// an id is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InstanceIdMismatch`] when the name now
    /// belongs to a different instance, and [`ReconcileError::Remote`] for
    /// other Cartel failures.
    pub async fn read(
        &self,
        state: &mut HostState,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ReconcileError> {
        let Some(stored) = state.id.clone() else {
            return Ok(());
        };
        let name = state.spec.name.clone();

        let deployment = match self.client.get_deployment_state(&name).await {
            Ok(found) => found,
            Err(err) if err.is_not_found() => {
                forget(state, diagnostics);
                return Ok(());
            }
            Err(source) => return Err(remote("get deployment state", &name, source)),
        };

        if deployment != DeploymentState::Succeeded {
            diagnostics.warn(
                format!("instance {name} is tainted"),
                format!("deployment state is {deployment}, so the instance will be replaced"),
            );
            state.id = None;
            state.observed = None;
            return Ok(());
        }

        let instance = match self.client.get_details(&name).await {
            Ok(found) => found,
            Err(err) if err.is_not_found() => {
                forget(state, diagnostics);
                return Ok(());
            }
            Err(source) => return Err(remote("get instance details", &name, source)),
        };

        if instance.instance_id != stored {
            return Err(ReconcileError::InstanceIdMismatch {
                name,
                stored,
                observed: instance.instance_id,
            });
        }

        project(state, &instance, deployment);
        debug!(name, instance_id = %stored, "instance refreshed");
        Ok(())
    }
}

fn forget(state: &mut HostState, diagnostics: &mut Diagnostics) {
    diagnostics.warn(
        format!("instance {} no longer exists", state.spec.name),
        "removing it from state so it can be recreated",
    );
    state.id = None;
    state.observed = None;
}

fn project(state: &mut HostState, instance: &Instance, deployment: DeploymentState) {
    let billing = state.spec.tags.get(BILLING_TAG).cloned();
    state.spec.tags = normalize_tags(&instance.tags, billing.as_ref());
    state.spec.security_groups = instance
        .security_groups
        .iter()
        .filter(|group| *group != BASE_SECURITY_GROUP)
        .cloned()
        .collect();
    state.spec.user_groups = instance.user_groups.iter().cloned().collect();
    state.spec.protect = instance.protection;
    state.observed = Some(HostObservation::from_instance(instance, deployment));
}
