//! Keep-or-destroy handling for hosts whose create did not finish.

use tracing::info;

use crate::cartel::CartelClient;
use crate::diagnostics::Diagnostics;
use crate::ssh::SshConnector;

use super::{HostReconciler, HostState};

impl<C, S> HostReconciler<C, S>
where
    C: CartelClient,
    S: SshConnector,
{
    /// Applies `keep_failed_instances` after a create aborted once the host
    /// may exist. Always clears the recorded id.
    pub(super) async fn apply_failure_policy(
        &self,
        state: &mut HostState,
        instance_id: Option<&str>,
        diagnostics: &mut Diagnostics,
    ) {
        let name = state.spec.name.clone();
        let known_id = instance_id.unwrap_or("unknown id");
        state.id = None;

        if state.spec.keep_failed_instances {
            diagnostics.warn(
                format!("keeping failed instance {name} ({known_id})"),
                format!(
                    "keep_failed_instances is set, so {name} was left running; destroy it manually once it is no longer needed"
                ),
            );
            return;
        }

        match self.client.destroy(&name).await {
            Ok(()) => info!(name, instance_id = known_id, "destroyed failed instance"),
            Err(err) => diagnostics.warn(
                format!("failed to destroy failed instance {name} ({known_id})"),
                err.to_string(),
            ),
        }
    }
}
