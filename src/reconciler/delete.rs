//! Delete: verify the recorded instance and destroy it.

use tracing::info;

use crate::cartel::CartelClient;
use crate::diagnostics::Diagnostics;
use crate::resource::Deadline;
use crate::ssh::SshConnector;

use super::{HostReconciler, HostState, ReconcileError, remote, within};

impl<C, S> HostReconciler<C, S>
where
    C: CartelClient,
    S: SshConnector,
{
    /// Destroys the recorded host and clears its id.
    ///
    /// A host that is already gone only produces a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InstanceIdMismatch`] when the name now
    /// belongs to another instance, and [`ReconcileError::Remote`] when
    /// Cartel fails.
    pub async fn delete(
        &self,
        state: &mut HostState,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ReconcileError> {
        let Some(stored) = state.id.clone() else {
            return Ok(());
        };
        let deadline = Deadline::after(self.timeouts.delete);
        let name = state.spec.name.clone();

        let details = match within(&deadline, "instance_details", self.client.get_details(&name)).await {
            Ok(found) => found,
            Err(err) if err.is_not_found() => {
                diagnostics.warn(
                    format!("instance {name} was already gone"),
                    "nothing to destroy",
                );
                state.id = None;
                state.observed = None;
                return Ok(());
            }
            Err(source) => return Err(remote("get instance details", &name, source)),
        };

        if details.instance_id != stored {
            return Err(ReconcileError::InstanceIdMismatch {
                name,
                stored,
                observed: details.instance_id,
            });
        }

        within(&deadline, "destroy", self.client.destroy(&name))
            .await
            .map_err(|source| remote("destroy instance", &name, source))?;
        info!(name, instance_id = %stored, "instance destroyed");
        state.id = None;
        state.observed = None;
        Ok(())
    }
}
