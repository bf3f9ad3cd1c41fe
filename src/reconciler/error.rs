//! Errors surfaced by reconciler operations.

use thiserror::Error;

use crate::cartel::CartelError;
use crate::files::PlanErrors;
use crate::spec::ValidationErrors;
use crate::ssh::{ReadinessError, SshError};

/// Fatal outcomes of a reconciler operation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The declared spec breaks preflight rules. No remote call was made.
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
    /// The declared file set is unusable. No remote call was made.
    #[error("invalid files: {0}")]
    Plan(#[from] PlanErrors),
    /// A host with this name exists but could not be written to.
    #[error("no write access to instance {name}, giving up: {source}")]
    Ownership {
        /// Host name.
        name: String,
        /// Failed probe write.
        source: CartelError,
    },
    /// Cartel refused the create because the name is taken.
    #[error("instance {name} already exists: {source}")]
    AlreadyExists {
        /// Host name.
        name: String,
        /// Cartel answer.
        source: CartelError,
    },
    /// Create failed server-side and the host did not show up afterwards.
    #[error("create of {name} failed and the instance could not be found: {source}")]
    CreateTransient {
        /// Host name.
        name: String,
        /// Cartel answer.
        source: CartelError,
    },
    /// Create failed outright or never got an answer.
    #[error("create of {name} failed: {source}")]
    CreateFatal {
        /// Host name.
        name: String,
        /// Cartel answer.
        source: CartelError,
    },
    /// The deployment reached a fail state.
    #[error("instance {instance_id} reached deployment state {state}")]
    DeploymentFailState {
        /// Instance that failed.
        instance_id: String,
        /// State reached.
        state: String,
    },
    /// The deployment did not finish in time.
    #[error("timed out waiting for instance {instance_id} to deploy")]
    DeploymentTimeout {
        /// Instance being waited on.
        instance_id: String,
    },
    /// The host never became usable over SSH.
    #[error("instance {name} is not ready for provisioning: {source}")]
    SshReadiness {
        /// Host name.
        name: String,
        /// Why the host is not ready.
        source: ReadinessError,
    },
    /// An SSH session failed outside the readiness phase.
    #[error("ssh to {name} failed: {source}")]
    Ssh {
        /// Host name or address.
        name: String,
        /// Transport failure.
        source: SshError,
    },
    /// A provisioning command exited non-zero.
    #[error(
        "command `{command}` exited with status {status}\nstdout: {stdout}\nstderr: {stderr}",
        status = .exit_code.map_or_else(|| String::from("unknown"), |code| code.to_string())
    )]
    CommandFailure {
        /// Command that failed.
        command: String,
        /// Exit code, if any.
        exit_code: Option<i32>,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },
    /// The host behind the name is not the one recorded in state.
    #[error("instance {name} has id {observed} but state records {stored}")]
    InstanceIdMismatch {
        /// Host name.
        name: String,
        /// Id in state.
        stored: String,
        /// Id reported by Cartel.
        observed: String,
    },
    /// Any other Cartel failure.
    #[error("failed to {operation} for {name}: {source}")]
    Remote {
        /// What was being attempted.
        operation: &'static str,
        /// Host name.
        name: String,
        /// Cartel answer.
        source: CartelError,
    },
    /// The update touches attributes that only a new host can change.
    #[error("changing {} requires replacing the instance", .fields.join(", "))]
    ReplacementRequired {
        /// Attributes that changed.
        fields: Vec<String>,
    },
    /// An update was requested for a host that has no recorded id.
    #[error("instance {name} has no recorded id")]
    MissingId {
        /// Host name.
        name: String,
    },
}
