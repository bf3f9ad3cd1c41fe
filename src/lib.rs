//! Lifecycle reconciler for HSDP container hosts.
//!
//! The crate turns a declared [`HostSpec`] into a running host through the
//! Cartel control plane, provisions it over SSH (readiness probe, file
//! copies, commands), and keeps it reconciled on later runs. A one-shot
//! [`ExecProvisioner`] runs files and commands against an existing host.

pub mod cartel;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod exec;
pub mod files;
pub mod poller;
pub mod reconciler;
pub mod resource;
pub mod spec;
pub mod ssh;
pub mod test_support;

pub use cartel::{CartelClient, CartelError, DeploymentState, HttpCartelClient, Instance};
pub use config::{ConfigError, ProviderConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use exec::{ExecProvisioner, ExecSpec, ExecState};
pub use files::{FileSpec, PlanError, PlanErrors};
pub use poller::{DeploymentPoller, PollError};
pub use reconciler::{HostObservation, HostReconciler, HostState, ReconcileError};
pub use resource::{Deadline, Timeouts};
pub use spec::{HostSpec, ValidationError, ValidationErrors};
pub use ssh::{
    ProcessSshConnector, ReadinessPolicy, RemoteCommandOutput, SshConfig, SshConnector, SshError,
    SshSession,
};
