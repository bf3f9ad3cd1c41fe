//! Shared builders for reconciler integration tests.
//!
//! Include with:
//!
//! ```rust
//! #[path = "common/reconciler_fixtures.rs"]
//! mod reconciler_fixtures;
//! ```

use std::time::Duration;

use hsdp_container_host::test_support::{FakeCartel, FakeSsh};
use hsdp_container_host::{CartelError, DeploymentPoller, HostReconciler, HostSpec, ReadinessPolicy};

/// Readiness policy that never sleeps.
pub fn fast_readiness(max_attempts: u32) -> ReadinessPolicy {
    ReadinessPolicy {
        max_attempts,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        probe_timeout: Duration::from_secs(1),
    }
}

/// Reconciler over the fakes with polling and readiness delays removed.
pub fn fast_reconciler(cartel: &FakeCartel, ssh: &FakeSsh) -> HostReconciler<FakeCartel, FakeSsh> {
    HostReconciler::new(cartel.clone(), ssh.clone())
        .with_poller(
            DeploymentPoller::default()
                .with_initial_delay(Duration::ZERO)
                .with_interval_bounds(Duration::ZERO, Duration::ZERO),
        )
        .with_readiness(fast_readiness(3))
}

/// Spec that declares commands and therefore needs SSH credentials.
pub fn provisioned_spec(name: &str, commands: &[&str]) -> HostSpec {
    HostSpec {
        user: Some(String::from("core")),
        private_key: Some("-----BEGIN KEY-----".into()),
        commands: commands.iter().map(|command| (*command).to_owned()).collect(),
        ..HostSpec::named(name)
    }
}

/// A Cartel answer with the given status.
pub fn status_error(action: &str, status: u16, message: &str) -> CartelError {
    CartelError::Status {
        action: action.to_owned(),
        status,
        message: message.to_owned(),
    }
}
