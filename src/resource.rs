//! Resource-level constants and operation deadlines.

use std::time::Duration;

use tokio::time::Instant;

/// Schema version of `hsdp_container_host`.
pub const HOST_SCHEMA_VERSION: u32 = 5;
/// Schema version of `hsdp_container_host_exec`.
pub const EXEC_SCHEMA_VERSION: u32 = 2;
/// Longest a single provisioning command may run.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Wall-clock limits for each lifecycle operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Limit for create, including polling and provisioning.
    pub create: Duration,
    /// Limit for update.
    pub update: Duration,
    /// Limit for delete.
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(25 * 60),
            update: Duration::from_secs(10 * 60),
            delete: Duration::from_secs(25 * 60),
        }
    }
}

/// The point in time at which an operation gives up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Returns a deadline `limit` from now.
    #[must_use]
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Shortens `limit` so it does not outlive the deadline.
    #[must_use]
    pub fn cap(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }
}
