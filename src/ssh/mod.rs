//! SSH transport used to provision hosts.
//!
//! The reconciler opens one [`SshSession`] per provisioning pass through an
//! injected [`SshConnector`]. Sessions are scoped: dropping one releases the
//! connection and any key material written for it.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::AsyncRead;

mod args;
mod config;
mod error;
mod process;
mod readiness;

pub use config::{HttpProxy, SecretString, SshAuth, SshConfig, DEFAULT_SSH_PORT};
pub use error::SshError;
pub use process::{ProcessSshConnector, ProcessSshSession};
pub use readiness::{READINESS_PROBE_COMMAND, ReadinessError, ReadinessPolicy, wait_until_ready};

/// Future returned by SSH operations.
pub type SshFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SshError>> + Send + 'a>>;

/// Result of a command that ran to completion on the remote host.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code reported by the remote command, if available.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl RemoteCommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Opens SSH sessions.
pub trait SshConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: SshSession;

    /// Connects to the host described by `config`, jumping through its
    /// bastion when one is configured.
    fn connect<'a>(&'a self, config: &'a SshConfig) -> SshFuture<'a, Self::Session>;
}

/// An open SSH session to one host.
pub trait SshSession: Send + Sync {
    /// Streams `size` bytes from `source` into `destination` on the remote.
    fn write_file<'a>(
        &'a self,
        source: &'a mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        destination: &'a str,
    ) -> SshFuture<'a, ()>;

    /// Runs `command`, waiting at most `timeout` for it to finish.
    ///
    /// A command that completes (with any exit status) yields `Ok`; one that
    /// does not finish in time yields [`SshError::Timeout`].
    fn run<'a>(&'a self, command: &'a str, timeout: Duration)
    -> SshFuture<'a, RemoteCommandOutput>;
}
