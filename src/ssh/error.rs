//! Error types for SSH sessions.

use thiserror::Error;

/// Errors surfaced while connecting, transferring files, or running commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SshError {
    /// Raised when the connection cannot be established.
    #[error("failed to connect to {destination}: {message}")]
    Connect {
        /// `user@host` being contacted.
        destination: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a local process cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command does not finish within its timeout.
    #[error("command '{command}' did not finish within {timeout_secs}s")]
    Timeout {
        /// Command that was running.
        command: String,
        /// Timeout that elapsed, in seconds.
        timeout_secs: u64,
    },
    /// Raised when a file cannot be written on the remote.
    #[error("failed to write {destination}: {message}")]
    Transfer {
        /// Remote destination path.
        destination: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when key material cannot be prepared locally.
    #[error("failed to prepare SSH key material: {message}")]
    KeyMaterial {
        /// Underlying error message.
        message: String,
    },
}
