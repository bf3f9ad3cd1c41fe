//! Error types for the Cartel client.

use thiserror::Error;

/// Errors raised by Cartel operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CartelError {
    /// Raised when the request never produced a response.
    #[error("cartel {action} request failed without a response: {message}")]
    Transport {
        /// Cartel action being performed.
        action: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when Cartel answers with a non-success status.
    #[error("cartel {action} returned status {status}: {message}")]
    Status {
        /// Cartel action being performed.
        action: String,
        /// HTTP status code.
        status: u16,
        /// Response body or message.
        message: String,
    },
    /// Raised when Cartel answers with success but no usable body.
    #[error("cartel {action} returned status {status} with an empty body")]
    EmptyBody {
        /// Cartel action being performed.
        action: String,
        /// HTTP status code.
        status: u16,
    },
    /// Raised when Cartel rejects a create because the name is taken.
    #[error("cartel {action} reports the instance already exists: {message}")]
    AlreadyExists {
        /// Cartel action being performed.
        action: String,
        /// HTTP status code.
        status: u16,
        /// Message returned by Cartel.
        message: String,
    },
    /// Raised when a successful response lacks the requested host.
    #[error("cartel {action} has no record of instance {name}")]
    Missing {
        /// Cartel action being performed.
        action: String,
        /// Host name that was requested.
        name: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode cartel {action} response: {message}")]
    Decode {
        /// Cartel action being performed.
        action: String,
        /// Decoder error message.
        message: String,
    },
}

impl CartelError {
    /// Returns the HTTP-like status carried by the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. }
            | Self::EmptyBody { status, .. }
            | Self::AlreadyExists { status, .. } => Some(*status),
            Self::Missing { .. } => Some(404),
            Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    /// Returns `true` when the remote may have completed the request anyway:
    /// a 5xx status or a success status with a null body.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::EmptyBody { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` when the request never reached Cartel.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` when Cartel signalled a duplicate name.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` for the statuses Cartel uses for unknown hosts and
    /// deployments (400 and 404).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(400 | 404)) && !self.is_already_exists()
    }

    /// Returns `true` when retrying the same read is reasonable.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.is_transport() || self.is_server_error()
    }
}
