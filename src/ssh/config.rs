//! Connection settings for SSH sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A string that never appears in `Debug` output.
#[derive(Clone, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Returns the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// How a session authenticates.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SshAuth {
    /// Private key material; takes precedence over the agent.
    pub private_key: Option<SecretString>,
    /// Whether to use the local agent via `SSH_AUTH_SOCK`.
    pub agent: bool,
}

/// HTTP CONNECT proxy used to reach the first hop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpProxy {
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

/// Settings for one SSH hop.
///
/// A bastion is described by a nested [`SshConfig`] with the same shape, so
/// credentials and proxies apply per hop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshConfig {
    /// Remote user.
    pub user: String,
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Authentication settings.
    pub auth: SshAuth,
    /// Optional HTTP proxy for tunnelled setups.
    pub http_proxy: Option<HttpProxy>,
    /// Optional jump host.
    pub bastion: Option<Box<SshConfig>>,
}

impl SshConfig {
    /// Creates a direct configuration on the default port.
    #[must_use]
    pub fn new(user: impl Into<String>, host: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            auth,
            http_proxy: None,
            bastion: None,
        }
    }

    /// Routes the connection through `bastion` using the same user and
    /// credentials. A blank bastion leaves the connection direct.
    #[must_use]
    pub fn via_bastion(mut self, bastion: Option<&str>) -> Self {
        self.bastion = bastion
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| Box::new(Self::new(self.user.clone(), host, self.auth.clone())));
        self
    }

    /// Sets the HTTP proxy hook on the outermost hop.
    #[must_use]
    pub fn with_http_proxy(mut self, proxy: HttpProxy) -> Self {
        match self.bastion.as_mut() {
            Some(bastion) => bastion.http_proxy = Some(proxy),
            None => self.http_proxy = Some(proxy),
        }
        self
    }

    /// Returns the `user@host` destination string.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}
