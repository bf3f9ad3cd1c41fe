//! Desired state of a container host.
//!
//! [`HostSpec`] is the typed form of everything a declaration can say about
//! a host: the attributes Cartel receives at create time, the mutable subset
//! reconciled afterwards, and the provisioning inputs used over SSH.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::files::FileSpec;
use crate::ssh::SecretString;

mod validation;

pub use validation::{ValidationError, ValidationErrors};
pub(crate) use validation::{check_limit, check_ssh_credentials};

/// Role requested when a spec does not name one.
pub const DEFAULT_INSTANCE_ROLE: &str = "container-host";
/// Instance type requested when a spec does not name one.
pub const DEFAULT_INSTANCE_TYPE: &str = "m5.large";
/// Tag key reserved by Cartel for the host name.
pub const RESERVED_NAME_TAG: &str = "name";
/// Synthetic tag that is always stored and never diffed.
pub const BILLING_TAG: &str = "billing";
/// Security group Cartel attaches implicitly to every host.
pub const BASE_SECURITY_GROUP: &str = "base";

/// Limits applied by [`HostSpec::validate`].
pub mod limits {
    /// Maximum number of tags.
    pub const MAX_TAGS: usize = 8;
    /// Maximum length of a tag value.
    pub const MAX_TAG_VALUE_LEN: usize = 255;
    /// Maximum number of security groups.
    pub const MAX_SECURITY_GROUPS: usize = 4;
    /// Maximum number of user groups.
    pub const MAX_USER_GROUPS: usize = 50;
    /// Maximum number of provisioning commands on a host.
    pub const MAX_HOST_COMMANDS: usize = 10;
    /// Maximum number of commands on the one-shot exec provisioner.
    pub const MAX_EXEC_COMMANDS: usize = 50;
    /// Maximum number of data volumes.
    pub const MAX_VOLUMES: u32 = 6;
    /// Maximum data volume size in GiB.
    pub const MAX_VOLUME_SIZE: u32 = 16_000;
    /// Inclusive IOPS bounds.
    pub const IOPS_RANGE: std::ops::RangeInclusive<u32> = 1..=4000;
}

/// Subnet placement requested for a host.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetType {
    /// Place the host in a private subnet.
    Private,
    /// Place the host in a public subnet.
    Public,
}

impl SubnetType {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// Desired state of a container host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "declarative toggles are naturally expressed as booleans"
)]
pub struct HostSpec {
    /// Unique host name on the remote.
    pub name: String,
    /// Instance role.
    pub instance_role: String,
    /// Image to boot; Cartel picks its default when absent.
    pub image: Option<String>,
    /// Commercial instance type.
    pub instance_type: String,
    /// Volume type, mutually exclusive with `iops`.
    pub volume_type: Option<String>,
    /// Provisioned IOPS, mutually exclusive with `volume_type`.
    pub iops: Option<u32>,
    /// Number of extra data volumes.
    pub volumes: u32,
    /// Size of each data volume in GiB.
    pub volume_size: u32,
    /// Whether data volumes are encrypted.
    pub encrypt_volumes: bool,
    /// Subnet type, mutually exclusive with `subnet`.
    pub subnet_type: Option<SubnetType>,
    /// Explicit subnet, mutually exclusive with `subnet_type`.
    pub subnet: Option<String>,
    /// Tags applied to the host.
    pub tags: BTreeMap<String, String>,
    /// Security groups besides the implicit `base` group.
    pub security_groups: BTreeSet<String>,
    /// LDAP user groups with access.
    pub user_groups: BTreeSet<String>,
    /// Whether termination protection is enabled.
    pub protect: bool,
    /// Bastion used for SSH; defaults to the Cartel bastion.
    pub bastion_host: Option<String>,
    /// SSH user for provisioning.
    pub user: Option<String>,
    /// SSH private key for provisioning.
    pub private_key: Option<SecretString>,
    /// Whether to authenticate through the local SSH agent.
    pub agent: bool,
    /// Commands run after files are transferred, in order.
    pub commands: Vec<String>,
    /// Files transferred to the host.
    pub files: BTreeSet<FileSpec>,
    /// Whether a change to `files` re-runs `commands`.
    pub commands_after_file_changes: bool,
    /// Whether a host that failed to create is left in place.
    pub keep_failed_instances: bool,
}

impl Default for HostSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            instance_role: DEFAULT_INSTANCE_ROLE.to_owned(),
            image: None,
            instance_type: DEFAULT_INSTANCE_TYPE.to_owned(),
            volume_type: None,
            iops: None,
            volumes: 0,
            volume_size: 0,
            encrypt_volumes: true,
            subnet_type: None,
            subnet: None,
            tags: BTreeMap::new(),
            security_groups: BTreeSet::new(),
            user_groups: BTreeSet::new(),
            protect: false,
            bastion_host: None,
            user: None,
            private_key: None,
            agent: false,
            commands: Vec::new(),
            files: BTreeSet::new(),
            commands_after_file_changes: false,
            keep_failed_instances: false,
        }
    }
}

impl HostSpec {
    /// Creates a spec for `name` with every other attribute at its default.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns `true` when the spec declares files or commands, which makes
    /// SSH access mandatory.
    #[must_use]
    pub fn needs_provisioning(&self) -> bool {
        !self.commands.is_empty() || !self.files.is_empty()
    }

    /// Returns `true` when the host runs the container-host role, which
    /// enables the docker readiness probe.
    #[must_use]
    pub fn is_container_host(&self) -> bool {
        self.instance_role == DEFAULT_INSTANCE_ROLE
    }

    /// Validates the spec, consulting `SSH_AUTH_SOCK` when `agent` is set.
    ///
    /// # Errors
    ///
    /// Returns every violated rule at once as [`ValidationErrors`].
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_with_agent(std::env::var_os("SSH_AUTH_SOCK").is_some())
    }

    /// Validates the spec with an explicit answer to "is an SSH agent
    /// available".
    ///
    /// # Errors
    ///
    /// Returns every violated rule at once as [`ValidationErrors`].
    pub fn validate_with_agent(&self, agent_available: bool) -> Result<(), ValidationErrors> {
        validation::validate_host(self, agent_available)
    }
}

#[cfg(test)]
mod tests;
