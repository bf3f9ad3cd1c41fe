//! Wire types exchanged with Cartel.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::spec::HostSpec;

/// Provisioning workflow state reported by Cartel.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentState {
    /// The host is still being built.
    Provisioning,
    /// Cartel cannot currently tell.
    Indeterminate,
    /// The host is ready.
    Succeeded,
    /// Provisioning failed.
    Failed,
    /// The host was terminated.
    Terminated,
    /// The host is being shut down.
    ShuttingDown,
    /// Any state this client does not know about.
    Other(String),
}

impl DeploymentState {
    /// Returns the wire representation of the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Indeterminate => "indeterminate",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
            Self::ShuttingDown => "shutting-down",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<&str> for DeploymentState {
    fn from(value: &str) -> Self {
        match value.trim() {
            "provisioning" => Self::Provisioning,
            "indeterminate" => Self::Indeterminate,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "terminated" => Self::Terminated,
            "shutting-down" => Self::ShuttingDown,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for DeploymentState {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<DeploymentState> for String {
    fn from(value: DeploymentState) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host record returned by the details and listing endpoints.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Instance {
    /// Stable remote identity of the host.
    pub instance_id: String,
    /// Unique host name.
    #[serde(rename = "name_tag")]
    pub name: String,
    /// Private IPv4 address.
    #[serde(rename = "private_address")]
    pub private_ip: String,
    /// Public IPv4 address, if any.
    #[serde(rename = "public_address")]
    pub public_ip: String,
    /// Instance role.
    pub role: String,
    /// Commercial instance type.
    pub instance_type: String,
    /// Subnet identifier.
    pub subnet: String,
    /// VPC identifier.
    pub vpc: String,
    /// Availability zone.
    pub zone: String,
    /// Launch timestamp as reported by Cartel.
    pub launch_time: String,
    /// Attached block device names.
    pub block_devices: Vec<String>,
    /// Effective tags.
    pub tags: BTreeMap<String, String>,
    /// Attached security groups, including the implicit `base` group.
    pub security_groups: Vec<String>,
    /// LDAP user groups with access.
    #[serde(rename = "ldap_groups")]
    pub user_groups: Vec<String>,
    /// Whether termination protection is enabled.
    pub protection: bool,
}

/// Acknowledgement returned by a successful create.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateAck {
    /// Identity assigned to the new host.
    pub instance_id: String,
    /// Private address assigned to the new host.
    pub ip_address: String,
}

/// Body of a Cartel create request.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateRequest {
    /// Unique host name.
    #[serde(rename = "name_tag")]
    pub name: String,
    /// Instance role.
    pub role: String,
    /// Image to boot, when not the Cartel default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Commercial instance type.
    pub instance_type: String,
    /// Volume type, mutually exclusive with `iops`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    /// Provisioned IOPS, mutually exclusive with `volume_type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iops: Option<u32>,
    /// Number of extra data volumes.
    pub num_volumes: u32,
    /// Size of each data volume in GiB.
    pub volume_size: u32,
    /// Whether data volumes are encrypted.
    pub encrypt_vols: bool,
    /// Subnet type (`private` or `public`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_type: Option<String>,
    /// Explicit subnet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// Security groups to attach.
    pub security_groups: Vec<String>,
    /// LDAP user groups to grant access.
    #[serde(rename = "ldap_groups")]
    pub user_groups: Vec<String>,
    /// Tags to apply at creation.
    pub tags: BTreeMap<String, String>,
    /// Whether termination protection is enabled from the start.
    pub protect: bool,
}

impl CreateRequest {
    /// Builds the create body for a validated host spec.
    #[must_use]
    pub fn from_spec(spec: &HostSpec) -> Self {
        Self {
            name: spec.name.clone(),
            role: spec.instance_role.clone(),
            image: spec.image.clone(),
            instance_type: spec.instance_type.clone(),
            volume_type: spec.volume_type.clone(),
            iops: spec.iops,
            num_volumes: spec.volumes,
            volume_size: spec.volume_size,
            encrypt_vols: spec.encrypt_volumes,
            subnet_type: spec.subnet_type.map(|kind| kind.as_str().to_owned()),
            subnet: spec.subnet.clone(),
            security_groups: spec.security_groups.iter().cloned().collect(),
            user_groups: spec.user_groups.iter().cloned().collect(),
            tags: spec.tags.clone(),
            protect: spec.protect,
        }
    }
}
