//! Persisted resource state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cartel::{DeploymentState, Instance};
use crate::spec::{BASE_SECURITY_GROUP, HostSpec};

/// What the host runtime stores for one `hsdp_container_host`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct HostState {
    /// Remote instance id; `None` when the host is gone or tainted.
    pub id: Option<String>,
    /// Last applied spec, with tags normalised and `billing` kept.
    pub spec: HostSpec,
    /// Last observation.
    pub observed: Option<HostObservation>,
    /// Stdout of the last provisioning command.
    pub result: Option<String>,
}

impl HostState {
    /// Creates state for a host that does not exist yet.
    #[must_use]
    pub fn new(spec: HostSpec) -> Self {
        Self {
            spec,
            ..Self::default()
        }
    }
}

/// Read-back attributes of a host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HostObservation {
    /// Stable remote identity.
    pub instance_id: String,
    /// Private address.
    pub private_ip: String,
    /// Public address, possibly empty.
    pub public_ip: String,
    /// Subnet.
    pub subnet: String,
    /// VPC.
    pub vpc: String,
    /// Availability zone.
    pub zone: String,
    /// Instance role.
    pub role: String,
    /// Launch timestamp.
    pub launch_time: String,
    /// Attached block devices.
    pub block_devices: Vec<String>,
    /// Effective tags as reported.
    pub tags: BTreeMap<String, String>,
    /// Security groups, without `base`.
    pub security_groups: BTreeSet<String>,
    /// User groups.
    pub user_groups: BTreeSet<String>,
    /// Deployment state at read time.
    pub deployment_state: DeploymentState,
    /// Whether termination protection is on.
    pub protected: bool,
}

impl HostObservation {
    /// Projects a Cartel record.
    #[must_use]
    pub fn from_instance(instance: &Instance, deployment_state: DeploymentState) -> Self {
        Self {
            instance_id: instance.instance_id.clone(),
            private_ip: instance.private_ip.clone(),
            public_ip: instance.public_ip.clone(),
            subnet: instance.subnet.clone(),
            vpc: instance.vpc.clone(),
            zone: instance.zone.clone(),
            role: instance.role.clone(),
            launch_time: instance.launch_time.clone(),
            block_devices: instance.block_devices.clone(),
            tags: instance.tags.clone(),
            security_groups: instance
                .security_groups
                .iter()
                .filter(|group| *group != BASE_SECURITY_GROUP)
                .cloned()
                .collect(),
            user_groups: instance.user_groups.iter().cloned().collect(),
            deployment_state,
            protected: instance.protection,
        }
    }
}
