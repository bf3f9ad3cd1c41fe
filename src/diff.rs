//! Typed difference between two host specs.
//!
//! [`HostDiff::between`] is the single place that decides what an update has
//! to do; the reconciler then applies each part in a fixed order.

use std::collections::{BTreeMap, BTreeSet};

use crate::files::FileSpec;
use crate::spec::{BILLING_TAG, HostSpec};

/// Entries to remove from and add to a remote set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SetDelta {
    /// `old \ new`.
    pub remove: Vec<String>,
    /// `new \ old`.
    pub add: Vec<String>,
}

impl SetDelta {
    /// Computes the delta turning `old` into `new`.
    #[must_use]
    pub fn between(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        Self {
            remove: old.difference(new).cloned().collect(),
            add: new.difference(old).cloned().collect(),
        }
    }

    /// Returns `true` when nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// Combined tag update for `AddTags`.
///
/// Keys removed from `new` (or emptied) map to `""`; added or changed keys map
/// to their new value. `billing` is never part of the result.
#[must_use]
pub fn tag_changes(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut changes = BTreeMap::new();
    for (key, value) in old {
        if key == BILLING_TAG || value.is_empty() {
            continue;
        }
        if new.get(key).is_none_or(String::is_empty) {
            changes.insert(key.clone(), String::new());
        }
    }
    for (key, value) in new {
        if key == BILLING_TAG || value.is_empty() {
            continue;
        }
        if old.get(key) != Some(value) {
            changes.insert(key.clone(), value.clone());
        }
    }
    changes
}

/// What to do about a changed file set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileChange {
    /// Whether commands run again after the transfer.
    pub rerun_commands: bool,
    /// Destinations whose entry changed only in mode or ownership.
    pub permission_only: Vec<String>,
}

/// Everything an update has to change on a host.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostDiff {
    /// Combined tag update, empty when tags are unchanged.
    pub tags: BTreeMap<String, String>,
    /// User group changes.
    pub user_groups: SetDelta,
    /// Security group changes.
    pub security_groups: SetDelta,
    /// New protection flag, when it changed.
    pub protect: Option<bool>,
    /// File re-transfer, when the file set changed.
    pub files: Option<FileChange>,
    /// Attributes that cannot change without replacing the host.
    pub replace: Vec<&'static str>,
}

impl HostDiff {
    /// Computes the update turning `old` into `new`.
    #[must_use]
    pub fn between(old: &HostSpec, new: &HostSpec) -> Self {
        Self {
            tags: tag_changes(&old.tags, &new.tags),
            user_groups: SetDelta::between(&old.user_groups, &new.user_groups),
            security_groups: SetDelta::between(&old.security_groups, &new.security_groups),
            protect: (old.protect != new.protect).then_some(new.protect),
            files: (old.files != new.files).then(|| FileChange {
                rerun_commands: new.commands_after_file_changes,
                permission_only: permission_only_changes(&old.files, &new.files),
            }),
            replace: immutable_changes(old, new),
        }
    }

    /// Returns `true` when the update has nothing to do remotely.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.user_groups.is_empty()
            && self.security_groups.is_empty()
            && self.protect.is_none()
            && self.files.is_none()
            && self.replace.is_empty()
    }
}

fn permission_only_changes(old: &BTreeSet<FileSpec>, new: &BTreeSet<FileSpec>) -> Vec<String> {
    new.difference(old)
        .filter(|added| {
            old.difference(new)
                .any(|removed| removed.same_payload(added))
        })
        .map(|file| file.destination.clone())
        .collect()
}

fn immutable_changes(old: &HostSpec, new: &HostSpec) -> Vec<&'static str> {
    let checks = [
        ("name", old.name != new.name),
        ("image", old.image != new.image),
        ("instance_type", old.instance_type != new.instance_type),
        ("instance_role", old.instance_role != new.instance_role),
        ("volume_type", old.volume_type != new.volume_type),
        ("iops", old.iops != new.iops),
        ("volumes", old.volumes != new.volumes),
        ("volume_size", old.volume_size != new.volume_size),
        ("encrypt_volumes", old.encrypt_volumes != new.encrypt_volumes),
        ("subnet_type", old.subnet_type != new.subnet_type),
        ("subnet", old.subnet != new.subnet),
    ];
    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}
