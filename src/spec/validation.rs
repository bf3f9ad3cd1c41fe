//! Preflight validation for host specs.
//!
//! Validation never stops at the first violation: every rule is checked so
//! an operator sees all problems in one pass.

use std::fmt;

use thiserror::Error;

use crate::ssh::SecretString;

use super::{BASE_SECURITY_GROUP, HostSpec, RESERVED_NAME_TAG, limits};

/// A single violated preflight rule.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// Raised when a required string attribute is empty.
    #[error("{field} must not be empty")]
    MissingField {
        /// Attribute name.
        field: &'static str,
    },
    /// Raised when the reserved `name` tag is declared.
    #[error("tag key 'name' is reserved by Cartel")]
    ReservedTag,
    /// Raised when more tags are declared than Cartel accepts.
    #[error("at most {max} tags are allowed, got {count}", max = limits::MAX_TAGS)]
    TooManyTags {
        /// Number of declared tags.
        count: usize,
    },
    /// Raised when a tag value exceeds the length limit.
    #[error("value of tag '{key}' is {len} characters, at most {max} are allowed", max = limits::MAX_TAG_VALUE_LEN)]
    TagValueTooLong {
        /// Offending tag key.
        key: String,
        /// Length of the value in characters.
        len: usize,
    },
    /// Raised when the implicit `base` security group is declared.
    #[error("security group 'base' is implicit and must not be declared")]
    ReservedSecurityGroup,
    /// Raised when a collection holds more entries than allowed.
    #[error("at most {max} {field} are allowed, got {count}")]
    TooMany {
        /// Attribute name.
        field: &'static str,
        /// Upper bound.
        max: usize,
        /// Number of declared entries.
        count: usize,
    },
    /// Raised when a numeric attribute is out of range.
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        /// Attribute name.
        field: &'static str,
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
        /// Declared value.
        value: u32,
    },
    /// Raised when two mutually exclusive attributes are both declared.
    #[error("{first} conflicts with {second}")]
    Conflict {
        /// First attribute.
        first: &'static str,
        /// Second attribute.
        second: &'static str,
    },
    /// Raised when files or commands are declared without an SSH user.
    #[error("user is required when commands or files are declared")]
    MissingUser,
    /// Raised when files or commands are declared without credentials.
    #[error("private_key or agent is required when commands or files are declared")]
    MissingCredentials,
    /// Raised when `agent` is requested but no agent socket is available.
    #[error("agent is enabled but SSH_AUTH_SOCK is not set")]
    AgentUnavailable,
}

/// Every rule violated by a spec.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    /// Returns the individual violations.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// Returns `true` when `predicate` matches any violation.
    pub fn contains(&self, predicate: impl Fn(&ValidationError) -> bool) -> bool {
        self.0.iter().any(predicate)
    }

    pub(crate) fn into_result(self) -> Result<(), Self> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub(super) fn validate_host(spec: &HostSpec, agent_available: bool) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if spec.name.trim().is_empty() {
        errors.push(ValidationError::MissingField { field: "name" });
    }
    if spec.instance_type.trim().is_empty() {
        errors.push(ValidationError::MissingField {
            field: "instance_type",
        });
    }

    check_tags(spec, &mut errors);
    check_groups(spec, &mut errors);
    check_storage(spec, &mut errors);

    if spec.subnet_type.is_some() && spec.subnet.is_some() {
        errors.push(ValidationError::Conflict {
            first: "subnet",
            second: "subnet_type",
        });
    }

    check_limit(
        "commands",
        spec.commands.len(),
        limits::MAX_HOST_COMMANDS,
        &mut errors,
    );

    if spec.needs_provisioning() {
        check_ssh_credentials(
            spec.user.as_deref(),
            spec.private_key.as_ref(),
            spec.agent,
            agent_available,
            &mut errors,
        );
    }

    ValidationErrors(errors).into_result()
}

fn check_tags(spec: &HostSpec, errors: &mut Vec<ValidationError>) {
    if spec.tags.contains_key(RESERVED_NAME_TAG) {
        errors.push(ValidationError::ReservedTag);
    }
    if spec.tags.len() > limits::MAX_TAGS {
        errors.push(ValidationError::TooManyTags {
            count: spec.tags.len(),
        });
    }
    for (key, value) in &spec.tags {
        let len = value.chars().count();
        if len > limits::MAX_TAG_VALUE_LEN {
            errors.push(ValidationError::TagValueTooLong {
                key: key.clone(),
                len,
            });
        }
    }
}

fn check_groups(spec: &HostSpec, errors: &mut Vec<ValidationError>) {
    if spec.security_groups.contains(BASE_SECURITY_GROUP) {
        errors.push(ValidationError::ReservedSecurityGroup);
    }
    check_limit(
        "security_groups",
        spec.security_groups.len(),
        limits::MAX_SECURITY_GROUPS,
        errors,
    );
    check_limit(
        "user_groups",
        spec.user_groups.len(),
        limits::MAX_USER_GROUPS,
        errors,
    );
}

fn check_storage(spec: &HostSpec, errors: &mut Vec<ValidationError>) {
    if spec.volume_type.is_some() && spec.iops.is_some() {
        errors.push(ValidationError::Conflict {
            first: "iops",
            second: "volume_type",
        });
    }
    if let Some(iops) = spec.iops
        && !limits::IOPS_RANGE.contains(&iops)
    {
        errors.push(ValidationError::OutOfRange {
            field: "iops",
            min: *limits::IOPS_RANGE.start(),
            max: *limits::IOPS_RANGE.end(),
            value: iops,
        });
    }
    if spec.volumes > limits::MAX_VOLUMES {
        errors.push(ValidationError::OutOfRange {
            field: "volumes",
            min: 0,
            max: limits::MAX_VOLUMES,
            value: spec.volumes,
        });
    }
    if spec.volume_size > limits::MAX_VOLUME_SIZE {
        errors.push(ValidationError::OutOfRange {
            field: "volume_size",
            min: 0,
            max: limits::MAX_VOLUME_SIZE,
            value: spec.volume_size,
        });
    }
}

pub(crate) fn check_limit(
    field: &'static str,
    count: usize,
    max: usize,
    errors: &mut Vec<ValidationError>,
) {
    if count > max {
        errors.push(ValidationError::TooMany { field, max, count });
    }
}

/// Checks the SSH prerequisites shared by hosts and the exec provisioner:
/// a user plus either a private key or a usable agent.
pub(crate) fn check_ssh_credentials(
    user: Option<&str>,
    private_key: Option<&SecretString>,
    agent: bool,
    agent_available: bool,
    errors: &mut Vec<ValidationError>,
) {
    if user.is_none_or(|value| value.trim().is_empty()) {
        errors.push(ValidationError::MissingUser);
    }
    let has_key = private_key.is_some_and(|key| !key.expose().trim().is_empty());
    if has_key {
        return;
    }
    if !agent {
        errors.push(ValidationError::MissingCredentials);
    } else if !agent_available {
        errors.push(ValidationError::AgentUnavailable);
    }
}
