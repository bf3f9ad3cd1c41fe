//! Unit tests for host spec defaults and validation.

use std::collections::BTreeMap;

use rstest::{fixture, rstest};

use super::*;
use crate::files::FileSpec;

#[fixture]
fn spec() -> HostSpec {
    let mut spec = HostSpec::named("h1");
    spec.tags = BTreeMap::from([(String::from("billing"), String::from("dev"))]);
    spec
}

fn errors_of(spec: &HostSpec) -> ValidationErrors {
    spec.validate_with_agent(false)
        .expect_err("spec should be rejected")
}

#[rstest]
fn defaults_match_declared_schema() {
    let spec = HostSpec::default();
    assert_eq!(spec.instance_role, "container-host");
    assert_eq!(spec.instance_type, "m5.large");
    assert!(spec.encrypt_volumes);
    assert!(!spec.keep_failed_instances);
}

#[rstest]
fn minimal_spec_is_valid(spec: HostSpec) {
    assert!(spec.validate_with_agent(false).is_ok());
}

#[rstest]
fn deserialises_with_defaults() {
    let spec: HostSpec = serde_json::from_str(r#"{"name":"h1","subnet_type":"public"}"#)
        .expect("spec should parse");
    assert_eq!(spec.name, "h1");
    assert_eq!(spec.subnet_type, Some(SubnetType::Public));
    assert_eq!(spec.instance_type, DEFAULT_INSTANCE_TYPE);
}

#[rstest]
fn rejects_more_than_eight_tags(mut spec: HostSpec) {
    for idx in 0..8 {
        spec.tags.insert(format!("k{idx}"), String::from("v"));
    }
    let errors = errors_of(&spec);
    assert!(errors.contains(|err| matches!(err, ValidationError::TooManyTags { count: 9 })));
}

#[rstest]
fn rejects_long_tag_values(mut spec: HostSpec) {
    spec.tags.insert(String::from("team"), "x".repeat(256));
    let errors = errors_of(&spec);
    assert!(errors.contains(
        |err| matches!(err, ValidationError::TagValueTooLong { key, len: 256 } if key == "team")
    ));
}

#[rstest]
fn accepts_tag_value_at_limit(mut spec: HostSpec) {
    spec.tags.insert(String::from("team"), "x".repeat(255));
    assert!(spec.validate_with_agent(false).is_ok());
}

#[rstest]
fn rejects_reserved_name_tag(mut spec: HostSpec) {
    spec.tags.insert(String::from("name"), String::from("h1"));
    assert!(errors_of(&spec).contains(|err| matches!(err, ValidationError::ReservedTag)));
}

#[rstest]
fn rejects_base_security_group(mut spec: HostSpec) {
    spec.security_groups.insert(String::from("base"));
    assert!(errors_of(&spec).contains(|err| matches!(err, ValidationError::ReservedSecurityGroup)));
}

#[rstest]
#[case::iops_with_volume_type("iops")]
#[case::subnet_with_subnet_type("subnet")]
fn rejects_conflicting_attributes(mut spec: HostSpec, #[case] first: &str) {
    spec.volume_type = Some(String::from("gp3"));
    spec.iops = Some(100);
    spec.subnet = Some(String::from("subnet-1"));
    spec.subnet_type = Some(SubnetType::Private);
    let errors = errors_of(&spec);
    assert!(errors.contains(|err| matches!(err, ValidationError::Conflict { first: f, .. } if *f == first)));
}

#[rstest]
#[case(0)]
#[case(4001)]
fn rejects_iops_out_of_range(mut spec: HostSpec, #[case] iops: u32) {
    spec.iops = Some(iops);
    assert!(errors_of(&spec).contains(
        |err| matches!(err, ValidationError::OutOfRange { field: "iops", .. })
    ));
}

#[rstest]
fn rejects_too_many_volumes_and_size(mut spec: HostSpec) {
    spec.volumes = 7;
    spec.volume_size = 16_001;
    let errors = errors_of(&spec);
    assert_eq!(errors.errors().len(), 2, "errors: {errors}");
}

#[rstest]
fn accumulates_every_violation(mut spec: HostSpec) {
    spec.tags.insert(String::from("name"), String::from("x"));
    spec.security_groups.insert(String::from("base"));
    spec.commands.push(String::from("true"));
    let errors = errors_of(&spec);
    assert!(errors.errors().len() >= 4, "errors: {errors}");
    assert!(errors.contains(|err| matches!(err, ValidationError::MissingUser)));
    assert!(errors.contains(|err| matches!(err, ValidationError::MissingCredentials)));
}

#[rstest]
fn provisioning_accepts_private_key(mut spec: HostSpec) {
    spec.user = Some(String::from("core"));
    spec.private_key = Some(SecretString::from("-----BEGIN KEY-----"));
    spec.files.insert(FileSpec {
        content: Some(String::from("hello")),
        destination: String::from("/tmp/hello"),
        ..FileSpec::default()
    });
    assert!(spec.validate_with_agent(false).is_ok());
}

#[rstest]
#[case(true, true)]
#[case(false, false)]
fn agent_requires_socket(mut spec: HostSpec, #[case] agent_available: bool, #[case] ok: bool) {
    spec.user = Some(String::from("core"));
    spec.agent = true;
    spec.commands.push(String::from("uptime"));
    let result = spec.validate_with_agent(agent_available);
    assert_eq!(result.is_ok(), ok, "result: {result:?}");
    if !ok {
        assert!(result.is_err_and(|errors| errors.contains(|err| matches!(err, ValidationError::AgentUnavailable))));
    }
}

#[rstest]
fn rejects_more_than_ten_commands(mut spec: HostSpec) {
    spec.user = Some(String::from("core"));
    spec.private_key = Some(SecretString::from("key"));
    spec.commands = (0..11).map(|idx| format!("echo {idx}")).collect();
    assert!(errors_of(&spec).contains(
        |err| matches!(err, ValidationError::TooMany { field: "commands", max: 10, count: 11 })
    ));
}
