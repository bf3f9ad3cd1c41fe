//! Unit tests for Cartel response handling.

use rstest::rstest;

use super::http::interpret;
use super::*;

#[rstest]
#[case(200, br#"{"ok":true}"#.as_slice())]
#[case(201, b"[]".as_slice())]
fn interpret_passes_through_usable_bodies(#[case] status: u16, #[case] body: &[u8]) {
    assert_eq!(interpret("create", status, body), Ok(body));
}

#[rstest]
#[case(b"".as_slice())]
#[case(b"null".as_slice())]
#[case(b"  null \n".as_slice())]
fn interpret_flags_empty_success_bodies(#[case] body: &[u8]) {
    let err = interpret("create", 200, body).expect_err("empty body is not usable");
    assert_eq!(
        err,
        CartelError::EmptyBody {
            action: String::from("create"),
            status: 200
        }
    );
    assert!(err.is_server_error());
    assert!(err.is_transient());
}

#[rstest]
#[case(409, "Instance already exists")]
#[case(400, "name_tag already exists in region")]
fn interpret_detects_duplicate_names(#[case] status: u16, #[case] message: &str) {
    let err = interpret("create", status, message.as_bytes()).expect_err("duplicate");
    assert!(err.is_already_exists(), "{err:?}");
    assert!(!err.is_not_found());
    assert!(!err.is_server_error());
}

#[rstest]
#[case(504, false, true)]
#[case(500, false, true)]
#[case(400, true, false)]
#[case(404, true, false)]
#[case(403, false, false)]
fn status_classification(#[case] status: u16, #[case] not_found: bool, #[case] server: bool) {
    let err = interpret("instance_details", status, b"oops").expect_err("non-2xx");
    assert_eq!(err.status(), Some(status));
    assert_eq!(err.is_not_found(), not_found);
    assert_eq!(err.is_server_error(), server);
    assert!(!err.is_transport());
}

#[rstest]
fn transport_errors_have_no_status() {
    let err = CartelError::Transport {
        action: String::from("create"),
        message: String::from("connection reset"),
    };
    assert_eq!(err.status(), None);
    assert!(err.is_transport());
    assert!(err.is_transient());
    assert!(!err.is_server_error());
}

#[rstest]
fn missing_records_read_as_not_found() {
    let err = CartelError::Missing {
        action: String::from("instance_details"),
        name: String::from("h1"),
    };
    assert!(err.is_not_found());
}

#[rstest]
#[case("provisioning", DeploymentState::Provisioning)]
#[case("succeeded", DeploymentState::Succeeded)]
#[case("shutting-down", DeploymentState::ShuttingDown)]
#[case("rebooting", DeploymentState::Other(String::from("rebooting")))]
fn deployment_states_parse(#[case] raw: &str, #[case] expected: DeploymentState) {
    let parsed = DeploymentState::from(raw);
    assert_eq!(parsed, expected);
    assert_eq!(parsed.as_str(), raw);
}

#[rstest]
fn instance_decodes_wire_names() {
    let body = r#"{
        "instance_id": "i-01",
        "name_tag": "h1",
        "private_address": "10.0.0.1",
        "public_address": "",
        "security_groups": ["base", "web"],
        "ldap_groups": ["ops"],
        "tags": {"billing": "dev"},
        "protection": true,
        "unknown_field": 42
    }"#;
    let instance: Instance = serde_json::from_str(body).expect("instance should decode");
    assert_eq!(instance.name, "h1");
    assert_eq!(instance.private_ip, "10.0.0.1");
    assert_eq!(instance.user_groups, vec![String::from("ops")]);
    assert!(instance.protection);
    assert!(instance.block_devices.is_empty());
}

#[rstest]
fn create_request_uses_wire_names_and_skips_unset_options() {
    let mut spec = crate::spec::HostSpec::named("h1");
    spec.security_groups.insert(String::from("web"));
    let body = serde_json::to_value(CreateRequest::from_spec(&spec)).expect("serialise");
    assert_eq!(body["name_tag"], "h1");
    assert_eq!(body["role"], "container-host");
    assert_eq!(body["security_groups"], serde_json::json!(["web"]));
    assert!(body.get("iops").is_none());
    assert!(body.get("subnet_type").is_none());
}
