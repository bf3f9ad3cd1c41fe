//! Behavioural tests for the one-shot exec provisioner.

#[path = "common/reconciler_fixtures.rs"]
mod reconciler_fixtures;

use std::collections::{BTreeMap, BTreeSet};

use hsdp_container_host::test_support::{FakeSsh, SshEvent, output};
use hsdp_container_host::{
    Diagnostics, ExecProvisioner, ExecSpec, ExecState, FileSpec, ReconcileError, SshError,
};

use reconciler_fixtures::fast_readiness;

fn provisioner(ssh: &FakeSsh) -> ExecProvisioner<FakeSsh> {
    ExecProvisioner::new(ssh.clone(), Some(String::from("gw.example.com")))
        .with_readiness(fast_readiness(2))
}

fn spec(commands: &[&str]) -> ExecSpec {
    ExecSpec {
        triggers: BTreeMap::from([(String::from("version"), String::from("1"))]),
        host: String::from("10.0.0.20"),
        user: Some(String::from("core")),
        private_key: Some("-----BEGIN KEY-----".into()),
        commands: commands.iter().map(|command| (*command).to_owned()).collect(),
        ..ExecSpec::default()
    }
}

#[tokio::test]
async fn exec_copies_probes_and_runs_in_order() {
    let ssh = FakeSsh::new();
    ssh.script_exit("docker ps -q", 0, "abc123\n");
    let mut desired = spec(&["docker ps -q"]);
    desired.files = BTreeSet::from([FileSpec {
        content: Some(String::from("payload")),
        destination: String::from("/tmp/payload"),
        ..FileSpec::default()
    }]);
    let mut state = ExecState::new(desired);
    let mut diagnostics = Diagnostics::new();

    provisioner(&ssh)
        .create(&mut state, &mut diagnostics)
        .await
        .unwrap_or_else(|err| panic!("exec: {err}"));

    let events = ssh.events();
    assert_eq!(
        events,
        vec![
            SshEvent::Connect {
                destination: String::from("core@10.0.0.20"),
                bastion: Some(String::from("gw.example.com")),
                with_key: true,
            },
            SshEvent::WriteFile {
                destination: String::from("/tmp/payload"),
                content: b"payload".to_vec(),
            },
            SshEvent::Run(String::from("docker volume ls")),
            SshEvent::Run(String::from("docker ps -q")),
            SshEvent::Close,
        ]
    );
    assert_eq!(state.result.as_deref(), Some("abc123\n"));
    let id = state.id.unwrap_or_else(|| panic!("id should be assigned"));
    assert_eq!(id.len(), 36, "random uuid expected, got {id}");
    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn exec_command_failure_leaves_no_id() {
    let ssh = FakeSsh::new();
    ssh.script("make deploy", Ok(output(2, "building\n", "no rule")));
    let mut state = ExecState::new(spec(&["make deploy", "echo unreachable"]));

    let err = provisioner(&ssh)
        .create(&mut state, &mut Diagnostics::new())
        .await
        .expect_err("command fails");

    assert!(matches!(err, ReconcileError::CommandFailure { exit_code: Some(2), .. }));
    assert!(state.id.is_none());
    assert_eq!(state.result.as_deref(), Some("building\n"));
    assert!(!ssh.commands().contains(&String::from("echo unreachable")));
}

#[tokio::test]
async fn exec_without_credentials_is_rejected_before_connecting() {
    let ssh = FakeSsh::new();
    let mut desired = spec(&["true"]);
    desired.private_key = None;
    desired.user = None;
    let mut state = ExecState::new(desired);

    let err = provisioner(&ssh)
        .create(&mut state, &mut Diagnostics::new())
        .await
        .expect_err("credentials are required");

    assert!(matches!(err, ReconcileError::Validation(_)), "got {err}");
    assert!(ssh.events().is_empty());
}

#[tokio::test]
async fn exec_rejects_more_than_fifty_commands() {
    let ssh = FakeSsh::new();
    let commands: Vec<String> = (0..51).map(|index| format!("echo {index}")).collect();
    let mut desired = spec(&[]);
    desired.commands = commands;
    let mut state = ExecState::new(desired);

    let err = provisioner(&ssh)
        .create(&mut state, &mut Diagnostics::new())
        .await
        .expect_err("too many commands");

    assert!(matches!(err, ReconcileError::Validation(_)), "got {err}");
}

#[tokio::test]
async fn exec_connect_failure_is_reported() {
    let ssh = FakeSsh::new();
    ssh.fail_connect(SshError::Connect {
        destination: String::from("core@10.0.0.20"),
        message: String::from("connection refused"),
    });
    let mut state = ExecState::new(spec(&["true"]));

    let err = provisioner(&ssh)
        .create(&mut state, &mut Diagnostics::new())
        .await
        .expect_err("connect fails");

    assert!(matches!(err, ReconcileError::Ssh { .. }), "got {err}");
    assert!(state.id.is_none());
}

#[test]
fn changed_triggers_force_replacement() {
    let ssh = FakeSsh::new();
    let mut state = ExecState::new(spec(&["true"]));
    state.id = Some(String::from("existing"));
    let mut desired = spec(&["true"]);
    desired
        .triggers
        .insert(String::from("version"), String::from("2"));

    let err = provisioner(&ssh)
        .update(&mut state, desired)
        .expect_err("triggers changed");

    let ReconcileError::ReplacementRequired { fields } = err else {
        panic!("expected replacement, got {err}");
    };
    assert_eq!(fields, vec![String::from("triggers")]);
    assert_eq!(state.id.as_deref(), Some("existing"));
}

#[test]
fn unchanged_triggers_update_in_place() {
    let ssh = FakeSsh::new();
    let mut state = ExecState::new(spec(&["true"]));
    state.id = Some(String::from("existing"));
    let desired = spec(&["true", "echo more"]);

    provisioner(&ssh)
        .update(&mut state, desired)
        .unwrap_or_else(|err| panic!("update: {err}"));

    assert_eq!(state.spec.commands.len(), 2);
    assert_eq!(state.spec.bastion_host.as_deref(), Some("gw.example.com"));
    assert!(ssh.events().is_empty());
}

#[test]
fn delete_only_forgets() {
    let ssh = FakeSsh::new();
    let exec = provisioner(&ssh);
    let mut state = ExecState::new(spec(&["true"]));
    state.id = Some(String::from("existing"));

    exec.read(&state);
    exec.delete(&mut state);

    assert!(state.id.is_none());
    assert!(ssh.events().is_empty());
}
