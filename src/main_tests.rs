//! Unit tests for the `hsdp-ch` CLI binary implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8PathBuf;
use hsdp_container_host::test_support::{CartelCall, FakeCartel, FakeSsh, SshEvent};
use hsdp_container_host::{CartelError, DeploymentPoller};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap_or_else(|err| panic!("write {path}: {err}"));
        path
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .unwrap_or_else(|path| panic!("non-utf8 tempdir: {}", path.display()));
    Workspace { _dir: dir, root }
}

fn reconciler(cartel: &FakeCartel, ssh: &FakeSsh) -> HostReconciler<FakeCartel, FakeSsh> {
    HostReconciler::new(cartel.clone(), ssh.clone()).with_poller(
        DeploymentPoller::default()
            .with_initial_delay(Duration::ZERO)
            .with_interval_bounds(Duration::ZERO, Duration::ZERO),
    )
}

fn exec_spec_json(triggers: &BTreeMap<&str, &str>) -> String {
    serde_json::json!({
        "triggers": triggers,
        "host": "10.0.0.20",
        "user": "core",
        "private_key": "KEY",
        "commands": ["echo hello"],
    })
    .to_string()
}

#[test]
fn write_error_appends_newline() {
    let mut buffer = Vec::new();
    let err = CliError::Logging(String::from("boom"));

    write_error(&mut buffer, &err);

    let rendered = String::from_utf8(buffer).unwrap_or_else(|err| panic!("utf8: {err}"));
    assert_eq!(rendered, "logging setup failed: boom\n");
}

#[test]
fn write_diagnostics_prints_one_line_each() {
    let mut diagnostics = Diagnostics::new();
    diagnostics.warn("file copy failed", "/etc/app.conf");
    diagnostics.error("command failed", "");
    let mut buffer = Vec::new();

    write_diagnostics(&mut buffer, &diagnostics);

    let rendered = String::from_utf8(buffer).unwrap_or_else(|err| panic!("utf8: {err}"));
    assert_eq!(
        rendered,
        "warning: file copy failed: /etc/app.conf\nerror: command failed\n"
    );
}

#[rstest]
fn state_round_trips_through_disk(workspace: Workspace) {
    let path = workspace.path("state.json");
    let mut state = HostState::new(HostSpec::named("ch1"));
    state.id = Some(String::from("i-01"));

    store_json(&path, &state).unwrap_or_else(|err| panic!("store: {err}"));
    let loaded: HostState = load_json(&path).unwrap_or_else(|err| panic!("load: {err}"));

    assert_eq!(loaded, state);
}

#[rstest]
fn missing_optional_state_is_none(workspace: Workspace) {
    let loaded: Option<ExecState> = load_optional_json(&workspace.path("absent.json"))
        .unwrap_or_else(|err| panic!("load: {err}"));

    assert!(loaded.is_none());
}

#[rstest]
#[case("absent.json", None)]
#[case("broken.json", Some("{not json"))]
fn load_json_reports_unusable_files(
    workspace: Workspace,
    #[case] name: &str,
    #[case] contents: Option<&str>,
) {
    let path = contents.map_or_else(
        || workspace.path(name),
        |body| workspace.write(name, body),
    );

    let err = load_json::<HostState>(&path).expect_err("file should be rejected");

    match (contents, err) {
        (None, CliError::Read { path: reported, .. })
        | (Some(_), CliError::Parse { path: reported, .. }) => {
            assert_eq!(reported, path.as_str());
        }
        (_, other) => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[tokio::test]
async fn create_writes_state_with_instance_id(workspace: Workspace) {
    let cartel = FakeCartel::new();
    let ssh = FakeSsh::new();
    let args = SpecCommand {
        spec: workspace.write("spec.json", r#"{"name": "ch1"}"#),
        state: workspace.path("state.json"),
    };
    let mut diagnostics = Diagnostics::new();

    create_host(&reconciler(&cartel, &ssh), &args, &mut diagnostics)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    let state: HostState = load_json(&args.state).unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(state.id.as_deref(), Some("i-01"));
    assert!(ssh.events().is_empty(), "no provisioning was declared");
}

#[rstest]
#[tokio::test]
async fn failed_create_still_writes_state(workspace: Workspace) {
    let cartel = FakeCartel::new();
    cartel.push_create_error(CartelError::Status {
        action: String::from("create"),
        status: 403,
        message: String::from("forbidden"),
    });
    let ssh = FakeSsh::new();
    let args = SpecCommand {
        spec: workspace.write("spec.json", r#"{"name": "ch1"}"#),
        state: workspace.path("state.json"),
    };
    let mut diagnostics = Diagnostics::new();

    let err = create_host(&reconciler(&cartel, &ssh), &args, &mut diagnostics)
        .await
        .expect_err("create should fail");

    assert!(matches!(err, CliError::Reconcile(ReconcileError::CreateFatal { .. })));
    let state: HostState = load_json(&args.state).unwrap_or_else(|err| panic!("load: {err}"));
    assert!(state.id.is_none());
}

#[rstest]
#[tokio::test]
async fn delete_clears_stored_id(workspace: Workspace) {
    let cartel = FakeCartel::new();
    let ssh = FakeSsh::new();
    let host = reconciler(&cartel, &ssh);
    let args = SpecCommand {
        spec: workspace.write("spec.json", r#"{"name": "ch1"}"#),
        state: workspace.path("state.json"),
    };
    let mut diagnostics = Diagnostics::new();
    create_host(&host, &args, &mut diagnostics)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    let state_args = StateCommand {
        state: args.state.clone(),
    };
    delete_host(&host, &state_args, &mut diagnostics)
        .await
        .unwrap_or_else(|err| panic!("delete: {err}"));

    let state: HostState = load_json(&args.state).unwrap_or_else(|err| panic!("load: {err}"));
    assert!(state.id.is_none());
    assert_eq!(
        cartel.count(|call| matches!(call, CartelCall::Destroy(name) if name == "ch1")),
        1
    );
}

#[rstest]
#[tokio::test]
async fn exec_runs_once_until_triggers_change(workspace: Workspace) {
    let ssh = FakeSsh::new();
    let provisioner = ExecProvisioner::new(ssh.clone(), Some(String::from("gw.example.com")))
        .with_readiness(hsdp_container_host::ReadinessPolicy {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            probe_timeout: Duration::from_secs(1),
        });
    let first = BTreeMap::from([("version", "1")]);
    let args = SpecCommand {
        spec: workspace.write("exec.json", &exec_spec_json(&first)),
        state: workspace.path("exec-state.json"),
    };
    let mut diagnostics = Diagnostics::new();

    exec_resource(&provisioner, &args, &mut diagnostics)
        .await
        .unwrap_or_else(|err| panic!("first exec: {err}"));
    exec_resource(&provisioner, &args, &mut diagnostics)
        .await
        .unwrap_or_else(|err| panic!("repeat exec: {err}"));
    let connects = |events: &[SshEvent]| {
        events
            .iter()
            .filter(|event| matches!(event, SshEvent::Connect { .. }))
            .count()
    };
    assert_eq!(connects(&ssh.events()), 1, "unchanged triggers must not rerun");

    let second = BTreeMap::from([("version", "2")]);
    workspace.write("exec.json", &exec_spec_json(&second));
    exec_resource(&provisioner, &args, &mut diagnostics)
        .await
        .unwrap_or_else(|err| panic!("replacement exec: {err}"));

    assert_eq!(connects(&ssh.events()), 2);
    let state: ExecState = load_json(&args.state).unwrap_or_else(|err| panic!("load: {err}"));
    assert!(state.id.is_some());
    assert_eq!(state.spec.triggers.get("version").map(String::as_str), Some("2"));
}
