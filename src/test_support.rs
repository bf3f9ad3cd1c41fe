//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeCartel`] and [`FakeSsh`] are in-memory doubles for the injected
//! capabilities. Both are cheap to clone; clones share their recorded calls
//! so a test can keep one handle while the reconciler owns another.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::cartel::{
    CartelClient, CartelError, CartelFuture, CreateAck, CreateRequest, DeploymentState, Instance,
};
use crate::spec::BASE_SECURITY_GROUP;
use crate::ssh::{
    RemoteCommandOutput, SshConfig, SshConnector, SshError, SshFuture, SshSession,
};

/// Bastion reported by [`FakeCartel::bastion_host`] unless overridden.
pub const FAKE_BASTION: &str = "gw.example.com";

/// A call recorded by [`FakeCartel`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CartelCall {
    /// `create` for the named host.
    Create(String),
    /// `destroy` for the named host.
    Destroy(String),
    /// `get_details` for the named host.
    GetDetails(String),
    /// `get_deployment_state` for the named host.
    GetDeploymentState(String),
    /// `get_all_instances`.
    GetAllInstances,
    /// `add_tags`.
    AddTags {
        /// Hosts addressed.
        names: Vec<String>,
        /// Tags sent.
        tags: BTreeMap<String, String>,
    },
    /// `add_user_groups`.
    AddUserGroups(String, Vec<String>),
    /// `remove_user_groups`.
    RemoveUserGroups(String, Vec<String>),
    /// `add_security_groups`.
    AddSecurityGroups(String, Vec<String>),
    /// `remove_security_groups`.
    RemoveSecurityGroups(String, Vec<String>),
    /// `set_protection`.
    SetProtection(String, bool),
}

#[derive(Clone, Debug)]
enum ScriptedCreate {
    Ack(String),
    Fail(CartelError),
    FailButRegister(CartelError, String),
}

#[derive(Debug, Default)]
struct CartelState {
    instances: BTreeMap<String, Instance>,
    calls: Vec<CartelCall>,
    creates: VecDeque<ScriptedCreate>,
    created: u32,
    deployment: VecDeque<Result<DeploymentState, CartelError>>,
    tag_failure: Option<CartelError>,
    destroy_failure: Option<CartelError>,
    group_failure: Option<CartelError>,
    create_delay: Option<Duration>,
    bastion: String,
}

/// In-memory [`CartelClient`].
///
/// Unscripted creates succeed with sequential ids (`i-01`, `i-02`, ...) and
/// register the host. Deployment states are served from a queue whose last
/// entry repeats; an empty queue reports `succeeded` for known hosts and a
/// 400 for unknown ones.
#[derive(Clone, Debug)]
pub struct FakeCartel {
    state: Arc<Mutex<CartelState>>,
}

impl Default for FakeCartel {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(action: &str, name: &str) -> CartelError {
    CartelError::Status {
        action: action.to_owned(),
        status: 400,
        message: format!("no instance named {name}"),
    }
}

/// Builds an instance record as Cartel reports it.
#[must_use]
pub fn instance(name: &str, instance_id: &str) -> Instance {
    Instance {
        instance_id: instance_id.to_owned(),
        name: name.to_owned(),
        private_ip: String::from("10.0.0.10"),
        role: String::from("container-host"),
        instance_type: String::from("m5.large"),
        subnet: String::from("subnet-1"),
        vpc: String::from("vpc-1"),
        zone: String::from("us-east-1a"),
        launch_time: String::from("2024-01-01T00:00:00Z"),
        security_groups: vec![BASE_SECURITY_GROUP.to_owned()],
        ..Instance::default()
    }
}

impl FakeCartel {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CartelState {
                bastion: FAKE_BASTION.to_owned(),
                ..CartelState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CartelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an existing host.
    pub fn insert_instance(&self, record: Instance) {
        self.lock().instances.insert(record.name.clone(), record);
    }

    /// Removes a host as if it were destroyed out of band.
    pub fn remove_instance(&self, name: &str) {
        self.lock().instances.remove(name);
    }

    /// Returns the current record of a host.
    #[must_use]
    pub fn instance(&self, name: &str) -> Option<Instance> {
        self.lock().instances.get(name).cloned()
    }

    /// Makes the next create succeed with `instance_id`.
    pub fn push_create_ack(&self, instance_id: &str) {
        self.lock()
            .creates
            .push_back(ScriptedCreate::Ack(instance_id.to_owned()));
    }

    /// Makes the next create fail without registering a host.
    pub fn push_create_error(&self, error: CartelError) {
        self.lock().creates.push_back(ScriptedCreate::Fail(error));
    }

    /// Makes the next create fail even though the host gets registered under
    /// `instance_id`.
    pub fn push_create_error_registering(&self, error: CartelError, instance_id: &str) {
        self.lock()
            .creates
            .push_back(ScriptedCreate::FailButRegister(error, instance_id.to_owned()));
    }

    /// Holds every create answer back for `delay`. The host is registered
    /// as soon as the request arrives.
    pub fn delay_create(&self, delay: Duration) {
        self.lock().create_delay = Some(delay);
    }

    /// Queues deployment states; the last one keeps being reported.
    pub fn push_deployment_states(&self, states: impl IntoIterator<Item = DeploymentState>) {
        self.lock().deployment.extend(states.into_iter().map(Ok));
    }

    /// Queues a deployment state error.
    pub fn push_deployment_error(&self, error: CartelError) {
        self.lock().deployment.push_back(Err(error));
    }

    /// Makes every `add_tags` call fail.
    pub fn fail_add_tags(&self, error: CartelError) {
        self.lock().tag_failure = Some(error);
    }

    /// Makes every `destroy` call fail.
    pub fn fail_destroy(&self, error: CartelError) {
        self.lock().destroy_failure = Some(error);
    }

    /// Makes every group mutation fail.
    pub fn fail_group_changes(&self, error: CartelError) {
        self.lock().group_failure = Some(error);
    }

    /// Overrides the bastion host.
    pub fn set_bastion(&self, bastion: &str) {
        bastion.clone_into(&mut self.lock().bastion);
    }

    /// Returns every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<CartelCall> {
        self.lock().calls.clone()
    }

    /// Counts recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&CartelCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn create_now(&self, request: &CreateRequest) -> Result<CreateAck, CartelError> {
        let mut state = self.lock();
        state.calls.push(CartelCall::Create(request.name.clone()));
        state.created += 1;
        let scripted = state
            .creates
            .pop_front()
            .unwrap_or_else(|| ScriptedCreate::Ack(format!("i-{:02}", state.created)));
        let (outcome, registered) = match scripted {
            ScriptedCreate::Ack(id) => (
                Ok(CreateAck {
                    instance_id: id.clone(),
                    ip_address: String::from("10.0.0.10"),
                }),
                Some(id),
            ),
            ScriptedCreate::Fail(error) => (Err(error), None),
            ScriptedCreate::FailButRegister(error, id) => (Err(error), Some(id)),
        };
        if let Some(id) = registered {
            let mut record = instance(&request.name, &id);
            record.security_groups.extend(request.security_groups.iter().cloned());
            record.user_groups.clone_from(&request.user_groups);
            record.tags.clone_from(&request.tags);
            record.protection = request.protect;
            state.instances.insert(request.name.clone(), record);
        }
        outcome
    }

    fn deployment_now(&self, name: &str) -> Result<DeploymentState, CartelError> {
        let mut state = self.lock();
        state
            .calls
            .push(CartelCall::GetDeploymentState(name.to_owned()));
        if !state.instances.contains_key(name) {
            return Err(not_found("deployment_status", name));
        }
        let next = if state.deployment.len() > 1 {
            state.deployment.pop_front()
        } else {
            state.deployment.front().cloned()
        };
        next.unwrap_or(Ok(DeploymentState::Succeeded))
    }

    fn add_tags_now(
        &self,
        names: &[String],
        tags: &BTreeMap<String, String>,
    ) -> Result<(), CartelError> {
        let mut state = self.lock();
        state.calls.push(CartelCall::AddTags {
            names: names.to_vec(),
            tags: tags.clone(),
        });
        if let Some(error) = state.tag_failure.clone() {
            return Err(error);
        }
        for name in names {
            if let Some(record) = state.instances.get_mut(name) {
                for (key, value) in tags {
                    if value.is_empty() {
                        record.tags.remove(key);
                    } else {
                        record.tags.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn change_groups(
        &self,
        call: CartelCall,
        apply: impl FnOnce(&mut Instance),
        name: &str,
    ) -> Result<(), CartelError> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(error) = state.group_failure.clone() {
            return Err(error);
        }
        let record = state
            .instances
            .get_mut(name)
            .ok_or_else(|| not_found("instance_details", name))?;
        apply(record);
        Ok(())
    }
}

fn add_unique(target: &mut Vec<String>, groups: &[String]) {
    for group in groups {
        if !target.contains(group) {
            target.push(group.clone());
        }
    }
}

fn remove_all(target: &mut Vec<String>, groups: &[String]) {
    target.retain(|group| !groups.contains(group));
}

impl CartelClient for FakeCartel {
    fn create<'a>(&'a self, request: &'a CreateRequest) -> CartelFuture<'a, CreateAck> {
        let delay = self.lock().create_delay;
        let outcome = self.create_now(request);
        Box::pin(async move {
            if let Some(pause) = delay {
                tokio::time::sleep(pause).await;
            }
            outcome
        })
    }

    fn destroy<'a>(&'a self, name: &'a str) -> CartelFuture<'a, ()> {
        let result = {
            let mut state = self.lock();
            state.calls.push(CartelCall::Destroy(name.to_owned()));
            match state.destroy_failure.clone() {
                Some(error) => Err(error),
                None => {
                    state.instances.remove(name);
                    Ok(())
                }
            }
        };
        Box::pin(std::future::ready(result))
    }

    fn get_details<'a>(&'a self, name: &'a str) -> CartelFuture<'a, Instance> {
        let result = {
            let mut state = self.lock();
            state.calls.push(CartelCall::GetDetails(name.to_owned()));
            state
                .instances
                .get(name)
                .cloned()
                .ok_or_else(|| not_found("instance_details", name))
        };
        Box::pin(std::future::ready(result))
    }

    fn get_deployment_state<'a>(&'a self, name: &'a str) -> CartelFuture<'a, DeploymentState> {
        Box::pin(std::future::ready(self.deployment_now(name)))
    }

    fn get_all_instances(&self) -> CartelFuture<'_, Vec<Instance>> {
        let result = {
            let mut state = self.lock();
            state.calls.push(CartelCall::GetAllInstances);
            Ok(state.instances.values().cloned().collect())
        };
        Box::pin(std::future::ready(result))
    }

    fn add_tags<'a>(
        &'a self,
        names: &'a [String],
        tags: &'a BTreeMap<String, String>,
    ) -> CartelFuture<'a, ()> {
        Box::pin(std::future::ready(self.add_tags_now(names, tags)))
    }

    fn add_user_groups<'a>(&'a self, name: &'a str, groups: &'a [String]) -> CartelFuture<'a, ()> {
        let call = CartelCall::AddUserGroups(name.to_owned(), groups.to_vec());
        let result = self.change_groups(call, |record| add_unique(&mut record.user_groups, groups), name);
        Box::pin(std::future::ready(result))
    }

    fn remove_user_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()> {
        let call = CartelCall::RemoveUserGroups(name.to_owned(), groups.to_vec());
        let result = self.change_groups(call, |record| remove_all(&mut record.user_groups, groups), name);
        Box::pin(std::future::ready(result))
    }

    fn add_security_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()> {
        let call = CartelCall::AddSecurityGroups(name.to_owned(), groups.to_vec());
        let result = self.change_groups(
            call,
            |record| add_unique(&mut record.security_groups, groups),
            name,
        );
        Box::pin(std::future::ready(result))
    }

    fn remove_security_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()> {
        let call = CartelCall::RemoveSecurityGroups(name.to_owned(), groups.to_vec());
        let result = self.change_groups(
            call,
            |record| remove_all(&mut record.security_groups, groups),
            name,
        );
        Box::pin(std::future::ready(result))
    }

    fn set_protection<'a>(&'a self, name: &'a str, protect: bool) -> CartelFuture<'a, ()> {
        let result = {
            let mut state = self.lock();
            state
                .calls
                .push(CartelCall::SetProtection(name.to_owned(), protect));
            match state.instances.get_mut(name) {
                Some(record) => {
                    record.protection = protect;
                    Ok(())
                }
                None => Err(not_found("protect", name)),
            }
        };
        Box::pin(std::future::ready(result))
    }

    fn bastion_host(&self) -> String {
        self.lock().bastion.clone()
    }
}

/// Something that happened on a [`FakeSsh`] connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SshEvent {
    /// A session was opened.
    Connect {
        /// `user@host` of the target.
        destination: String,
        /// Bastion host, when one was used.
        bastion: Option<String>,
        /// Whether a private key was supplied.
        with_key: bool,
    },
    /// A file was written.
    WriteFile {
        /// Remote path.
        destination: String,
        /// Bytes received.
        content: Vec<u8>,
    },
    /// A command was run.
    Run(String),
    /// A session was dropped.
    Close,
}

#[derive(Debug, Default)]
struct SshState {
    events: Vec<SshEvent>,
    outputs: BTreeMap<String, VecDeque<Result<RemoteCommandOutput, SshError>>>,
    connect_failure: Option<SshError>,
    write_failures: BTreeSet<String>,
    stalled_writes: BTreeSet<String>,
}

/// In-memory [`SshConnector`].
///
/// Commands answer from per-command queues; an unscripted command exits 0
/// with empty output.
#[derive(Clone, Debug, Default)]
pub struct FakeSsh {
    state: Arc<Mutex<SshState>>,
}

/// Builds a completed command output.
#[must_use]
pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> RemoteCommandOutput {
    RemoteCommandOutput {
        exit_code: Some(exit_code),
        stdout: stdout.to_owned(),
        stderr: stderr.to_owned(),
    }
}

fn lock_ssh(state: &Mutex<SshState>) -> MutexGuard<'_, SshState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeSsh {
    /// Creates a fake with no scripted behaviour.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next run of `command`.
    pub fn script(&self, command: &str, result: Result<RemoteCommandOutput, SshError>) {
        lock_ssh(&self.state)
            .outputs
            .entry(command.to_owned())
            .or_default()
            .push_back(result);
    }

    /// Queues an exit status and stdout for the next run of `command`.
    pub fn script_exit(&self, command: &str, exit_code: i32, stdout: &str) {
        self.script(command, Ok(output(exit_code, stdout, "")));
    }

    /// Makes every connection attempt fail.
    pub fn fail_connect(&self, error: SshError) {
        lock_ssh(&self.state).connect_failure = Some(error);
    }

    /// Makes writes to `destination` fail.
    pub fn fail_write(&self, destination: &str) {
        lock_ssh(&self.state)
            .write_failures
            .insert(destination.to_owned());
    }

    /// Makes writes to `destination` never finish.
    pub fn stall_write(&self, destination: &str) {
        lock_ssh(&self.state)
            .stalled_writes
            .insert(destination.to_owned());
    }

    /// Returns every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<SshEvent> {
        lock_ssh(&self.state).events.clone()
    }

    /// Returns the commands run, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        lock_ssh(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                SshEvent::Run(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the files written as `(destination, content)` pairs.
    #[must_use]
    pub fn written(&self) -> Vec<(String, String)> {
        lock_ssh(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                SshEvent::WriteFile {
                    destination,
                    content,
                } => Some((
                    destination.clone(),
                    String::from_utf8_lossy(content).into_owned(),
                )),
                _ => None,
            })
            .collect()
    }
}

impl SshConnector for FakeSsh {
    type Session = FakeSshSession;

    fn connect<'a>(&'a self, config: &'a SshConfig) -> SshFuture<'a, Self::Session> {
        let result = {
            let mut state = lock_ssh(&self.state);
            state.events.push(SshEvent::Connect {
                destination: config.destination(),
                bastion: config.bastion.as_ref().map(|hop| hop.host.clone()),
                with_key: config.auth.private_key.is_some(),
            });
            match state.connect_failure.clone() {
                Some(error) => Err(error),
                None => Ok(FakeSshSession {
                    state: Arc::clone(&self.state),
                }),
            }
        };
        Box::pin(std::future::ready(result))
    }
}

/// Session handed out by [`FakeSsh`]. Dropping it records
/// [`SshEvent::Close`].
#[derive(Debug)]
pub struct FakeSshSession {
    state: Arc<Mutex<SshState>>,
}

impl SshSession for FakeSshSession {
    fn write_file<'a>(
        &'a self,
        source: &'a mut (dyn AsyncRead + Send + Unpin),
        _size: u64,
        destination: &'a str,
    ) -> SshFuture<'a, ()> {
        Box::pin(async move {
            let transfer_error = |message: String| SshError::Transfer {
                destination: destination.to_owned(),
                message,
            };
            let stalled = lock_ssh(&self.state).stalled_writes.contains(destination);
            if stalled {
                std::future::pending::<()>().await;
            }
            let mut content = Vec::new();
            source
                .read_to_end(&mut content)
                .await
                .map_err(|err| transfer_error(err.to_string()))?;

            let mut state = lock_ssh(&self.state);
            if state.write_failures.contains(destination) {
                return Err(transfer_error(String::from("permission denied")));
            }
            state.events.push(SshEvent::WriteFile {
                destination: destination.to_owned(),
                content,
            });
            Ok(())
        })
    }

    fn run<'a>(
        &'a self,
        command: &'a str,
        _timeout: Duration,
    ) -> SshFuture<'a, RemoteCommandOutput> {
        let result = {
            let mut state = lock_ssh(&self.state);
            state.events.push(SshEvent::Run(command.to_owned()));
            state
                .outputs
                .get_mut(command)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(output(0, "", "")))
        };
        Box::pin(std::future::ready(result))
    }
}

impl Drop for FakeSshSession {
    fn drop(&mut self) {
        lock_ssh(&self.state).events.push(SshEvent::Close);
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets `key` to `value` while holding a global mutex.
    pub async fn set_var(key: &str, value: &str) -> Self {
        let guard = ENV_LOCK.lock().await;
        let old = env::var_os(key);
        // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
        unsafe { env::set_var(key, value) };
        Self {
            previous: vec![(key.to_owned(), old)],
            _guard: guard,
        }
    }

    /// Removes `key` while holding a global mutex.
    pub async fn remove_var(key: &str) -> Self {
        let guard = ENV_LOCK.lock().await;
        let old = env::var_os(key);
        // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
        unsafe { env::remove_var(key) };
        Self {
            previous: vec![(key.to_owned(), old)],
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
