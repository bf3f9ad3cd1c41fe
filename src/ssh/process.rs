//! SSH sessions backed by the system `ssh` client.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tokio::io::{AsyncRead, AsyncWriteExt, copy};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::args::{command_args, exit_args, master_args, write_file_command};
use super::{RemoteCommandOutput, SecretString, SshConfig, SshConnector, SshError, SshFuture, SshSession};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connector that shells out to the host operating system's `ssh`.
#[derive(Clone, Debug)]
pub struct ProcessSshConnector {
    ssh_bin: String,
    connect_timeout: Duration,
}

impl Default for ProcessSshConnector {
    fn default() -> Self {
        Self::new("ssh")
    }
}

impl ProcessSshConnector {
    /// Creates a connector using the given `ssh` executable.
    #[must_use]
    pub fn new(ssh_bin: impl Into<String>) -> Self {
        Self {
            ssh_bin: ssh_bin.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Overrides how long establishing the control master may take.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

fn key_material_error(err: &std::io::Error) -> SshError {
    SshError::KeyMaterial {
        message: err.to_string(),
    }
}

fn utf8(path: &std::path::Path) -> Result<Utf8PathBuf, SshError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|raw| SshError::KeyMaterial {
        message: format!("temporary path is not UTF-8: {}", raw.display()),
    })
}

fn write_key(root: &Utf8Path, key: &SecretString) -> Result<NamedTempFile, SshError> {
    // NamedTempFile is created with mode 0600, which ssh insists on.
    let mut file = tempfile::Builder::new()
        .prefix("id-")
        .tempfile_in(root)
        .map_err(|err| key_material_error(&err))?;
    let material = key.expose();
    file.write_all(material.as_bytes())
        .map_err(|err| key_material_error(&err))?;
    if !material.ends_with('\n') {
        file.write_all(b"\n")
            .map_err(|err| key_material_error(&err))?;
    }
    file.flush().map_err(|err| key_material_error(&err))?;
    Ok(file)
}

impl SshConnector for ProcessSshConnector {
    type Session = ProcessSshSession;

    fn connect<'a>(&'a self, config: &'a SshConfig) -> SshFuture<'a, Self::Session> {
        Box::pin(async move {
            let workdir = tempfile::Builder::new()
                .prefix("hsdp-ch-")
                .tempdir()
                .map_err(|err| key_material_error(&err))?;
            let root = utf8(workdir.path())?;
            let key = config
                .auth
                .private_key
                .as_ref()
                .map(|secret| write_key(&root, secret))
                .transpose()?;
            let identity = key.as_ref().map(|file| utf8(file.path())).transpose()?;
            let control_path = root.join("ctl");
            let log_path = root.join("ssh.log");

            let args = master_args(
                config,
                identity.as_deref(),
                &control_path,
                &log_path,
                &self.ssh_bin,
            );
            let destination = config.destination();
            debug!(%destination, bastion = ?config.bastion.as_ref().map(|hop| hop.host.as_str()), "opening ssh control master");

            let mut command = Command::new(&self.ssh_bin);
            command
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);
            let status = timeout(self.connect_timeout, command.status())
                .await
                .map_err(|_| SshError::Connect {
                    destination: destination.clone(),
                    message: format!(
                        "no connection within {}s",
                        self.connect_timeout.as_secs()
                    ),
                })?
                .map_err(|err| SshError::Spawn {
                    program: self.ssh_bin.clone(),
                    message: err.to_string(),
                })?;

            if !status.success() {
                let log = tokio::fs::read_to_string(log_path.as_std_path())
                    .await
                    .unwrap_or_default();
                let message = if log.trim().is_empty() {
                    format!("ssh exited with {status}")
                } else {
                    log.trim().to_owned()
                };
                return Err(SshError::Connect {
                    destination,
                    message,
                });
            }

            Ok(ProcessSshSession {
                ssh_bin: self.ssh_bin.clone(),
                config: config.clone(),
                control_path,
                key,
                workdir: Some(workdir),
            })
        })
    }
}

/// Session multiplexed over an OpenSSH control master.
///
/// Dropping the session stops the master and deletes the temporary
/// directory holding the control socket and key material.
#[derive(Debug)]
pub struct ProcessSshSession {
    ssh_bin: String,
    config: SshConfig,
    control_path: Utf8PathBuf,
    key: Option<NamedTempFile>,
    workdir: Option<TempDir>,
}

impl SshSession for ProcessSshSession {
    fn write_file<'a>(
        &'a self,
        source: &'a mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        destination: &'a str,
    ) -> SshFuture<'a, ()> {
        Box::pin(async move {
            let transfer_error = |message: String| SshError::Transfer {
                destination: destination.to_owned(),
                message,
            };

            let remote = write_file_command(destination);
            let args = command_args(&self.config, &self.control_path, &remote);
            let mut child = Command::new(&self.ssh_bin)
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|err| SshError::Spawn {
                    program: self.ssh_bin.clone(),
                    message: err.to_string(),
                })?;

            let Some(mut stdin) = child.stdin.take() else {
                return Err(transfer_error(String::from("ssh stdin unavailable")));
            };
            let sent = copy(source, &mut stdin)
                .await
                .map_err(|err| transfer_error(err.to_string()))?;
            stdin
                .shutdown()
                .await
                .map_err(|err| transfer_error(err.to_string()))?;
            drop(stdin);

            let output = child
                .wait_with_output()
                .await
                .map_err(|err| transfer_error(err.to_string()))?;
            if !output.status.success() {
                return Err(transfer_error(
                    String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                ));
            }
            if sent != size {
                return Err(transfer_error(format!(
                    "expected {size} bytes but sent {sent}"
                )));
            }
            debug!(destination, bytes = sent, "file written");
            Ok(())
        })
    }

    fn run<'a>(
        &'a self,
        command: &'a str,
        limit: Duration,
    ) -> SshFuture<'a, RemoteCommandOutput> {
        Box::pin(async move {
            let args = command_args(&self.config, &self.control_path, command);
            let child = Command::new(&self.ssh_bin)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|err| SshError::Spawn {
                    program: self.ssh_bin.clone(),
                    message: err.to_string(),
                })?;

            let output = timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| SshError::Timeout {
                    command: command.to_owned(),
                    timeout_secs: limit.as_secs(),
                })?
                .map_err(|err| SshError::Spawn {
                    program: self.ssh_bin.clone(),
                    message: err.to_string(),
                })?;

            Ok(RemoteCommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

impl Drop for ProcessSshSession {
    fn drop(&mut self) {
        let args = exit_args(&self.config, &self.control_path);
        let ssh_bin = self.ssh_bin.clone();
        let destination = self.config.destination();
        let key = self.key.take();
        let workdir = self.workdir.take();
        // The socket directory and key must outlive the exit request.
        std::thread::spawn(move || {
            let closed = std::process::Command::new(&ssh_bin)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            if let Err(err) = closed {
                debug!(%destination, error = %err, "failed to stop ssh control master");
            }
            drop(key);
            drop(workdir);
        });
    }
}
