//! File transfer and command execution over an open session.

use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::files::PlannedFile;
use crate::resource::Deadline;
use crate::ssh::{SshError, SshSession};

use super::ReconcileError;

/// Copies every planned file and applies its mode and ownership. Each copy
/// is bounded like a command. Failures become warnings; the remaining files
/// are still attempted.
pub(crate) async fn transfer_files<S>(
    session: &S,
    plan: &[PlannedFile],
    command_timeout: Duration,
    deadline: &Deadline,
    diagnostics: &mut Diagnostics,
) where
    S: SshSession + ?Sized,
{
    for file in plan {
        let (mut reader, size) = match file.open() {
            Ok(opened) => opened,
            Err(err) => {
                diagnostics.warn(
                    format!("failed to open file for {}", file.destination),
                    err.to_string(),
                );
                continue;
            }
        };

        let limit = deadline.cap(command_timeout);
        let copied = timeout(limit, session.write_file(&mut *reader, size, &file.destination))
            .await
            .unwrap_or_else(|_| {
                Err(SshError::Timeout {
                    command: format!("copy to {}", file.destination),
                    timeout_secs: limit.as_secs(),
                })
            });
        if let Err(err) = copied {
            diagnostics.warn(
                format!("failed to copy file to {}", file.destination),
                err.to_string(),
            );
            continue;
        }

        for command in file.post_copy_commands() {
            match session.run(&command, deadline.cap(command_timeout)).await {
                Ok(output) if output.is_success() => {}
                Ok(output) => diagnostics.warn(
                    format!("`{command}` failed"),
                    output.stderr.trim().to_owned(),
                ),
                Err(err) => diagnostics.warn(format!("`{command}` failed"), err.to_string()),
            }
        }
        debug!(destination = %file.destination, size, "file copied");
    }
}

/// Runs `commands` in order, stopping at the first non-zero exit.
///
/// `result` always holds the stdout of the last command that ran, including
/// a failing one.
pub(crate) async fn run_commands<S>(
    session: &S,
    host: &str,
    commands: &[String],
    command_timeout: Duration,
    deadline: &Deadline,
    result: &mut Option<String>,
) -> Result<(), ReconcileError>
where
    S: SshSession + ?Sized,
{
    for command in commands {
        let limit = deadline.cap(command_timeout);
        if limit.is_zero() {
            return Err(ReconcileError::Ssh {
                name: host.to_owned(),
                source: SshError::Timeout {
                    command: command.clone(),
                    timeout_secs: 0,
                },
            });
        }

        debug!(host, command, "running command");
        let output = session
            .run(command, limit)
            .await
            .map_err(|source| ReconcileError::Ssh {
                name: host.to_owned(),
                source,
            })?;
        *result = Some(output.stdout.clone());

        if !output.is_success() {
            return Err(ReconcileError::CommandFailure {
                command: command.clone(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
    }
    Ok(())
}
