//! Binary entry point for the `hsdp-ch` CLI.
//!
//! Each subcommand loads a JSON spec and/or state file, runs one lifecycle
//! operation, and writes the resulting state back even when the operation
//! failed part way, so a later run sees what actually happened.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::process;
use std::sync::Mutex;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::Parser;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use hsdp_container_host::{
    CartelClient, ConfigError, Diagnostics, ExecProvisioner, ExecSpec, ExecState, HostReconciler,
    HostSpec, HostState, HttpCartelClient, ProcessSshConnector, ProviderConfig, ReconcileError,
    SshConnector,
};

mod cli;

use cli::{Cli, SpecCommand, StateCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = ProviderConfig::load_without_cli_args()?;
    install_tracing(config.debug_log.as_deref())?;

    let mut diagnostics = Diagnostics::new();
    let ssh = ProcessSshConnector::new(config.ssh_bin.clone());
    let outcome = match cli {
        Cli::Exec(args) => {
            let provisioner = ExecProvisioner::new(ssh, config.cartel_bastion_host.clone());
            exec_resource(&provisioner, &args, &mut diagnostics).await
        }
        Cli::Create(args) => {
            let reconciler = host_reconciler(&config, ssh)?;
            create_host(&reconciler, &args, &mut diagnostics).await
        }
        Cli::Read(args) => {
            let reconciler = host_reconciler(&config, ssh)?;
            read_host(&reconciler, &args, &mut diagnostics).await
        }
        Cli::Update(args) => {
            let reconciler = host_reconciler(&config, ssh)?;
            update_host(&reconciler, &args, &mut diagnostics).await
        }
        Cli::Delete(args) => {
            let reconciler = host_reconciler(&config, ssh)?;
            delete_host(&reconciler, &args, &mut diagnostics).await
        }
    };

    write_diagnostics(io::stderr(), &diagnostics);
    outcome
}

fn host_reconciler(
    config: &ProviderConfig,
    ssh: ProcessSshConnector,
) -> Result<HostReconciler<HttpCartelClient, ProcessSshConnector>, CliError> {
    config.validate()?;
    let client = HttpCartelClient::new(config)?;
    Ok(HostReconciler::new(client, ssh))
}

fn install_tracing(debug_log: Option<&str>) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = match debug_log.filter(|path| !path.trim().is_empty()) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| CliError::Logging(format!("{path}: {err}")))?;
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("debug"))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init(),
    };
    installed.map_err(|err| CliError::Logging(err.to_string()))
}

async fn create_host<C, S>(
    reconciler: &HostReconciler<C, S>,
    args: &SpecCommand,
    diagnostics: &mut Diagnostics,
) -> Result<(), CliError>
where
    C: CartelClient,
    S: SshConnector,
{
    let spec: HostSpec = load_json(&args.spec)?;
    let mut state = HostState::new(spec);
    let outcome = reconciler.create(&mut state, diagnostics).await;
    store_json(&args.state, &state)?;
    outcome.map_err(CliError::from)
}

async fn read_host<C, S>(
    reconciler: &HostReconciler<C, S>,
    args: &StateCommand,
    diagnostics: &mut Diagnostics,
) -> Result<(), CliError>
where
    C: CartelClient,
    S: SshConnector,
{
    let mut state: HostState = load_json(&args.state)?;
    let outcome = reconciler.read(&mut state, diagnostics).await;
    store_json(&args.state, &state)?;
    outcome.map_err(CliError::from)
}

async fn update_host<C, S>(
    reconciler: &HostReconciler<C, S>,
    args: &SpecCommand,
    diagnostics: &mut Diagnostics,
) -> Result<(), CliError>
where
    C: CartelClient,
    S: SshConnector,
{
    let desired: HostSpec = load_json(&args.spec)?;
    let mut state: HostState = load_json(&args.state)?;
    let outcome = reconciler.update(&mut state, desired, diagnostics).await;
    store_json(&args.state, &state)?;
    outcome.map_err(CliError::from)
}

async fn delete_host<C, S>(
    reconciler: &HostReconciler<C, S>,
    args: &StateCommand,
    diagnostics: &mut Diagnostics,
) -> Result<(), CliError>
where
    C: CartelClient,
    S: SshConnector,
{
    let mut state: HostState = load_json(&args.state)?;
    let outcome = reconciler.delete(&mut state, diagnostics).await;
    store_json(&args.state, &state)?;
    outcome.map_err(CliError::from)
}

/// Runs the exec resource. Stored state with unchanged triggers is updated
/// in place; anything else runs the provisioner from scratch.
async fn exec_resource<S: SshConnector>(
    provisioner: &ExecProvisioner<S>,
    args: &SpecCommand,
    diagnostics: &mut Diagnostics,
) -> Result<(), CliError> {
    let desired: ExecSpec = load_json(&args.spec)?;
    let stored: Option<ExecState> = load_optional_json(&args.state)?;

    let mut state = match stored {
        Some(mut existing)
            if existing.id.is_some() && !existing.spec.requires_replacement(&desired) =>
        {
            provisioner.update(&mut existing, desired)?;
            return store_json(&args.state, &existing);
        }
        _ => ExecState::new(desired),
    };
    let outcome = provisioner.create(&mut state, diagnostics).await;
    store_json(&args.state, &state)?;
    outcome.map_err(CliError::from)
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), CliError> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| CliError::Read {
        path: path.to_string(),
        message: String::from("path is missing a file name"),
    })?;
    Ok((parent, file_name))
}

fn read_optional(path: &Utf8Path) -> Result<Option<String>, CliError> {
    let (parent, file_name) = split_path(path)?;
    let io_error = |err: io::Error| CliError::Read {
        path: path.to_string(),
        message: err.to_string(),
    };
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(err)),
    };
    match dir.read_to_string(file_name) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error(err)),
    }
}

fn parse_json<T: DeserializeOwned>(path: &Utf8Path, contents: &str) -> Result<T, CliError> {
    serde_json::from_str(contents).map_err(|err| CliError::Parse {
        path: path.to_string(),
        message: err.to_string(),
    })
}

fn load_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, CliError> {
    let contents = read_optional(path)?.ok_or_else(|| CliError::Read {
        path: path.to_string(),
        message: String::from("file not found"),
    })?;
    parse_json(path, &contents)
}

fn load_optional_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, CliError> {
    read_optional(path)?
        .map(|contents| parse_json(path, &contents))
        .transpose()
}

fn store_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), CliError> {
    let failed = |message: String| CliError::Write {
        path: path.to_string(),
        message,
    };
    let mut rendered =
        serde_json::to_string_pretty(value).map_err(|err| failed(err.to_string()))?;
    rendered.push('\n');
    let (parent, file_name) = split_path(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| failed(err.to_string()))?;
    dir.write(file_name, rendered)
        .map_err(|err| failed(err.to_string()))
}

fn write_diagnostics(mut target: impl Write, diagnostics: &Diagnostics) {
    for diagnostic in diagnostics {
        writeln!(target, "{diagnostic}").ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod main_tests;
