//! Command-line interface definitions for the `hsdp-ch` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use camino::Utf8PathBuf;
use clap::Parser;

/// Top-level CLI for the `hsdp-ch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "hsdp-ch",
    about = "Reconcile HSDP container hosts through Cartel and SSH",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create or adopt a host, provision it, and write its state.
    #[command(name = "create", about = "Create or adopt a host and provision it")]
    Create(SpecCommand),
    /// Refresh stored state from Cartel.
    #[command(name = "read", about = "Refresh stored host state from Cartel")]
    Read(StateCommand),
    /// Move an existing host to a new spec.
    #[command(name = "update", about = "Apply in-place changes to an existing host")]
    Update(SpecCommand),
    /// Destroy the host recorded in state.
    #[command(name = "delete", about = "Destroy the host recorded in state")]
    Delete(StateCommand),
    /// Run files and commands on an existing host once.
    #[command(name = "exec", about = "Copy files and run commands on an existing host")]
    Exec(SpecCommand),
}

/// Arguments for subcommands that take a desired spec.
#[derive(Debug, Parser)]
pub(crate) struct SpecCommand {
    /// JSON file holding the desired spec.
    #[arg(long, value_name = "PATH")]
    pub(crate) spec: Utf8PathBuf,
    /// JSON state file, read when present and rewritten afterwards.
    #[arg(long, value_name = "PATH")]
    pub(crate) state: Utf8PathBuf,
}

/// Arguments for subcommands that work from stored state alone.
#[derive(Debug, Parser)]
pub(crate) struct StateCommand {
    /// JSON state file, rewritten afterwards.
    #[arg(long, value_name = "PATH")]
    pub(crate) state: Utf8PathBuf,
}
