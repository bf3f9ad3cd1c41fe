//! Provider configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default request timeout for Cartel calls, in seconds.
pub const DEFAULT_CARTEL_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Provider settings derived from defaults, configuration files, and
/// `HSDP_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HSDP",
    discovery(
        app_name = "hsdp-ch",
        env_var = "HSDP_CONFIG_PATH",
        config_file_name = "hsdp-ch.toml",
        dotfile_name = ".hsdp-ch.toml",
        project_file_name = "hsdp-ch.toml"
    )
)]
pub struct ProviderConfig {
    /// Base URL of the Cartel API (for example `https://cartel.example.com`).
    pub cartel_host: String,
    /// Pre-issued token sent in the `Authorization` header.
    pub cartel_token: String,
    /// Bastion used to reach hosts over SSH when a spec does not name one.
    pub cartel_bastion_host: Option<String>,
    /// Per-request timeout for Cartel calls, in seconds.
    #[ortho_config(default = DEFAULT_CARTEL_REQUEST_TIMEOUT_SECS)]
    pub cartel_request_timeout_secs: u64,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Optional file receiving the debug log instead of stderr.
    pub debug_log: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProviderConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to hsdp-ch.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("hsdp-ch")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the environment variable and configuration key to set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.cartel_host,
            &FieldMetadata::new("Cartel API host", "HSDP_CARTEL_HOST", "cartel_host"),
        )?;
        Self::require_field(
            &self.cartel_token,
            &FieldMetadata::new("Cartel API token", "HSDP_CARTEL_TOKEN", "cartel_token"),
        )?;
        Self::require_field(
            &self.ssh_bin,
            &FieldMetadata::new("ssh executable", "HSDP_SSH_BIN", "ssh_bin"),
        )?;
        if self.cartel_request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "cartel_request_timeout_secs must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
