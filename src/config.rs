//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::avh::DEFAULT_ENDPOINT;

/// Default acceptance-test budget, in seconds.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 30;
/// Default whole-run budget, in seconds.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 120;
/// Default budget for each boot wait, in seconds.
pub const DEFAULT_BOOT_TIMEOUT_SECS: u64 = 120;
/// Default interval between state polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
/// Default prefix of generated instance names.
pub const DEFAULT_INSTANCE_NAME_PREFIX: &str = "GHA";

/// Runner settings merged from defaults, `avh.toml` and `AVH_*` environment
/// variables. Command-line flags are applied on top by the binary.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "AVH",
    discovery(
        app_name = "avh",
        env_var = "AVH_CONFIG_PATH",
        config_file_name = "avh.toml",
        dotfile_name = ".avh.toml",
        project_file_name = "avh.toml"
    )
)]
pub struct AvhConfig {
    /// Root of the AVH REST API.
    #[ortho_config(default = DEFAULT_ENDPOINT.to_owned())]
    pub endpoint: String,
    /// Budget for the acceptance test, in seconds.
    #[ortho_config(default = DEFAULT_TEST_TIMEOUT_SECS)]
    pub test_timeout_secs: u64,
    /// Budget for the whole provisioning run, in seconds.
    #[ortho_config(default = DEFAULT_RUN_TIMEOUT_SECS)]
    pub run_timeout_secs: u64,
    /// Budget for each wait on the `on` state, in seconds.
    #[ortho_config(default = DEFAULT_BOOT_TIMEOUT_SECS)]
    pub boot_timeout_secs: u64,
    /// Interval between instance state polls, in milliseconds.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// Prefix of generated instance names.
    #[ortho_config(default = DEFAULT_INSTANCE_NAME_PREFIX.to_owned())]
    pub instance_name_prefix: String,
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

    fn guidance(&self) -> String {
        format!("set {} or add {} to avh.toml", self.env_var, self.toml_key)
    }
}

impl AvhConfig {
    fn require_text(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: {}",
                metadata.description,
                metadata.guidance()
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
        Self::load_from_iter([std::ffi::OsString::from("avh-runner")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that set each field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required value is empty
    /// and [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = FieldMetadata::new("AVH API endpoint", "AVH_ENDPOINT", "endpoint");
        Self::require_text(&self.endpoint, &endpoint)?;
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "{} must be an http(s) URL, got `{}`: {}",
                endpoint.description,
                self.endpoint,
                endpoint.guidance()
            )));
        }
        Self::require_text(
            &self.instance_name_prefix,
            &FieldMetadata::new(
                "instance name prefix",
                "AVH_INSTANCE_NAME_PREFIX",
                "instance_name_prefix",
            ),
        )?;
        Self::require_positive(
            self.test_timeout_secs,
            &FieldMetadata::new(
                "test timeout",
                "AVH_TEST_TIMEOUT_SECS",
                "test_timeout_secs",
            ),
        )?;
        Self::require_positive(
            self.run_timeout_secs,
            &FieldMetadata::new("run timeout", "AVH_RUN_TIMEOUT_SECS", "run_timeout_secs"),
        )?;
        Self::require_positive(
            self.boot_timeout_secs,
            &FieldMetadata::new(
                "boot timeout",
                "AVH_BOOT_TIMEOUT_SECS",
                "boot_timeout_secs",
            ),
        )?;
        Self::require_positive(
            self.poll_interval_ms,
            &FieldMetadata::new("poll interval", "AVH_POLL_INTERVAL_MS", "poll_interval_ms"),
        )?;
        Ok(())
    }

    /// Acceptance-test budget.
    #[must_use]
    pub const fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Whole-run budget.
    #[must_use]
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Budget for each boot wait.
    #[must_use]
    pub const fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    /// Interval between state polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
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
