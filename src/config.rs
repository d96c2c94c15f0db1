//! Deployment configuration loaded via `ortho-config`.
//!
//! A single flat [`DeploymentConfig`] feeds every strategy. Which fields are
//! required depends on the strategy; each one checks its own list with
//! [`DeploymentConfig::require`] before issuing any command.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::package::PackageOptions;
use crate::target::DEFAULT_SSH_PORT;

/// Default compose executable.
pub const DEFAULT_COMPOSE_BIN: &str = "docker-compose";

/// Default build tool used by the packaging pre-build.
pub const DEFAULT_BUILD_BIN: &str = "npm";

/// Service removed from the compose manifest after a local pre-build.
pub const DEFAULT_PREBUILT_SERVICE: &str = "frontend";

/// Settings for one deployment, merged from defaults, `harbour.toml`, and
/// `HARBOUR_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HARBOUR",
    discovery(
        app_name = "harbour",
        env_var = "HARBOUR_CONFIG_PATH",
        config_file_name = "harbour.toml",
        dotfile_name = ".harbour.toml",
        project_file_name = "harbour.toml"
    )
)]
pub struct DeploymentConfig {
    /// Address of a fixed remote host.
    pub host: Option<String>,
    /// SSH port on the target.
    #[ortho_config(default = DEFAULT_SSH_PORT)]
    pub port: u16,
    /// Remote login user.
    pub username: Option<String>,
    /// Private key used for SSH and SCP. Supports `~/` expansion.
    pub credential_path: Option<String>,
    /// Local application directory containing `deploy/`.
    pub source_path: Option<String>,
    /// Directory on the target that receives the application.
    pub remote_path: Option<String>,
    /// Run the local build and drop the prebuilt service before packaging.
    #[ortho_config(default = false)]
    pub force_rebuild: bool,
    /// Image identifier for new cloud instances. Must be a Debian or Ubuntu
    /// image; configuration installs Docker with apt.
    pub image_id: Option<String>,
    /// Commercial type of new cloud instances.
    pub instance_type: Option<String>,
    /// Name given to new cloud instances.
    pub instance_name: Option<String>,
    /// Security group attached to new cloud instances.
    pub security_group_id: Option<String>,
    /// Provider key pair label recorded on new cloud instances.
    pub key_pair_name: Option<String>,
    /// Provider zone, for example `fr-par-1`.
    pub region: Option<String>,
    /// Provider access key. Kept for auditing; the API authenticates with the
    /// secret key alone.
    pub access_key_id: Option<String>,
    /// Provider secret key.
    pub secret_access_key: Option<String>,
    /// Provider project used for billing and ownership.
    pub project_id: Option<String>,
    /// Terminate a half-provisioned instance when provisioning fails.
    #[ortho_config(default = false)]
    pub teardown_on_failure: bool,
    /// DNS zone used to build instance hostnames. Empty connects to the raw
    /// address.
    pub public_hostname_suffix: Option<String>,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Compose executable on the target.
    #[ortho_config(default = DEFAULT_COMPOSE_BIN.to_owned())]
    pub compose_bin: String,
    /// Build tool run by the packaging pre-build.
    #[ortho_config(default = DEFAULT_BUILD_BIN.to_owned())]
    pub build_bin: String,
    /// Compose service dropped after a local pre-build.
    #[ortho_config(default = DEFAULT_PREBUILT_SERVICE.to_owned())]
    pub prebuilt_service: String,
    /// Local directory that receives the packaged archive.
    pub staging_dir: Option<String>,
    /// Per-command timeout in seconds. Unset waits indefinitely.
    pub command_timeout_secs: Option<u64>,
}

/// Raised when a strategy-required field is absent or blank.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error(
    "missing {field}: set HARBOUR_{env_suffix} or add {field} to harbour.toml",
    env_suffix = field.to_uppercase()
)]
pub struct MissingField {
    /// Configuration field that failed validation.
    pub field: &'static str,
}

/// Errors raised when loading the configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl DeploymentConfig {
    /// Configuration with every default applied and nothing else set.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            host: None,
            port: DEFAULT_SSH_PORT,
            username: None,
            credential_path: None,
            source_path: None,
            remote_path: None,
            force_rebuild: false,
            image_id: None,
            instance_type: None,
            instance_name: None,
            security_group_id: None,
            key_pair_name: None,
            region: None,
            access_key_id: None,
            secret_access_key: None,
            project_id: None,
            teardown_on_failure: false,
            public_hostname_suffix: None,
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            compose_bin: DEFAULT_COMPOSE_BIN.to_owned(),
            build_bin: DEFAULT_BUILD_BIN.to_owned(),
            prebuilt_service: DEFAULT_PREBUILT_SERVICE.to_owned(),
            staging_dir: None,
            command_timeout_secs: None,
        }
    }

    /// Returns the trimmed value of a required field.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] when `value` is absent or whitespace only.
    pub fn require<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, MissingField> {
        match value.map(str::trim) {
            Some(trimmed) if !trimmed.is_empty() => Ok(trimmed),
            _ => Err(MissingField { field }),
        }
    }

    /// Timeout applied to every external command.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Directory that receives packaged archives. Defaults to `harbour`
    /// under the system temporary directory.
    #[must_use]
    pub fn staging_dir(&self) -> Utf8PathBuf {
        match self.staging_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => Utf8PathBuf::from(dir),
            _ => Utf8PathBuf::from(std::env::temp_dir().to_string_lossy().into_owned())
                .join("harbour"),
        }
    }

    /// Packaging options derived from this configuration.
    #[must_use]
    pub fn package_options(&self) -> PackageOptions {
        PackageOptions {
            force_rebuild: self.force_rebuild,
            build_bin: self.build_bin.clone(),
            prebuilt_service: self.prebuilt_service.clone(),
            staging_dir: self.staging_dir(),
            timeout: self.command_timeout(),
        }
    }

    /// Loads configuration from defaults, configuration files, and
    /// environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("harbour")])
            .map_err(|err| ConfigLoadError::Parse(err.to_string()))
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}
