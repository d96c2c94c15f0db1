//! How to reach a deployment target over SSH.
//!
//! [`RemoteTarget`] is a value type. It renders `ssh` and `scp` command lines
//! and never runs them itself.

use std::borrow::Cow;
use std::net::IpAddr;

use shell_escape::unix::escape;

use crate::config::DeploymentConfig;
use crate::runner::CommandLine;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If the `HOME` environment variable is not set, the input is returned
/// unchanged.
///
/// # Examples
///
/// ```
/// # use harbour::target::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_ed25519"), format!("{home}/.ssh/id_ed25519"));
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Maps a provisioned instance address to the hostname used to connect.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostnamePattern {
    /// Connect to the address itself.
    RawAddress,
    /// Replace separators in the address with dashes and append `suffix`, so
    /// `51.15.1.2` becomes `51-15-1-2.<suffix>`.
    Dashed {
        /// Provider DNS zone appended to the dashed address.
        suffix: String,
    },
}

impl HostnamePattern {
    /// Renders the hostname for `address`.
    #[must_use]
    pub fn render(&self, address: IpAddr) -> String {
        match self {
            Self::RawAddress => address.to_string(),
            Self::Dashed { suffix } => {
                let dashed = address.to_string().replace(['.', ':'], "-");
                format!("{dashed}.{suffix}")
            }
        }
    }
}

/// Connection details for a remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteTarget {
    host: String,
    port: u16,
    username: String,
    credential_path: Option<String>,
    ssh_bin: String,
    scp_bin: String,
}

impl RemoteTarget {
    /// Describes `username@host:port` reachable with the default binaries and
    /// no explicit key.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            credential_path: None,
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
        }
    }

    /// Uses the private key at `path`. Blank paths are ignored.
    #[must_use]
    pub fn with_credential(mut self, path: Option<String>) -> Self {
        self.credential_path = path.filter(|value| !value.trim().is_empty());
        self
    }

    /// Overrides the `ssh` and `scp` executables.
    #[must_use]
    pub fn with_binaries(mut self, ssh_bin: impl Into<String>, scp_bin: impl Into<String>) -> Self {
        self.ssh_bin = ssh_bin.into();
        self.scp_bin = scp_bin.into();
        self
    }

    /// Builds a target for `host` using the connection settings in `config`.
    #[must_use]
    pub fn from_config(config: &DeploymentConfig, host: impl Into<String>) -> Self {
        Self::new(host, config.port, config.username.clone().unwrap_or_default())
            .with_credential(config.credential_path.clone())
            .with_binaries(config.ssh_bin.clone(), config.scp_bin.clone())
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// SSH port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Login user.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Key path as configured, before tilde expansion.
    #[must_use]
    pub fn credential_path(&self) -> Option<&str> {
        self.credential_path.as_deref()
    }

    /// Renders an `ssh` invocation that runs `script` on the host.
    ///
    /// `script` reaches the remote shell verbatim; callers escape any
    /// interpolated values.
    #[must_use]
    pub fn ssh_command(&self, script: &str) -> CommandLine {
        CommandLine::new(self.ssh_bin.as_str())
            .args(self.ssh_options("-p"))
            .args(["-o", "BatchMode=yes"])
            .arg(self.login())
            .arg(script)
    }

    /// Renders an `scp` invocation copying `local` to `remote` on the host.
    /// The command is tagged as a file transfer.
    ///
    /// `-O` selects the original SCP protocol, where the remote shell
    /// unquotes the escaped path. The SFTP mode used by default since
    /// OpenSSH 9.0 would take the quotes literally.
    #[must_use]
    pub fn scp_command(&self, local: &str, remote: &str) -> CommandLine {
        let remote_path = escape(Cow::from(remote));
        CommandLine::transfer(self.scp_bin.as_str())
            .args(self.ssh_options("-P"))
            .arg("-O")
            .arg(local)
            .arg(format!("{}:{remote_path}", self.login()))
    }

    /// Shell-like rendering of the `ssh` prefix, for log lines.
    #[must_use]
    pub fn connection_prefix(&self) -> String {
        let mut parts = vec![self.ssh_bin.clone()];
        parts.extend(
            self.ssh_options("-p")
                .iter()
                .map(|part| escape(Cow::from(part.as_str())).into_owned()),
        );
        parts.push(escape(Cow::from(self.login())).into_owned());
        parts.join(" ")
    }

    fn login(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    fn ssh_options(&self, port_flag: &str) -> Vec<String> {
        let mut args = vec![port_flag.to_owned(), self.port.to_string()];
        if let Some(path) = &self.credential_path {
            args.push(String::from("-i"));
            args.push(expand_tilde(path));
        }
        args.push(String::from("-o"));
        args.push(String::from("StrictHostKeyChecking=no"));
        args
    }
}
