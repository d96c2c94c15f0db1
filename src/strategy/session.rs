//! Phase bodies shared by every strategy that works over SSH.

use std::borrow::Cow;
use std::time::Duration;

use shell_escape::unix::escape;

use crate::config::DeploymentConfig;
use crate::package::Artifact;
use crate::report::{Phase, progress};
use crate::runner::CommandLine;
use crate::target::RemoteTarget;

use super::{DeployError, StrategyKind, Toolkit, compose_up_args, require_remote_path};

const CONFIGURED_MARKER: &str = "configured";

/// Installs Docker from the upstream apt repository and the standalone
/// compose binary.
const INSTALL_STEPS: [&str; 8] = [
    "sudo apt-get update",
    "sudo apt-get -y install apt-transport-https ca-certificates curl gnupg lsb-release",
    "curl -fsSL \"https://download.docker.com/linux/$(. /etc/os-release && echo \"$ID\")/gpg\" | sudo gpg --dearmor --yes -o /usr/share/keyrings/docker.gpg",
    "echo \"deb [arch=$(dpkg --print-architecture) signed-by=/usr/share/keyrings/docker.gpg] https://download.docker.com/linux/$(. /etc/os-release && echo \"$ID\") $(lsb_release -cs) stable\" | sudo tee /etc/apt/sources.list.d/docker.list > /dev/null",
    "sudo apt-get update",
    "sudo apt-get -y install docker-ce docker-ce-cli containerd.io",
    "sudo curl -fL \"https://github.com/docker/compose/releases/latest/download/docker-compose-$(uname -s)-$(uname -m)\" -o /usr/local/bin/docker-compose",
    "sudo chmod +x /usr/local/bin/docker-compose",
];

fn quote(value: &str) -> String {
    escape(Cow::from(value)).into_owned()
}

/// Commands issued against one remote host during one deployment.
pub(crate) struct RemoteSession<'a> {
    toolkit: &'a Toolkit,
    target: &'a RemoteTarget,
    remote_path: &'a str,
    compose_bin: &'a str,
    timeout: Option<Duration>,
}

impl<'a> RemoteSession<'a> {
    /// Opens a session against `target` using the remote path, compose
    /// tool, and timeout from `config`.
    pub(crate) fn for_config(
        strategy: StrategyKind,
        toolkit: &'a Toolkit,
        target: &'a RemoteTarget,
        config: &'a DeploymentConfig,
    ) -> Result<Self, DeployError> {
        let remote_path = require_remote_path(strategy, config)?;
        Ok(Self {
            toolkit,
            target,
            remote_path,
            compose_bin: config.compose_bin.as_str(),
            timeout: config.command_timeout(),
        })
    }

    fn ssh(&self, script: &str) -> CommandLine {
        self.target.ssh_command(script).with_timeout(self.timeout)
    }

    fn deploy_dir(&self) -> String {
        quote(&format!("{}/deploy", self.remote_path.trim_end_matches('/')))
    }

    /// Replaces the contents of the remote directory with `artifact`.
    ///
    /// A compose stack already running from the directory is brought down
    /// before anything is deleted. The local archive and its run directory
    /// are removed once the remote copy has been unpacked.
    pub(crate) async fn transfer(&self, artifact: &Artifact) -> Result<(), DeployError> {
        let phase = Phase::Transfer;
        let dir = quote(self.remote_path);
        let compose = quote(self.compose_bin);
        let reporter = self.toolkit.reporter.as_ref();

        self.toolkit
            .run(phase, &self.ssh(&format!("mkdir -p {dir}")))
            .await?;

        let deploy_dir = self.deploy_dir();
        let running = self
            .toolkit
            .run(
                phase,
                &self.ssh(&format!(
                    "test -d {deploy_dir} && cd {deploy_dir} && {compose} ps -q 2>/dev/null || true"
                )),
            )
            .await?;
        if !running.stdout.trim().is_empty() {
            progress(reporter, format!("stopping the stack running in {}", self.remote_path));
            self.toolkit
                .run(phase, &self.ssh(&format!("cd {deploy_dir} && {compose} down")))
                .await?;
        }

        self.toolkit
            .run(phase, &self.ssh(&format!("find {dir} -mindepth 1 -delete")))
            .await?;

        progress(
            reporter,
            format!("copying {} to {}", artifact.file_name, self.target.host()),
        );
        let remote_archive = format!(
            "{}/{}",
            self.remote_path.trim_end_matches('/'),
            artifact.file_name
        );
        self.toolkit
            .run(
                phase,
                &self
                    .target
                    .scp_command(artifact.path.as_str(), &remote_archive)
                    .with_timeout(self.timeout),
            )
            .await?;

        let archive = quote(&artifact.file_name);
        self.toolkit
            .run(
                phase,
                &self.ssh(&format!(
                    "cd {dir} && tar -xzf {archive} && rm -f {archive}"
                )),
            )
            .await?;

        tokio::fs::remove_dir_all(&artifact.dir)
            .await
            .map_err(|err| DeployError::Cleanup {
                path: artifact.dir.clone(),
                message: err.to_string(),
            })
    }

    /// Probes for the container runtime and the compose tool.
    pub(crate) async fn is_configured(&self) -> Result<bool, DeployError> {
        let compose = quote(self.compose_bin);
        let probe = self.ssh(&format!(
            "if command -v docker >/dev/null 2>&1 && command -v {compose} >/dev/null 2>&1; \
             then echo {CONFIGURED_MARKER}; else echo missing; fi"
        ));
        let result = self.toolkit.run(Phase::Configure, &probe).await?;
        Ok(result.stdout.trim() == CONFIGURED_MARKER)
    }

    /// Installs Docker and compose, then lets the login user run containers.
    pub(crate) async fn install(&self) -> Result<(), DeployError> {
        let phase = Phase::Configure;
        progress(
            self.toolkit.reporter.as_ref(),
            format!("installing docker and compose on {}", self.target.host()),
        );
        for step in INSTALL_STEPS {
            self.toolkit.run(phase, &self.ssh(step)).await?;
        }
        let compose = quote(self.compose_bin);
        self.toolkit
            .run(phase, &self.ssh(&format!("{compose} --version")))
            .await?;
        let user = quote(self.target.username());
        self.toolkit
            .run(phase, &self.ssh(&format!("sudo usermod -aG docker {user}")))
            .await?;
        Ok(())
    }

    /// Runs `compose up` in the remote `deploy/` directory.
    pub(crate) async fn start(&self, force_rebuild: bool) -> Result<(), DeployError> {
        let script = format!(
            "cd {} && {} {}",
            self.deploy_dir(),
            quote(self.compose_bin),
            compose_up_args(force_rebuild).join(" ")
        );
        self.toolkit.run(Phase::Start, &self.ssh(&script)).await?;
        Ok(())
    }
}
