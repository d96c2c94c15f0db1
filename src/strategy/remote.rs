//! Ships the application to a fixed host over SSH.

use crate::config::DeploymentConfig;
use crate::package::Packager;
use crate::report::{Phase, Reporter, SharedReporter, progress};
use crate::runner::{CommandRunner, SharedRunner};
use crate::target::RemoteTarget;

use super::session::RemoteSession;
use super::{
    DeployError, DeploymentState, DeploymentStrategy, StrategyFuture, StrategyKind, Toolkit,
    announce, package_source, require_field, require_remote_path, source_dir,
};

/// Packages locally, then transfers, configures, and starts on `host`.
///
/// Configuration is idempotent: a host that already has Docker and the
/// compose tool only sees the probe.
#[derive(Clone, Debug)]
pub struct RemoteStrategy {
    toolkit: Toolkit,
    packager: Packager,
}

impl RemoteStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(runner: SharedRunner, reporter: SharedReporter) -> Self {
        Self {
            packager: Packager::new(runner.clone(), reporter.clone()),
            toolkit: Toolkit::new(runner, reporter),
        }
    }

    /// Returns the target recorded in `state`, resolving it from the
    /// configured host on first use.
    fn resolve_target(&self, state: &mut DeploymentState) -> Result<RemoteTarget, DeployError> {
        if let Some(target) = state.target.clone() {
            return Ok(target);
        }
        let host = require_field(self.kind(), state.config.host.as_deref(), "host")?;
        let target = RemoteTarget::from_config(&state.config, host);
        state.target = Some(target.clone());
        Ok(target)
    }
}

impl DeploymentStrategy for RemoteStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Remote
    }

    fn reporter(&self) -> &dyn Reporter {
        self.toolkit.reporter.as_ref()
    }

    fn runner(&self) -> &dyn CommandRunner {
        self.toolkit.runner.as_ref()
    }

    fn validate(&self, config: &DeploymentConfig) -> Result<(), DeployError> {
        let kind = self.kind();
        require_field(kind, config.host.as_deref(), "host")?;
        require_field(kind, config.username.as_deref(), "username")?;
        require_remote_path(kind, config)?;
        source_dir(kind, config).map(|_| ())
    }

    fn package<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Package);
            package_source(self.kind(), &self.packager, state).await
        })
    }

    fn transfer<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Transfer);
            let artifact = state.require_artifact(Phase::Transfer)?.clone();
            let target = self.resolve_target(state)?;
            RemoteSession::for_config(self.kind(), &self.toolkit, &target, &state.config)?
                .transfer(&artifact)
                .await?;
            state.artifact = None;
            Ok(())
        })
    }

    fn configure<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Configure);
            let target = self.resolve_target(state)?;
            let session =
                RemoteSession::for_config(self.kind(), &self.toolkit, &target, &state.config)?;
            if session.is_configured().await? {
                progress(
                    self.reporter(),
                    format!("{} already has docker and compose; skipping", target.host()),
                );
                return Ok(());
            }
            session.install().await
        })
    }

    fn start<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Start);
            let target = self.resolve_target(state)?;
            RemoteSession::for_config(self.kind(), &self.toolkit, &target, &state.config)?
                .start(state.config.force_rebuild)
                .await
        })
    }
}
