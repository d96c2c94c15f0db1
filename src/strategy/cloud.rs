//! Provisions a fresh cloud instance and deploys to it over SSH.

use crate::config::DeploymentConfig;
use crate::package::Packager;
use crate::provision::{ProvisionRequest, ProvisioningBackend, TeardownPolicy, provision};
use crate::report::{Phase, Reporter, SharedReporter, progress};
use crate::runner::{CommandRunner, SharedRunner};
use crate::target::RemoteTarget;

use super::session::RemoteSession;
use super::{
    DeployError, DeploymentState, DeploymentStrategy, StrategyFuture, StrategyKind, Toolkit,
    announce, package_source, require_field, require_remote_path, source_dir,
};

/// Runs all five phases against an instance created by `B`.
///
/// A new instance never has the container tooling, so configuration always
/// installs it without probing.
pub struct CloudStrategy<B> {
    toolkit: Toolkit,
    packager: Packager,
    backend: B,
}

impl<B: std::fmt::Debug> std::fmt::Debug for CloudStrategy<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStrategy")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl<B: ProvisioningBackend> CloudStrategy<B> {
    /// Creates the strategy around `backend`.
    #[must_use]
    pub fn new(backend: B, runner: SharedRunner, reporter: SharedReporter) -> Self {
        Self {
            packager: Packager::new(runner.clone(), reporter.clone()),
            toolkit: Toolkit::new(runner, reporter),
            backend,
        }
    }

    /// Provider backend used for the provision phase.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    fn session<'a>(
        &'a self,
        phase: Phase,
        state: &'a DeploymentState,
    ) -> Result<RemoteSession<'a>, DeployError> {
        let target = state.require_target(phase)?;
        RemoteSession::for_config(self.kind(), &self.toolkit, target, &state.config)
    }
}

impl<B: ProvisioningBackend> DeploymentStrategy for CloudStrategy<B> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cloud
    }

    fn reporter(&self) -> &dyn Reporter {
        self.toolkit.reporter.as_ref()
    }

    fn runner(&self) -> &dyn CommandRunner {
        self.toolkit.runner.as_ref()
    }

    fn validate(&self, config: &DeploymentConfig) -> Result<(), DeployError> {
        let kind = self.kind();
        ProvisionRequest::from_config(config)
            .map_err(|source| DeployError::InvalidConfig { strategy: kind, source })?;
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

    fn provision<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Provision);
            let request = ProvisionRequest::from_config(&state.config).map_err(|source| {
                DeployError::InvalidConfig {
                    strategy: self.kind(),
                    source,
                }
            })?;
            let policy = TeardownPolicy::from_flag(state.config.teardown_on_failure);
            let provisioned = provision(&self.backend, &request, policy, self.reporter()).await?;

            let host = self
                .backend
                .hostname_pattern()
                .render(provisioned.public_address);
            progress(self.reporter(), format!("connecting to {host}"));
            state.target = Some(RemoteTarget::from_config(&state.config, host));
            state.provisioned = Some(provisioned);
            Ok(())
        })
    }

    fn transfer<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Transfer);
            let artifact = state.require_artifact(Phase::Transfer)?.clone();
            self.session(Phase::Transfer, state)?
                .transfer(&artifact)
                .await?;
            state.artifact = None;
            Ok(())
        })
    }

    fn configure<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Configure);
            self.session(Phase::Configure, state)?.install().await
        })
    }

    fn start<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Start);
            self.session(Phase::Start, state)?
                .start(state.config.force_rebuild)
                .await
        })
    }
}
