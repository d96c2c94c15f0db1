//! Deployment strategies and the five-phase pipeline they share.
//!
//! Every strategy runs the same ordered phases: package, provision,
//! transfer, configure, and start. A strategy implements the phases that
//! apply to it; the rest fall back to trait defaults that report the skip
//! and succeed. [`DeploymentStrategy::deploy`] validates the configuration
//! before any phase runs, so a missing field never leaves a half-finished
//! deployment behind.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::{DeploymentConfig, MissingField};
use crate::package::{Artifact, PackageError, Packager};
use crate::provision::{ProvisionedTarget, ProvisioningError};
use crate::report::{DeployEvent, Phase, Reporter, SharedReporter};
use crate::runner::{
    CommandError, CommandLine, CommandResult, CommandRunner, ExecutionError, SharedRunner,
};
use crate::target::RemoteTarget;

mod cloud;
mod local;
mod remote;
mod session;

pub use cloud::CloudStrategy;
pub use local::LocalStrategy;
pub use remote::RemoteStrategy;

/// Future returned by strategy phases.
pub type StrategyFuture<'a, T = ()> = Pin<Box<dyn Future<Output = Result<T, DeployError>> + Send + 'a>>;

/// Identifies a deployment strategy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StrategyKind {
    /// Run the compose stack on this machine.
    Local,
    /// Ship to a fixed host over SSH.
    Remote,
    /// Provision a cloud instance, then ship to it over SSH.
    Cloud,
}

impl StrategyKind {
    /// Lower-case name used in events and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values carried from one phase to the next.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeploymentState {
    /// Configuration the pipeline was started with.
    pub config: DeploymentConfig,
    /// Archive produced by the package phase.
    pub artifact: Option<Artifact>,
    /// Instance produced by the provision phase.
    pub provisioned: Option<ProvisionedTarget>,
    /// Host the transfer, configure, and start phases talk to.
    pub target: Option<RemoteTarget>,
}

impl DeploymentState {
    /// Creates an empty state for `config`.
    #[must_use]
    pub const fn new(config: DeploymentConfig) -> Self {
        Self {
            config,
            artifact: None,
            provisioned: None,
            target: None,
        }
    }

    /// Returns the artifact or a [`DeployError::PhaseOrder`] for `phase`.
    ///
    /// # Errors
    ///
    /// Fails when the package phase has not produced an archive yet.
    pub fn require_artifact(&self, phase: Phase) -> Result<&Artifact, DeployError> {
        self.artifact.as_ref().ok_or(DeployError::PhaseOrder {
            phase,
            requirement: "a packaged archive",
        })
    }

    /// Returns the target or a [`DeployError::PhaseOrder`] for `phase`.
    ///
    /// # Errors
    ///
    /// Fails when no target host has been resolved yet.
    pub fn require_target(&self, phase: Phase) -> Result<&RemoteTarget, DeployError> {
        self.target.as_ref().ok_or(DeployError::PhaseOrder {
            phase,
            requirement: "a target host",
        })
    }
}

/// Errors raised by strategies and the [`crate::deployer::Deployer`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeployError {
    /// Raised when the deployer is used before a strategy is set.
    #[error("no deployment strategy configured")]
    NotConfigured,
    /// Raised when a field the strategy needs is missing.
    #[error("{strategy} deployment is not configured: {source}")]
    InvalidConfig {
        /// Strategy that rejected the configuration.
        strategy: StrategyKind,
        /// Missing field.
        #[source]
        source: MissingField,
    },
    /// Raised when `remote_path` names a directory the transfer must never
    /// clear, such as the filesystem root or the login user's home.
    #[error(
        "{strategy} deployment refuses remote_path {path:?}: transfer clears it, so point it \
         at a dedicated directory"
    )]
    UnsafeRemotePath {
        /// Strategy that rejected the configuration.
        strategy: StrategyKind,
        /// Configured value.
        path: String,
    },
    /// Raised when the source directory does not exist.
    #[error("source directory not found: {path}")]
    MissingSource {
        /// Configured source path.
        path: Utf8PathBuf,
    },
    /// Raised when a phase runs before the phase it depends on.
    #[error("{phase} phase needs {requirement}; run the earlier phases first")]
    PhaseOrder {
        /// Phase that could not run.
        phase: Phase,
        /// What the phase was missing.
        requirement: &'static str,
    },
    /// Raised when packaging fails.
    #[error(transparent)]
    Package(#[from] PackageError),
    /// Raised when provisioning fails.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    /// Raised when an external command fails during a phase.
    #[error("{phase} phase failed: {source}")]
    Command {
        /// Phase that issued the command.
        phase: Phase,
        /// Runner failure.
        #[source]
        source: CommandError,
    },
    /// Raised when a command passed straight through the strategy fails.
    #[error("command failed: {source}")]
    Execute {
        /// Runner failure.
        #[source]
        source: CommandError,
    },
    /// Raised when local cleanup after a transfer fails.
    #[error("failed to remove {path}: {message}")]
    Cleanup {
        /// Path that could not be removed.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

impl DeployError {
    /// Returns the command failure behind this error, if any.
    #[must_use]
    pub fn execution(&self) -> Option<&ExecutionError> {
        match self {
            Self::Command {
                source: CommandError::Execution(execution),
                ..
            }
            | Self::Execute {
                source: CommandError::Execution(execution),
            } => Some(execution.as_ref()),
            Self::Package(PackageError::Build(build)) => match &build.source {
                CommandError::Execution(execution) => Some(execution.as_ref()),
                CommandError::Spawn { .. } => None,
            },
            _ => None,
        }
    }
}

/// Runner and reporter shared by every phase of one strategy.
#[derive(Clone)]
pub(crate) struct Toolkit {
    pub(crate) runner: SharedRunner,
    pub(crate) reporter: SharedReporter,
}

impl fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolkit").finish_non_exhaustive()
    }
}

impl Toolkit {
    pub(crate) const fn new(runner: SharedRunner, reporter: SharedReporter) -> Self {
        Self { runner, reporter }
    }

    pub(crate) async fn run(
        &self,
        phase: Phase,
        command: &CommandLine,
    ) -> Result<CommandResult, DeployError> {
        self.runner
            .run(command)
            .await
            .map_err(|source| DeployError::Command { phase, source })
    }
}

/// A way of getting an application running somewhere.
pub trait DeploymentStrategy: Send + Sync {
    /// Identifies the strategy.
    fn kind(&self) -> StrategyKind;

    /// Sink for phase and progress events.
    fn reporter(&self) -> &dyn Reporter;

    /// Runner every phase issues its commands through.
    fn runner(&self) -> &dyn CommandRunner;

    /// Checks that `config` holds every field this strategy needs.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidConfig`] naming the first missing
    /// field, or [`DeployError::MissingSource`] when the source directory
    /// does not exist.
    fn validate(&self, config: &DeploymentConfig) -> Result<(), DeployError>;

    /// Produces the archive to ship.
    fn package<'a>(&'a self, _state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        skipped(self, Phase::Package)
    }

    /// Creates the machine to deploy to.
    fn provision<'a>(&'a self, _state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        skipped(self, Phase::Provision)
    }

    /// Moves the archive onto the target.
    fn transfer<'a>(&'a self, _state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        skipped(self, Phase::Transfer)
    }

    /// Prepares the target's container tooling.
    fn configure<'a>(&'a self, _state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        skipped(self, Phase::Configure)
    }

    /// Brings the compose stack up.
    fn start<'a>(&'a self, _state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        skipped(self, Phase::Start)
    }

    /// Runs `command` through the strategy's runner outside any phase.
    ///
    /// Output is streamed like phase commands and the same exit-code policy
    /// applies.
    fn execute_command<'a>(&'a self, command: &'a CommandLine) -> StrategyFuture<'a, CommandResult> {
        Box::pin(async move {
            self.runner()
                .run(command)
                .await
                .map_err(|source| DeployError::Execute { source })
        })
    }

    /// Runs a single phase.
    fn run_phase<'a>(&'a self, phase: Phase, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        match phase {
            Phase::Package => self.package(state),
            Phase::Provision => self.provision(state),
            Phase::Transfer => self.transfer(state),
            Phase::Configure => self.configure(state),
            Phase::Start => self.start(state),
        }
    }

    /// Validates `config`, then runs every phase in order, stopping at the
    /// first failure.
    fn deploy<'a>(&'a self, config: DeploymentConfig) -> StrategyFuture<'a, DeploymentState> {
        Box::pin(async move {
            self.validate(&config)?;
            let mut state = DeploymentState::new(config);
            for phase in Phase::ALL {
                self.run_phase(phase, &mut state).await?;
            }
            self.reporter().report(DeployEvent::Completed {
                strategy: self.kind().as_str(),
            });
            Ok(state)
        })
    }
}

fn skipped<S>(strategy: &S, phase: Phase) -> StrategyFuture<'_>
where
    S: DeploymentStrategy + ?Sized,
{
    Box::pin(async move {
        strategy.reporter().report(DeployEvent::PhaseSkipped {
            strategy: strategy.kind().as_str(),
            phase,
        });
        Ok(())
    })
}

/// Reports that `phase` is starting under `strategy`.
pub(crate) fn announce(reporter: &dyn Reporter, strategy: StrategyKind, phase: Phase) {
    reporter.report(DeployEvent::PhaseStarted {
        strategy: strategy.as_str(),
        phase,
    });
}

/// Resolves and checks the configured source directory.
pub(crate) fn source_dir(
    strategy: StrategyKind,
    config: &DeploymentConfig,
) -> Result<Utf8PathBuf, DeployError> {
    let path = DeploymentConfig::require(config.source_path.as_deref(), "source_path")
        .map(Utf8PathBuf::from)
        .map_err(|source| DeployError::InvalidConfig { strategy, source })?;
    if path.is_dir() {
        Ok(path)
    } else {
        Err(DeployError::MissingSource { path })
    }
}

/// Requires `field` on behalf of `strategy`.
pub(crate) fn require_field<'a>(
    strategy: StrategyKind,
    value: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, DeployError> {
    DeploymentConfig::require(value, field)
        .map_err(|source| DeployError::InvalidConfig { strategy, source })
}

/// Requires a `remote_path` that is safe to clear before unpacking.
///
/// Rejects paths that collapse to the filesystem root, the login
/// directory, or one of its ancestors once `.`, `..` and a leading `~`
/// are taken into account.
pub(crate) fn require_remote_path(
    strategy: StrategyKind,
    config: &DeploymentConfig,
) -> Result<&str, DeployError> {
    let path = require_field(strategy, config.remote_path.as_deref(), "remote_path")?;
    let depth = path
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .skip_while(|part| path.starts_with('~') && part.starts_with('~'))
        .fold(0_usize, |depth, part| {
            if part == ".." {
                depth.saturating_sub(1)
            } else {
                depth + 1
            }
        });
    if depth == 0 {
        return Err(DeployError::UnsafeRemotePath {
            strategy,
            path: path.to_owned(),
        });
    }
    Ok(path)
}

/// Packages the configured source tree and records the archive in `state`.
pub(crate) async fn package_source(
    strategy: StrategyKind,
    packager: &Packager,
    state: &mut DeploymentState,
) -> Result<(), DeployError> {
    let source = source_dir(strategy, &state.config)?;
    let artifact = packager
        .package(&source, &state.config.package_options())
        .await?;
    state.artifact = Some(artifact);
    Ok(())
}

/// Arguments for `compose up`.
pub(crate) fn compose_up_args(force_rebuild: bool) -> Vec<&'static str> {
    let mut args = vec!["up", "--build", "-d"];
    if force_rebuild {
        args.push("--force-recreate");
    }
    args
}
