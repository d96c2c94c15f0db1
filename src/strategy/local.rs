//! Runs the compose stack on the machine harbour runs on.

use crate::config::DeploymentConfig;
use crate::report::{Phase, Reporter, SharedReporter};
use crate::runner::{CommandLine, CommandRunner, SharedRunner};

use super::{
    DeployError, DeploymentState, DeploymentStrategy, StrategyFuture, StrategyKind, Toolkit,
    announce, compose_up_args, source_dir,
};

/// Starts `<source>/deploy` with the local compose tool. Every other phase
/// is skipped.
#[derive(Clone, Debug)]
pub struct LocalStrategy {
    toolkit: Toolkit,
}

impl LocalStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(runner: SharedRunner, reporter: SharedReporter) -> Self {
        Self {
            toolkit: Toolkit::new(runner, reporter),
        }
    }
}

impl DeploymentStrategy for LocalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Local
    }

    fn reporter(&self) -> &dyn Reporter {
        self.toolkit.reporter.as_ref()
    }

    fn runner(&self) -> &dyn CommandRunner {
        self.toolkit.runner.as_ref()
    }

    fn validate(&self, config: &DeploymentConfig) -> Result<(), DeployError> {
        source_dir(self.kind(), config).map(|_| ())
    }

    fn start<'a>(&'a self, state: &'a mut DeploymentState) -> StrategyFuture<'a> {
        Box::pin(async move {
            announce(self.reporter(), self.kind(), Phase::Start);
            let source = source_dir(self.kind(), &state.config)?;
            let command = CommandLine::new(state.config.compose_bin.as_str())
                .args(compose_up_args(state.config.force_rebuild))
                .in_dir(source.join("deploy"))
                .with_timeout(state.config.command_timeout());
            self.toolkit.run(Phase::Start, &command).await?;
            Ok(())
        })
    }
}
