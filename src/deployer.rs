//! Facade that forwards deployment calls to the selected strategy.

use crate::config::DeploymentConfig;
use crate::report::Phase;
use crate::runner::{CommandLine, CommandResult};
use crate::strategy::{DeployError, DeploymentState, DeploymentStrategy, StrategyKind};

/// Holds at most one strategy and forwards every call to it.
#[derive(Default)]
pub struct Deployer {
    strategy: Option<Box<dyn DeploymentStrategy>>,
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("strategy", &self.strategy_kind())
            .finish()
    }
}

impl Deployer {
    /// Creates a deployer with no strategy.
    #[must_use]
    pub const fn new() -> Self {
        Self { strategy: None }
    }

    /// Creates a deployer that uses `strategy`.
    #[must_use]
    pub fn with_strategy(strategy: impl DeploymentStrategy + 'static) -> Self {
        let mut deployer = Self::new();
        deployer.set_strategy(strategy);
        deployer
    }

    /// Replaces the active strategy.
    pub fn set_strategy(&mut self, strategy: impl DeploymentStrategy + 'static) {
        self.strategy = Some(Box::new(strategy));
    }

    /// Kind of the active strategy, if one is set.
    #[must_use]
    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        self.strategy.as_deref().map(|strategy| strategy.kind())
    }

    fn strategy(&self) -> Result<&dyn DeploymentStrategy, DeployError> {
        self.strategy.as_deref().ok_or(DeployError::NotConfigured)
    }

    /// Runs every phase of the active strategy against `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::NotConfigured`] without a strategy, otherwise
    /// the first validation or phase failure.
    pub async fn deploy(&self, config: DeploymentConfig) -> Result<DeploymentState, DeployError> {
        self.strategy()?.deploy(config).await
    }

    /// Validates `state.config` and runs the package phase.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::NotConfigured`] without a strategy, otherwise
    /// the validation or phase failure.
    pub async fn package(&self, state: &mut DeploymentState) -> Result<(), DeployError> {
        self.run_phase(Phase::Package, state).await
    }

    /// Validates `state.config` and runs the provision phase.
    ///
    /// # Errors
    ///
    /// See [`Deployer::package`].
    pub async fn provision(&self, state: &mut DeploymentState) -> Result<(), DeployError> {
        self.run_phase(Phase::Provision, state).await
    }

    /// Validates `state.config` and runs the transfer phase.
    ///
    /// # Errors
    ///
    /// See [`Deployer::package`].
    pub async fn transfer(&self, state: &mut DeploymentState) -> Result<(), DeployError> {
        self.run_phase(Phase::Transfer, state).await
    }

    /// Validates `state.config` and runs the configure phase.
    ///
    /// # Errors
    ///
    /// See [`Deployer::package`].
    pub async fn configure(&self, state: &mut DeploymentState) -> Result<(), DeployError> {
        self.run_phase(Phase::Configure, state).await
    }

    /// Validates `state.config` and runs the start phase.
    ///
    /// # Errors
    ///
    /// See [`Deployer::package`].
    pub async fn start(&self, state: &mut DeploymentState) -> Result<(), DeployError> {
        self.run_phase(Phase::Start, state).await
    }

    /// Runs `command` through the active strategy's runner, outside the
    /// phase pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::NotConfigured`] without a strategy, otherwise
    /// [`DeployError::Execute`] when the command fails.
    pub async fn execute_command(&self, command: &CommandLine) -> Result<CommandResult, DeployError> {
        self.strategy()?.execute_command(command).await
    }

    async fn run_phase(&self, phase: Phase, state: &mut DeploymentState) -> Result<(), DeployError> {
        let strategy = self.strategy()?;
        strategy.validate(&state.config)?;
        strategy.run_phase(phase, state).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::report::{DeployEvent, NullReporter};
    use crate::strategy::LocalStrategy;
    use crate::test_support::{RecordingReporter, ScriptedRunner};

    #[rstest]
    #[tokio::test]
    async fn deploy_without_strategy_is_rejected() {
        let deployer = Deployer::new();

        let err = deployer
            .deploy(DeploymentConfig::default())
            .await
            .expect_err("no strategy");

        assert_eq!(err, DeployError::NotConfigured);
        assert_eq!(deployer.strategy_kind(), None);
    }

    #[rstest]
    #[case::package(Phase::Package)]
    #[case::provision(Phase::Provision)]
    #[case::transfer(Phase::Transfer)]
    #[case::configure(Phase::Configure)]
    #[case::start(Phase::Start)]
    #[tokio::test]
    async fn phase_calls_without_strategy_are_rejected(#[case] phase: Phase) {
        let deployer = Deployer::new();
        let mut state = DeploymentState::new(DeploymentConfig::default());

        let result = match phase {
            Phase::Package => deployer.package(&mut state).await,
            Phase::Provision => deployer.provision(&mut state).await,
            Phase::Transfer => deployer.transfer(&mut state).await,
            Phase::Configure => deployer.configure(&mut state).await,
            Phase::Start => deployer.start(&mut state).await,
        };

        assert_eq!(result, Err(DeployError::NotConfigured));
    }

    #[rstest]
    #[tokio::test]
    async fn execute_command_without_strategy_is_rejected() {
        let deployer = Deployer::new();

        let result = deployer.execute_command(&CommandLine::new("uptime")).await;

        assert_eq!(result, Err(DeployError::NotConfigured));
    }

    #[rstest]
    #[tokio::test]
    async fn execute_command_runs_through_strategy_runner() {
        let runner = ScriptedRunner::new();
        runner.respond_to("docker ps", 0, "4f1c2a9e\n");
        let deployer = Deployer::with_strategy(LocalStrategy::new(
            Arc::new(runner.clone()),
            Arc::new(NullReporter),
        ));

        let result = deployer
            .execute_command(&CommandLine::new("docker").args(["ps", "-q"]))
            .await
            .expect("command succeeds");

        assert_eq!(result.stdout, "4f1c2a9e\n");
        assert_eq!(runner.commands(), vec![String::from("docker ps -q")]);
    }

    #[rstest]
    #[tokio::test]
    async fn execute_command_surfaces_non_zero_exit() {
        let runner = ScriptedRunner::new();
        runner.fail_on("docker", 125, "daemon not running");
        let deployer = Deployer::with_strategy(LocalStrategy::new(
            Arc::new(runner.clone()),
            Arc::new(NullReporter),
        ));

        let err = deployer
            .execute_command(&CommandLine::new("docker").arg("info"))
            .await
            .expect_err("command fails");

        assert!(matches!(err, DeployError::Execute { .. }), "got {err:?}");
        let execution = err.execution().expect("execution details");
        assert_eq!(execution.exit_code, Some(125));
        assert_eq!(execution.stderr, "daemon not running");
    }

    #[rstest]
    fn set_strategy_replaces_the_active_strategy() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut deployer = Deployer::new();

        deployer.set_strategy(LocalStrategy::new(runner, Arc::new(NullReporter)));

        assert_eq!(deployer.strategy_kind(), Some(StrategyKind::Local));
    }

    #[rstest]
    #[tokio::test]
    async fn phase_call_forwards_to_strategy() {
        let source = tempfile::tempdir().expect("tempdir");
        let source_path = source.path().to_str().expect("utf8 path").to_owned();
        let runner = ScriptedRunner::new();
        let reporter = RecordingReporter::new();
        let deployer = Deployer::with_strategy(LocalStrategy::new(
            Arc::new(runner.clone()),
            reporter.shared(),
        ));
        let mut state = DeploymentState::new(DeploymentConfig {
            source_path: Some(source_path.clone()),
            ..DeploymentConfig::default()
        });

        deployer.package(&mut state).await.expect("package skips");
        deployer.start(&mut state).await.expect("start");

        assert_eq!(
            runner.commands(),
            vec![format!("cd {source_path}/deploy && docker-compose up --build -d")]
        );
        assert_eq!(
            reporter.events().first(),
            Some(&DeployEvent::PhaseSkipped {
                strategy: "local",
                phase: Phase::Package,
            })
        );
    }
}
