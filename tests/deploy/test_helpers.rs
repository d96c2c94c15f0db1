//! Fixtures shared by the deployment scenarios.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use harbour::test_support::{RecordingReporter, ScriptedProvisioner, ScriptedRunner};
use harbour::{
    CloudStrategy, DeployError, Deployer, DeploymentConfig, DeploymentState, HostnamePattern,
    LocalStrategy, RemoteStrategy,
};
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;

pub const REMOTE_HOST: &str = "203.0.113.10";
pub const INSTANCE_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(51, 15, 7, 9));
pub const PROVIDER_HOSTNAME: &str = "51-15-7-9.instances.example.net";

#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("unknown deployment strategy: {0}")]
    UnknownStrategy(String),
    #[error("unknown error kind: {0}")]
    UnknownErrorKind(String),
    #[error("deployment has not run yet")]
    NotDeployed,
    #[error("assertion failed: {0}")]
    Assertion(String),
}

/// State threaded through a deployment scenario.
#[derive(Debug)]
pub struct DeployContext {
    _dir: TempDir,
    pub source: Utf8PathBuf,
    pub config: DeploymentConfig,
    pub runner: ScriptedRunner,
    pub reporter: RecordingReporter,
    pub backend: ScriptedProvisioner,
    pub outcome: Option<Result<DeploymentState, DeployError>>,
}

impl DeployContext {
    /// Builds a deployer for the named strategy around the scripted doubles.
    pub fn deployer(&self, strategy: &str) -> Result<Deployer, StepError> {
        let runner = Arc::new(self.runner.clone());
        let reporter = self.reporter.shared();
        match strategy {
            "local" => Ok(Deployer::with_strategy(LocalStrategy::new(runner, reporter))),
            "remote" => Ok(Deployer::with_strategy(RemoteStrategy::new(runner, reporter))),
            "cloud" => Ok(Deployer::with_strategy(CloudStrategy::new(
                self.backend.clone(),
                runner,
                reporter,
            ))),
            other => Err(StepError::UnknownStrategy(other.to_owned())),
        }
    }

    /// Returns the outcome of the last deployment.
    pub fn outcome(&self) -> Result<&Result<DeploymentState, DeployError>, StepError> {
        self.outcome.as_ref().ok_or(StepError::NotDeployed)
    }

    /// Returns the error of the last deployment, failing if it succeeded.
    pub fn failure(&self) -> Result<&DeployError, StepError> {
        match self.outcome()? {
            Ok(_) => Err(StepError::Assertion(String::from(
                "expected the deployment to fail",
            ))),
            Err(err) => Ok(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployTestError {
    #[error("failed to prepare workspace: {0}")]
    Io(#[from] std::io::Error),
    #[error("workspace path is not UTF-8: {0}")]
    NonUtf8Path(String),
}

pub type DeployContextResult = Result<DeployContext, DeployTestError>;

#[fixture]
pub fn deploy_context_result() -> DeployContextResult {
    build_deploy_context()
}

#[fixture]
pub fn deploy_context(deploy_context_result: DeployContextResult) -> DeployContext {
    deploy_context_result
        .unwrap_or_else(|err| panic!("deploy context fixture should initialise: {err}"))
}

fn build_deploy_context() -> DeployContextResult {
    let dir = TempDir::new()?;
    let root = Utf8Path::from_path(dir.path())
        .ok_or_else(|| DeployTestError::NonUtf8Path(dir.path().display().to_string()))?
        .to_path_buf();
    let source = root.join("shop");
    write_manifest(&source)?;
    let config = DeploymentConfig {
        host: Some(REMOTE_HOST.to_owned()),
        username: Some(String::from("deploy")),
        remote_path: Some(String::from("/srv/shop")),
        source_path: Some(source.to_string()),
        staging_dir: Some(root.join("staging").to_string()),
        image_id: Some(String::from("ubuntu-jammy")),
        instance_type: Some(String::from("DEV1-S")),
        instance_name: Some(String::from("shop")),
        region: Some(String::from("fr-par-1")),
        project_id: Some(String::from("proj")),
        ..DeploymentConfig::default()
    };
    let reporter = RecordingReporter::new();
    let backend = ScriptedProvisioner::new(INSTANCE_ADDRESS).with_pattern(HostnamePattern::Dashed {
        suffix: String::from("instances.example.net"),
    });

    Ok(DeployContext {
        _dir: dir,
        source,
        config,
        runner: ScriptedRunner::with_reporter(reporter.shared()),
        reporter,
        backend,
        outcome: None,
    })
}

fn write_manifest(source: &Utf8Path) -> std::io::Result<()> {
    fs::create_dir_all(source.join("deploy"))?;
    fs::write(
        source.join("deploy/docker-compose.yml"),
        "services:\n  frontend:\n    image: shop/frontend\n  api:\n    image: shop/api\n",
    )
}

/// Returns the index of the first command containing `fragment`.
pub fn position(commands: &[String], fragment: &str) -> Result<usize, StepError> {
    commands
        .iter()
        .position(|command| command.contains(fragment))
        .ok_or_else(|| StepError::Assertion(format!("no command containing {fragment:?}")))
}
