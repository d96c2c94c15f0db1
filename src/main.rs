//! Binary entry point for the harbour CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use harbour::{
    CloudStrategy, DeployError, Deployer, DeploymentConfig, LocalStrategy, ProcessCommandRunner,
    RemoteStrategy, ScalewayBackend, SharedReporter, SharedRunner, TracingReporter,
};

mod cli;

use cli::{Cli, DeployCommand, TargetKind};

/// Environment variable holding the `tracing` filter directive.
const LOG_ENV: &str = "HARBOUR_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("deployment failed: {0}")]
    Deploy(#[from] DeployError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Deploy(command) => run_deploy(command).await,
    }
}

async fn run_deploy(command: DeployCommand) -> Result<(), CliError> {
    let mut config = DeploymentConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    apply_overrides(&mut config, &command);

    let deployer = build_deployer(command.target, &config)?;
    deployer.deploy(config).await?;
    Ok(())
}

/// Applies command-line flags on top of the loaded configuration.
fn apply_overrides(config: &mut DeploymentConfig, command: &DeployCommand) {
    if let Some(source) = &command.source {
        config.source_path = Some(source.clone());
    }
    if let Some(host) = &command.host {
        config.host = Some(host.clone());
    }
    if command.force_rebuild {
        config.force_rebuild = true;
    }
}

fn build_deployer(target: TargetKind, config: &DeploymentConfig) -> Result<Deployer, CliError> {
    let reporter: SharedReporter = Arc::new(TracingReporter);
    let runner: SharedRunner = Arc::new(ProcessCommandRunner::new(Arc::clone(&reporter)));

    let deployer = match target {
        TargetKind::Local => Deployer::with_strategy(LocalStrategy::new(runner, reporter)),
        TargetKind::Remote => Deployer::with_strategy(RemoteStrategy::new(runner, reporter)),
        TargetKind::Cloud => {
            let backend = ScalewayBackend::from_config(config)
                .map_err(|err| CliError::Backend(err.to_string()))?;
            Deployer::with_strategy(CloudStrategy::new(backend, runner, reporter))
        }
    };
    Ok(deployer)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
