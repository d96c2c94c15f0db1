//! BDD step definitions for `harbour` deployments.

use harbour::provision::ProvisionStep;
use harbour::{DeployError, DeploymentState};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{DeployContext, PROVIDER_HOSTNAME, StepError, position};

const PROBE: &str = "command -v docker";

#[given("a workspace with a compose manifest")]
fn workspace_with_manifest(deploy_context: DeployContext) -> DeployContext {
    deploy_context
}

#[given("the compose command fails with exit code \"{code}\"")]
fn compose_fails(deploy_context: DeployContext, code: i32) -> DeployContext {
    deploy_context
        .runner
        .fail_on("up --build", code, "compose failed");
    deploy_context
}

#[given("no remote host is configured")]
fn no_remote_host(mut deploy_context: DeployContext) -> DeployContext {
    deploy_context.config.host = None;
    deploy_context
}

#[given("the remote host already has docker and compose")]
fn host_configured(deploy_context: DeployContext) -> DeployContext {
    deploy_context.runner.respond_to(PROBE, 0, "configured\n");
    deploy_context
}

#[given("a stack is already running on the remote host")]
fn stack_running(deploy_context: DeployContext) -> DeployContext {
    deploy_context.runner.respond_to("ps -q", 0, "4f1c2a9e\n");
    deploy_context
}

#[given("the cloud instance never reaches running")]
fn instance_never_runs(deploy_context: DeployContext) -> DeployContext {
    deploy_context
        .backend
        .fail_at(ProvisionStep::WaitUntilRunning);
    deploy_context
}

#[when("I deploy with the \"{strategy}\" strategy")]
fn deploy_with(
    mut deploy_context: DeployContext,
    strategy: String,
) -> Result<DeployContext, StepError> {
    let runtime = Runtime::new().map_err(StepError::Runtime)?;
    let deployer = deploy_context.deployer(&strategy)?;
    let config = deploy_context.config.clone();

    let outcome = runtime.block_on(async move { deployer.deploy(config).await });
    deploy_context.outcome = Some(outcome);
    Ok(deploy_context)
}

#[then("the deployment succeeds")]
fn deployment_succeeds(deploy_context: &DeployContext) -> Result<(), StepError> {
    match deploy_context.outcome()? {
        Ok(_) => Ok(()),
        Err(err) => Err(StepError::Assertion(format!(
            "expected success, got failure: {err}"
        ))),
    }
}

#[then("the deployment fails with a \"{kind}\" error")]
fn deployment_fails_with(deploy_context: &DeployContext, kind: String) -> Result<(), StepError> {
    let err = deploy_context.failure()?;
    let matched = match kind.as_str() {
        "command" => matches!(err, DeployError::Command { .. }),
        "config" => matches!(err, DeployError::InvalidConfig { .. }),
        "provisioning" => matches!(err, DeployError::Provisioning(_)),
        other => return Err(StepError::UnknownErrorKind(other.to_owned())),
    };
    if matched {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected a {kind} error, got {err:?}"
        )))
    }
}

#[then("the failure carries exit code \"{code}\"")]
fn failure_exit_code(deploy_context: &DeployContext, code: i32) -> Result<(), StepError> {
    let err = deploy_context.failure()?;
    let execution = err
        .execution()
        .ok_or_else(|| StepError::Assertion(format!("no execution details in {err:?}")))?;
    if execution.exit_code == Some(code) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected exit code {code}, got {:?}",
            execution.exit_code
        )))
    }
}

#[then("the only command starts compose in the local deploy directory")]
fn only_local_compose(deploy_context: &DeployContext) -> Result<(), StepError> {
    let expected = vec![format!(
        "cd {}/deploy && docker-compose up --build -d",
        deploy_context.source
    )];
    let commands = deploy_context.runner.commands();
    if commands == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {commands:?}"
        )))
    }
}

#[then("no command is issued")]
fn no_command(deploy_context: &DeployContext) -> Result<(), StepError> {
    let commands = deploy_context.runner.commands();
    if commands.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no commands, got {commands:?}"
        )))
    }
}

#[then("the running stack is stopped before the directory is cleared")]
fn stack_stopped_first(deploy_context: &DeployContext) -> Result<(), StepError> {
    let commands = deploy_context.runner.commands();
    let down = position(&commands, "docker-compose down")?;
    let clear = position(&commands, "-mindepth 1 -delete")?;
    let copy = position(&commands, "scp ")?;
    if down < clear && clear < copy {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected transfer order: {commands:#?}"
        )))
    }
}

#[then("configuration only probes the remote host")]
fn only_probe(deploy_context: &DeployContext) -> Result<(), StepError> {
    let commands = deploy_context.runner.commands();
    let probes = commands.iter().filter(|command| command.contains(PROBE)).count();
    let installs = commands
        .iter()
        .filter(|command| command.contains("apt-get"))
        .count();
    if probes == 1 && installs == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected a single probe and no install, got {commands:#?}"
        )))
    }
}

#[then("docker and compose are installed on the remote host")]
fn tooling_installed(deploy_context: &DeployContext) -> Result<(), StepError> {
    let commands = deploy_context.runner.commands();
    let probe = position(&commands, PROBE)?;
    let engine = position(&commands, "docker-ce docker-ce-cli containerd.io")?;
    let group = position(&commands, "usermod -aG docker")?;
    let start = position(&commands, "up --build -d")?;
    if probe < engine && engine < group && group < start {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected install order: {commands:#?}"
        )))
    }
}

#[then("every command targets the provider hostname")]
fn commands_use_hostname(deploy_context: &DeployContext) -> Result<(), StepError> {
    let commands = deploy_context.runner.commands();
    let state = deployed_state(deploy_context)?;
    let host_matches = state
        .target
        .as_ref()
        .is_some_and(|target| target.host() == PROVIDER_HOSTNAME);
    if !commands.is_empty()
        && host_matches
        && commands
            .iter()
            .all(|command| command.contains(PROVIDER_HOSTNAME))
    {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected every command to reach {PROVIDER_HOSTNAME}: {commands:#?}"
        )))
    }
}

fn deployed_state(deploy_context: &DeployContext) -> Result<&DeploymentState, StepError> {
    deploy_context
        .outcome()?
        .as_ref()
        .map_err(|err| StepError::Assertion(format!("deployment failed: {err}")))
}
