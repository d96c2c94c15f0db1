//! BDD scenarios for the deployment strategies.

use rstest_bdd_macros::scenario;

use super::test_helpers::{DeployContextResult, deploy_context_result};

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Local deployment starts compose in the deploy directory"
)]
fn scenario_local_deploy(deploy_context_result: DeployContextResult) {
    drop(deploy_context_result);
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Local deployment surfaces compose failures"
)]
fn scenario_local_compose_failure(deploy_context_result: DeployContextResult) {
    drop(deploy_context_result);
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Missing remote host is rejected before any command"
)]
fn scenario_missing_remote_host(deploy_context_result: DeployContextResult) {
    drop(deploy_context_result);
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Remote deployment replaces a running stack"
)]
fn scenario_remote_replaces_stack(deploy_context_result: DeployContextResult) {
    drop(deploy_context_result);
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Remote deployment installs tooling on a bare host"
)]
fn scenario_remote_installs_tooling(deploy_context_result: DeployContextResult) {
    drop(deploy_context_result);
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Cloud deployment reaches the instance through its provider hostname"
)]
fn scenario_cloud_hostname(deploy_context_result: DeployContextResult) {
    drop(deploy_context_result);
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Cloud instance that never runs stops the deployment"
)]
fn scenario_cloud_never_runs(deploy_context_result: DeployContextResult) {
    drop(deploy_context_result);
}
