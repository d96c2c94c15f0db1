//! Tests for provisioning requests and the provisioning sequence.

use std::net::{IpAddr, Ipv4Addr};

use rstest::{fixture, rstest};

use super::*;
use crate::report::NullReporter;
use crate::test_support::ScriptedProvisioner;

const ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(51, 15, 7, 9));

#[fixture]
fn request() -> ProvisionRequest {
    ProvisionRequest::builder()
        .image_id(" ubuntu-noble ")
        .instance_type("DEV1-S")
        .instance_name("shop")
        .region("fr-par-1")
        .project_id("11111111-2222-3333-4444-555555555555")
        .security_group_id(Some(String::from("   ")))
        .build()
        .expect("valid request")
}

#[rstest]
fn builder_trims_and_drops_blank_optionals(request: ProvisionRequest) {
    assert_eq!(request.image_id, "ubuntu-noble");
    assert_eq!(request.security_group_id, None);
}

#[rstest]
#[case("image_id")]
#[case("instance_type")]
#[case("instance_name")]
#[case("region")]
#[case("project_id")]
fn from_config_names_first_missing_field(#[case] field: &str) {
    let mut config = DeploymentConfig {
        image_id: Some(String::from("img")),
        instance_type: Some(String::from("DEV1-S")),
        instance_name: Some(String::from("shop")),
        region: Some(String::from("fr-par-1")),
        project_id: Some(String::from("project")),
        ..DeploymentConfig::default()
    };
    let slot = match field {
        "image_id" => &mut config.image_id,
        "instance_type" => &mut config.instance_type,
        "instance_name" => &mut config.instance_name,
        "region" => &mut config.region,
        _ => &mut config.project_id,
    };
    *slot = Some(String::from("  "));

    let err = ProvisionRequest::from_config(&config).expect_err("blank field should fail");
    assert_eq!(err.field, field);
}

#[rstest]
#[tokio::test]
async fn provision_runs_steps_in_order(request: ProvisionRequest) {
    let backend = ScriptedProvisioner::new(ADDRESS);

    let target = provision(&backend, &request, TeardownPolicy::Leave, &NullReporter)
        .await
        .expect("provisioning succeeds");

    assert_eq!(target.public_address, ADDRESS);
    assert_eq!(target.instance_id, "shop-id");
    assert_eq!(
        backend.calls(),
        vec!["create", "start", "wait_until_running", "describe"]
    );
}

#[rstest]
#[tokio::test]
async fn create_failure_has_no_instance(request: ProvisionRequest) {
    let backend = ScriptedProvisioner::new(ADDRESS);
    backend.fail_at(ProvisionStep::Create);

    let err = provision(&backend, &request, TeardownPolicy::Terminate, &NullReporter)
        .await
        .expect_err("create fails");

    assert_eq!(err.step, ProvisionStep::Create);
    assert_eq!(err.instance_id, None);
    assert_eq!(backend.calls(), vec!["create"]);
}

#[rstest]
#[tokio::test]
async fn wait_failure_leaves_instance_by_default(request: ProvisionRequest) {
    let backend = ScriptedProvisioner::new(ADDRESS);
    backend.fail_at(ProvisionStep::WaitUntilRunning);

    let err = provision(&backend, &request, TeardownPolicy::Leave, &NullReporter)
        .await
        .expect_err("wait fails");

    assert_eq!(err.step, ProvisionStep::WaitUntilRunning);
    assert_eq!(err.instance_id.as_deref(), Some("shop-id"));
    assert!(!backend.calls().contains(&String::from("terminate")));
    assert!(!backend.calls().contains(&String::from("describe")));
}

#[rstest]
#[tokio::test]
async fn opt_in_teardown_terminates_instance(request: ProvisionRequest) {
    let backend = ScriptedProvisioner::new(ADDRESS);
    backend.fail_at(ProvisionStep::Describe);

    let err = provision(&backend, &request, TeardownPolicy::Terminate, &NullReporter)
        .await
        .expect_err("describe fails");

    assert_eq!(backend.calls().last().map(String::as_str), Some("terminate"));
    assert!(err.message.contains("terminated"), "message: {}", err.message);
}

#[rstest]
#[tokio::test]
async fn failed_teardown_is_appended_to_message(request: ProvisionRequest) {
    let backend = ScriptedProvisioner::new(ADDRESS);
    backend.fail_at(ProvisionStep::Start);
    backend.fail_terminate();

    let err = provision(&backend, &request, TeardownPolicy::Terminate, &NullReporter)
        .await
        .expect_err("start fails");

    assert!(
        err.message.contains("teardown of shop-id also failed"),
        "message: {}",
        err.message
    );
}

#[rstest]
#[case(false, TeardownPolicy::Leave)]
#[case(true, TeardownPolicy::Terminate)]
fn teardown_policy_follows_flag(#[case] flag: bool, #[case] expected: TeardownPolicy) {
    assert_eq!(TeardownPolicy::from_flag(flag), expected);
}
