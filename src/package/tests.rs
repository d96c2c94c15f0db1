//! Unit tests for the packager.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::runner::CommandError;
use crate::test_support::{RecordingReporter, ScriptedRunner};

const MANIFEST: &str = "\
services:
  frontend:
    build: ../frontend
  api:
    image: shop/api
    depends_on:
      - frontend
";

struct Workspace {
    _dir: TempDir,
    source: Utf8PathBuf,
    staging: Utf8PathBuf,
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().expect("tempdir");
    let root = Utf8Path::from_path(dir.path()).expect("utf8 tempdir").to_path_buf();
    let source = root.join("shop");
    fs::create_dir_all(source.join("deploy")).expect("deploy dir");
    fs::write(source.join("deploy/docker-compose.yml"), MANIFEST).expect("manifest");
    fs::write(source.join("package.json"), "{}").expect("package.json");
    Workspace {
        _dir: dir,
        source,
        staging: root.join("staging"),
    }
}

fn options(workspace: &Workspace, force_rebuild: bool) -> PackageOptions {
    PackageOptions {
        force_rebuild,
        build_bin: String::from("npm"),
        prebuilt_service: String::from("frontend"),
        staging_dir: workspace.staging.clone(),
        timeout: None,
    }
}

fn packager(runner: &ScriptedRunner, reporter: &RecordingReporter) -> Packager {
    Packager::new(Arc::new(runner.clone()), reporter.shared())
}

#[rstest]
#[tokio::test]
async fn missing_source_is_reported_before_any_command(workspace: Workspace) {
    let runner = ScriptedRunner::new();
    let reporter = RecordingReporter::new();
    let missing = workspace.source.join("absent");

    let err = packager(&runner, &reporter)
        .package(&missing, &options(&workspace, true))
        .await
        .expect_err("missing source must fail");

    assert_eq!(err, PackageError::MissingSource { path: missing });
    assert!(runner.commands().is_empty());
}

#[rstest]
#[tokio::test]
async fn plain_package_runs_no_commands(workspace: Workspace) {
    let runner = ScriptedRunner::new();
    let reporter = RecordingReporter::new();

    let artifact = packager(&runner, &reporter)
        .package(&workspace.source, &options(&workspace, false))
        .await
        .expect("package");

    assert!(runner.commands().is_empty());
    assert_eq!(artifact.file_name, "shop.tar.gz");
    assert!(artifact.path.is_file());
    let manifest =
        fs::read_to_string(workspace.source.join("deploy/docker-compose.yml")).expect("read");
    assert_eq!(manifest, MANIFEST);
}

#[rstest]
#[tokio::test]
async fn rebuild_installs_builds_and_strips_frontend(workspace: Workspace) {
    let runner = ScriptedRunner::new();
    let reporter = RecordingReporter::new();

    packager(&runner, &reporter)
        .package(&workspace.source, &options(&workspace, true))
        .await
        .expect("package");

    let source = &workspace.source;
    assert_eq!(
        runner.commands(),
        vec![
            format!("cd {source} && npm install"),
            format!("cd {source} && npm run build"),
        ]
    );
    let manifest =
        fs::read_to_string(source.join("deploy/docker-compose.yml")).expect("read manifest");
    assert!(!manifest.contains("frontend"), "manifest: {manifest}");
    assert!(manifest.contains("shop/api"), "manifest: {manifest}");
    assert!(
        reporter
            .progress_messages()
            .iter()
            .any(|message| message.contains("removed prebuilt service frontend")),
        "messages: {:?}",
        reporter.progress_messages()
    );
}

#[rstest]
#[tokio::test]
async fn rebuild_skips_install_and_removes_existing_node_modules(workspace: Workspace) {
    let runner = ScriptedRunner::new();
    let reporter = RecordingReporter::new();
    let node_modules = workspace.source.join("node_modules");
    fs::create_dir_all(node_modules.join("left-pad")).expect("node_modules");

    packager(&runner, &reporter)
        .package(&workspace.source, &options(&workspace, true))
        .await
        .expect("package");

    assert_eq!(
        runner.commands(),
        vec![format!("cd {} && npm run build", workspace.source)]
    );
    assert!(!node_modules.exists());
}

#[rstest]
#[tokio::test]
async fn build_failure_stops_before_archiving(workspace: Workspace) {
    let runner = ScriptedRunner::new();
    runner.fail_on("npm run build", 2, "tsc: type error");
    let reporter = RecordingReporter::new();

    let err = packager(&runner, &reporter)
        .package(&workspace.source, &options(&workspace, true))
        .await
        .expect_err("build must fail");

    let PackageError::Build(BuildError { command, source }) = err else {
        panic!("expected build error, got {err:?}");
    };
    assert_eq!(command, format!("cd {} && npm run build", workspace.source));
    let CommandError::Execution(execution) = source else {
        panic!("expected execution error, got {source:?}");
    };
    assert_eq!(execution.exit_code, Some(2));
    assert_eq!(execution.stderr, "tsc: type error");
    assert!(!workspace.staging.join("shop.tar.gz").exists());
    let manifest =
        fs::read_to_string(workspace.source.join("deploy/docker-compose.yml")).expect("read");
    assert_eq!(manifest, MANIFEST);
}
