//! Behavioural tests for the `harbour deploy` CLI.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

fn empty_config(dir: &TempDir) -> String {
    let path = dir.path().join("harbour.toml");
    fs::write(&path, "").unwrap_or_else(|err| panic!("write config: {err}"));
    path.to_string_lossy().into_owned()
}

#[test]
fn deploy_reports_missing_source_directory() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let config_path = empty_config(&dir);
    let missing = dir.path().join("absent");

    let mut cmd = cargo_bin_cmd!("harbour");
    cmd.env("HARBOUR_CONFIG_PATH", &config_path);
    cmd.args(["deploy", "--target", "local", "--source"]);
    cmd.arg(&missing);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("source directory not found"));
}

#[test]
fn deploy_remote_requires_host_before_running_commands() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let config_path = empty_config(&dir);
    let source = dir.path().join("shop");
    fs::create_dir_all(source.join("deploy")).unwrap_or_else(|err| panic!("deploy dir: {err}"));

    let mut cmd = cargo_bin_cmd!("harbour");
    cmd.env("HARBOUR_CONFIG_PATH", &config_path);
    cmd.env("HARBOUR_SSH_BIN", "/nonexistent/ssh");
    cmd.args(["deploy", "--target", "remote", "--source"]);
    cmd.arg(&source);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("missing host"))
        .stderr(contains("HARBOUR_HOST"));
}

#[test]
fn deploy_rejects_unknown_target() {
    let mut cmd = cargo_bin_cmd!("harbour");
    cmd.args(["deploy", "--target", "mainframe"]);

    cmd.assert().failure().code(2).stderr(contains("mainframe"));
}
