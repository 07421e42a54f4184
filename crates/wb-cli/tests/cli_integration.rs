//! CLI integration tests
//!
//! Tests the whalebridge CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn whalebridge() -> Command {
    Command::cargo_bin("whalebridge")
        .expect("Failed to locate whalebridge binary - ensure it's built before running tests")
}

/// Command with its config pointed into a scratch directory
fn whalebridge_in(dir: &TempDir) -> Command {
    let mut cmd = whalebridge();
    cmd.arg("--config").arg(dir.path().join("config.toml"));
    cmd
}

#[test]
fn test_cli_help() {
    whalebridge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("whalebridge"))
        .stdout(predicate::str::contains(
            "Bridge a remote container engine socket",
        ));
}

#[test]
fn test_cli_version() {
    whalebridge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("whalebridge"));
}

#[test]
fn test_cli_connect_help() {
    whalebridge()
        .args(["connect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--remote-port"))
        .stdout(predicate::str::contains("--strategy"));
}

#[test]
fn test_cli_check_help() {
    whalebridge()
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Diagnose"));
}

#[test]
fn test_cli_config_help() {
    whalebridge()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_cli_unknown_command() {
    whalebridge()
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_cli_unknown_strategy() {
    whalebridge()
        .args(["connect", "remote", "--strategy", "carrier-pigeon"])
        .assert()
        .failure();
}

#[test]
fn test_cli_config_path() {
    let dir = TempDir::new().unwrap();
    whalebridge_in(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_cli_config_show_defaults() {
    let dir = TempDir::new().unwrap();
    whalebridge_in(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remote_socket"))
        .stdout(predicate::str::contains("/var/run/docker.sock"));
}

#[test]
fn test_cli_config_init_set_get() {
    let dir = TempDir::new().unwrap();
    whalebridge_in(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("config.toml").exists());

    whalebridge_in(&dir)
        .args(["config", "set", "engine_port", "2380"])
        .assert()
        .success();

    whalebridge_in(&dir)
        .args(["config", "get", "engine_port"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2380"));
}

#[test]
fn test_cli_config_get_unknown_key() {
    let dir = TempDir::new().unwrap();
    whalebridge_in(&dir)
        .args(["config", "get", "no_such_key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no_such_key"));
}

#[test]
fn test_cli_connect_malformed_target() {
    let dir = TempDir::new().unwrap();
    whalebridge_in(&dir)
        .args(["connect", ".bad..host"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(".bad..host"));
}

#[test]
fn test_cli_check_malformed_target() {
    let dir = TempDir::new().unwrap();
    whalebridge_in(&dir)
        .args(["check", ".bad..host"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid target"));
}

#[test]
fn test_cli_check_local_address() {
    let dir = TempDir::new().unwrap();
    whalebridge_in(&dir)
        .args(["check", "unix:///var/run/docker.sock"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("local engine address"));
}
