//! Integration tests for the fleetqa CLI

use assert_cmd::cargo;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the fleetqa binary, isolated from the caller's
/// environment and any `.env` in the working tree.
fn fleetqa(cwd: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("fleetqa"));
    cmd.current_dir(cwd.path())
        .env_remove("QA_BASE_URL")
        .env_remove("QA_ROLES")
        .env_remove("QA_AUDIT_ROOT")
        .env_remove("QA_RUNNER_COMMAND")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_mentions_green_criteria() {
    let temp = TempDir::new().unwrap();
    fleetqa(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("A module is GREEN when"))
        .stdout(predicate::str::contains("--skip-explore"));
}

#[test]
fn test_list_modules() {
    let temp = TempDir::new().unwrap();
    fleetqa(&temp)
        .args(["--list-modules", "--format", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ID: auth"))
        .stdout(predicate::str::contains("ID: vehicles"));
}

#[test]
fn test_list_modules_json() {
    let temp = TempDir::new().unwrap();
    let output = fleetqa(&temp)
        .args(["--list-modules", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let modules: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(modules.as_array().unwrap().iter().any(|m| m["id"] == "fuel"));
}

#[test]
fn test_missing_scope_is_usage_error() {
    let temp = TempDir::new().unwrap();
    fleetqa(&temp)
        .args(["--audit-root", "audits"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Missing required scope"))
        .stderr(predicate::str::contains("Usage:"));
    assert!(!temp.path().join("audits").exists());
}

#[test]
fn test_unknown_module_is_usage_error() {
    let temp = TempDir::new().unwrap();
    fleetqa(&temp)
        .args(["--module", "spaceships", "--audit-root", "audits"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown module \"spaceships\""));
    assert!(!temp.path().join("audits").exists());
}

#[test]
fn test_unknown_role_is_usage_error() {
    let temp = TempDir::new().unwrap();
    fleetqa(&temp)
        .args(["--all", "--roles", "ADMIN,PILOT"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown role: PILOT"));
}

#[test]
fn test_roles_from_env_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join(".env"), "QA_ROLES=NOBODY\n").unwrap();
    fleetqa(&temp)
        .args(["--module", "auth"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown role: NOBODY"));
}
