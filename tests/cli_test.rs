mod common;

use common::*;
use std::process::Command;
use stratus::git::VcsBackend;

fn stratus() -> Command {
    Command::new(env!("CARGO_BIN_EXE_stratus"))
}

#[test]
fn test_help_lists_commands() {
    let output = stratus().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["status", "version", "init-branch", "merge", "tag", "checkout-tag", "notes"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_version_bump_needs_no_repository() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = stratus()
        .current_dir(dir.path())
        .args(["version", "1.2.3", "minor"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("1.3.0"));
}

#[test]
fn test_status_outside_repository_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = stratus()
        .current_dir(dir.path())
        .arg("status")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Repository not found"));
}

#[test]
fn test_gitflow_defaults_for_branch_commands() {
    let fixture = fixture();
    let run = |args: &[&str]| {
        let output = stratus()
            .current_dir(fixture.work.path())
            .arg("--repo")
            .arg(fixture.work.path())
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "{:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    };

    run(&["init-branch", "--feature", "login"]);
    assert!(origin_branches(&fixture).contains(&"feature/login".to_string()));

    run(&["merge", "feature/login"]);
    let feature_tip = fixture.repo.backend().resolve_commit("feature/login").unwrap();
    assert!(feature_tip.is_some());
    assert_eq!(
        fixture.repo.backend().resolve_commit("develop").unwrap(),
        feature_tip
    );
    assert_eq!(fixture.repo.active_branch().unwrap().as_deref(), Some("master"));
}

#[test]
fn test_init_branch_rejects_conflicting_targets() {
    let output = stratus()
        .args(["init-branch", "main", "--feature", "login"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
