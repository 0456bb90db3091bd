//! Integration tests for the awc CLI
//!
//! These tests run the actual binary against temporary workflow directories.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get the binary to test, isolated from the caller's environment
fn awc_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("awc").unwrap();
    cmd.current_dir(dir)
        .env("AWC_API_URL", "http://127.0.0.1:9")
        .env("AWC_FETCH_TIMEOUT", "1")
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn write_workflow(dir: &Path, name: &str, content: &str) {
    let workflows = dir.join(".github/workflows");
    fs::create_dir_all(&workflows).unwrap();
    fs::write(workflows.join(format!("{}.md", name)), content).unwrap();
}

const VALID: &str = r#"---
on:
  workflow_dispatch:
permissions:
  contents: read
tools:
  edit:
safe-outputs:
  create-issue:
---

Summarize the open issues.
"#;

const WRITE_PERMISSION: &str = r#"---
on:
  workflow_dispatch:
permissions:
  contents: write
---

Push a fix.
"#;

#[test]
fn test_help_flag() {
    let temp = TempDir::new().unwrap();
    awc_cmd(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("compile"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_validate_help() {
    let temp = TempDir::new().unwrap();
    awc_cmd(temp.path())
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--format"));
}

// ============================================================================
// validate
// ============================================================================

#[test]
fn test_validate_valid_workflow() {
    let temp = TempDir::new().unwrap();
    write_workflow(temp.path(), "summary", VALID);

    awc_cmd(temp.path())
        .args(["validate", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("warning").not());
}

#[test]
fn test_validate_write_permission_fails() {
    let temp = TempDir::new().unwrap();
    write_workflow(temp.path(), "fix", WRITE_PERMISSION);

    awc_cmd(temp.path())
        .args(["validate", "fix"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("permissions.contents"))
        .stdout(predicate::str::contains("safe-outputs"))
        .stdout(predicate::str::contains("1 error(s)"));
}

#[test]
fn test_validate_json_format() {
    let temp = TempDir::new().unwrap();
    write_workflow(
        temp.path(),
        "pr",
        "---\non:\n  pull_request:\n---\nReview the change.\n",
    );

    let output = awc_cmd(temp.path())
        .args(["validate", "pr", "--format", "json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["valid"], false);
    let errors: Vec<_> = report["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|d| d["severity"] == "error")
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["kind"], "shape");
    assert_eq!(errors[0]["location"], "on.pull_request");
}

#[test]
fn test_validate_by_path() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("local.md"), VALID).unwrap();

    awc_cmd(temp.path())
        .args(["validate", "local.md"])
        .assert()
        .success();
}

#[test]
fn test_validate_missing_workflow() {
    let temp = TempDir::new().unwrap();
    awc_cmd(temp.path())
        .args(["validate", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AWC-006"))
        .stderr(predicate::str::contains("awc list"));
}

#[test]
fn test_validate_without_frontmatter() {
    let temp = TempDir::new().unwrap();
    write_workflow(temp.path(), "plain", "# Just a prompt\n");

    awc_cmd(temp.path())
        .args(["validate", "plain"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AWC-001"));
}

// ============================================================================
// compile
// ============================================================================

#[test]
fn test_compile_writes_lock_file() {
    let temp = TempDir::new().unwrap();
    write_workflow(temp.path(), "summary", VALID);

    awc_cmd(temp.path())
        .args(["compile", "summary"])
        .assert()
        .success();

    let lock_path = temp.path().join(".github/workflows/summary.lock.yml");
    let lock = fs::read_to_string(&lock_path).unwrap();
    assert!(lock.starts_with("# Generated by awc"));

    let doc: serde_yaml::Value = serde_yaml::from_str(&lock).unwrap();
    assert_eq!(doc["permissions"]["contents"].as_str(), Some("read"));
    assert!(doc["jobs"]["agent"]["permissions"]["issues"].is_null());
    assert_eq!(
        doc["jobs"]["create_issue"]["permissions"]["issues"].as_str(),
        Some("write")
    );
}

#[test]
fn test_compile_invalid_leaves_no_lock() {
    let temp = TempDir::new().unwrap();
    write_workflow(temp.path(), "fix", WRITE_PERMISSION);

    awc_cmd(temp.path())
        .args(["compile", "fix"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not compiled"));

    assert!(!temp.path().join(".github/workflows/fix.lock.yml").exists());
}

#[test]
fn test_compile_all_reports_unchanged() {
    let temp = TempDir::new().unwrap();
    write_workflow(temp.path(), "a", VALID);
    write_workflow(temp.path(), "b", VALID);

    awc_cmd(temp.path()).arg("compile").assert().success();
    assert!(temp.path().join(".github/workflows/a.lock.yml").exists());
    assert!(temp.path().join(".github/workflows/b.lock.yml").exists());

    awc_cmd(temp.path())
        .arg("compile")
        .assert()
        .success()
        .stdout(predicate::str::contains("unchanged"));
}

#[test]
fn test_compile_all_continues_past_broken_file() {
    let temp = TempDir::new().unwrap();
    write_workflow(temp.path(), "README", "# Workflows\n\nNo frontmatter here.\n");
    write_workflow(temp.path(), "triage", VALID);

    awc_cmd(temp.path())
        .arg("compile")
        .assert()
        .failure()
        .stderr(predicate::str::contains("AWC-001"))
        .stderr(predicate::str::contains("README.md"));

    assert!(temp.path().join(".github/workflows/triage.lock.yml").exists());
    assert!(!temp.path().join(".github/workflows/README.lock.yml").exists());
}

#[test]
fn test_compile_custom_dir() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("flows");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("x.md"), VALID).unwrap();

    awc_cmd(temp.path())
        .args(["compile", "--dir", "flows"])
        .assert()
        .success();
    assert!(dir.join("x.lock.yml").exists());
}

#[test]
fn test_compile_unreachable_import_fails() {
    let temp = TempDir::new().unwrap();
    write_workflow(
        temp.path(),
        "shared",
        "---\non:\n  workflow_dispatch:\nimports:\n  - acme/shared/tools.md@v1\n---\nBody\n",
    );

    awc_cmd(temp.path())
        .args(["compile", "shared"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("imports[0]"));
    assert!(!temp.path().join(".github/workflows/shared.lock.yml").exists());
}

// ============================================================================
// list / new
// ============================================================================

#[test]
fn test_list_statuses() {
    let temp = TempDir::new().unwrap();
    write_workflow(temp.path(), "good", VALID);
    write_workflow(temp.path(), "bad", WRITE_PERMISSION);

    awc_cmd(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("not compiled"))
        .stdout(predicate::str::contains("invalid"))
        .stdout(predicate::str::contains("workflow_dispatch"));

    awc_cmd(temp.path()).args(["compile", "good"]).assert().success();
    awc_cmd(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("compiled"));
}

#[test]
fn test_new_then_validate() {
    let temp = TempDir::new().unwrap();

    awc_cmd(temp.path())
        .args(["new", "issue-triage"])
        .assert()
        .success()
        .stdout(predicate::str::contains("issue-triage.md"));

    awc_cmd(temp.path())
        .args(["validate", "issue-triage"])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning").not());

    awc_cmd(temp.path())
        .args(["new", "issue-triage"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
