//! Binary-level tests: exit codes and the stdout/stderr contract.
//!
//! JSON mode must put exactly one parseable document on stdout with all
//! diagnostics on stderr; every surfaced error must exit non-zero.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn ticketflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ticketflow").unwrap();
    cmd.current_dir(dir)
        .env_remove("TICKETFLOW_CONFIG")
        .env_remove("TICKETFLOW_OUTPUT_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

fn write_ticket(dir: &Path, id: &str, description: &str) {
    let todo = dir.join("tickets/todo");
    std::fs::create_dir_all(&todo).unwrap();
    std::fs::write(
        todo.join(format!("{id}.md")),
        format!(
            "---\npriority: 2\ndescription: {description}\n\
             created_at: \"2025-01-01T12:00:00Z\"\nstarted_at: null\nclosed_at: null\n---\nbody\n"
        ),
    )
    .unwrap();
}

#[test]
fn init_scaffolds_and_stays_idempotent() {
    let dir = TempDir::new().unwrap();

    ticketflow(dir.path()).arg("init").assert().success();
    assert!(dir.path().join(".ticketflow.yaml").is_file());
    assert!(dir.path().join("tickets/todo").is_dir());
    assert!(dir.path().join("tickets/doing").is_dir());
    assert!(dir.path().join("tickets/done").is_dir());

    ticketflow(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Already initialized"));
}

#[test]
fn verbs_without_a_project_fail_with_a_hint() {
    let dir = TempDir::new().unwrap();
    ticketflow(dir.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ticketflow init"));
}

#[test]
fn s2_ambiguous_prefix_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    ticketflow(dir.path()).arg("init").assert().success();
    write_ticket(dir.path(), "250101-120000-alpha", "first");
    write_ticket(dir.path(), "250101-130000-beta", "second");

    ticketflow(dir.path())
        .args(["show", "250101"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ambiguous"));

    // A longer, unique prefix resolves.
    ticketflow(dir.path())
        .args(["show", "250101-12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("250101-120000-alpha"));
}

#[test]
fn s6_corrupt_ticket_is_skipped_with_a_diagnostic() {
    let dir = TempDir::new().unwrap();
    ticketflow(dir.path()).arg("init").assert().success();
    write_ticket(dir.path(), "250101-120000-good", "fine");
    std::fs::write(
        dir.path().join("tickets/todo/250101-130000-broken.md"),
        "---\npriority: [unclosed\n---\nbody\n",
    )
    .unwrap();

    let assert = ticketflow(dir.path())
        .args(["list", "--status", "all", "--format", "json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("250101-130000-broken"));

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("stdout is one JSON doc");
    let tickets = parsed.as_array().expect("list emits a JSON array");
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0]["id"], "250101-120000-good");
}

#[test]
fn show_emits_a_single_json_object() {
    let dir = TempDir::new().unwrap();
    ticketflow(dir.path()).arg("init").assert().success();
    write_ticket(dir.path(), "250101-120000-solo", "by itself");

    let assert = ticketflow(dir.path())
        .args(["show", "250101-120000-solo", "--format", "json"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["id"], "250101-120000-solo");
    assert_eq!(parsed["status"], "todo");
    assert_eq!(parsed["priority"], 2);
    assert!(parsed["started_at"].is_null());
}

#[test]
fn unknown_ticket_fails_with_a_suggestion() {
    let dir = TempDir::new().unwrap();
    ticketflow(dir.path()).arg("init").assert().success();

    ticketflow(dir.path())
        .args(["show", "999999-000000-nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ticketflow list"));
}

#[test]
fn output_format_env_override_applies() {
    let dir = TempDir::new().unwrap();
    ticketflow(dir.path()).arg("init").assert().success();
    write_ticket(dir.path(), "250101-120000-envy", "env formatted");

    let assert = ticketflow(dir.path())
        .env("TICKETFLOW_OUTPUT_FORMAT", "json")
        .args(["list", "--status", "all"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&stdout).is_ok());
}

#[test]
fn invalid_config_is_a_fatal_classified_error() {
    let dir = TempDir::new().unwrap();
    ticketflow(dir.path()).arg("init").assert().success();
    std::fs::write(
        dir.path().join(".ticketflow.yaml"),
        "git:\n  default_branch: \"\"\n",
    )
    .unwrap();

    ticketflow(dir.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("default_branch"));
}
