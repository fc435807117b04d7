//! CLI integration tests for the `ticketflow` binary.
//!
//! Each test writes its fixtures into a fresh temp directory and checks
//! exit codes, stdout, and stderr.

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const REPAIR: &str = r#"{
  "typeCode": "repair",
  "typeName": "Repair order",
  "structuralSchema": {
    "type": "object",
    "required": ["customer"],
    "properties": { "customer": { "type": "string" }, "qty": { "type": "integer" } }
  },
  "stateMachine": {
    "initialState": "received",
    "states": ["received", "in_progress", "ready", "picked_up", "cancelled"],
    "transitions": [
      { "name": "start", "from": "received", "to": "in_progress" },
      { "name": "finish", "from": "in_progress", "to": "ready" },
      { "name": "pick_up", "from": "ready", "to": "picked_up" },
      { "name": "cancel", "from": "received", "to": "cancelled" },
      { "name": "cancel", "from": "in_progress", "to": "cancelled" }
    ],
    "milestones": { "ready": "ready", "completed": "picked_up", "cancelled": "cancelled" }
  }
}"#;

fn ticketflow() -> Command {
    cargo_bin_cmd!("ticketflow")
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    ticketflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ticket type definition toolchain"));
}

#[test]
fn version_exits_0() {
    ticketflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ticketflow"));
}

// ──────────────────────────────────────────────
// 2. check
// ──────────────────────────────────────────────

#[test]
fn check_describes_the_machine() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    ticketflow()
        .arg("check")
        .arg(&def)
        .assert()
        .success()
        .stdout(predicate::str::contains("repair (Repair order), ticket type"))
        .stdout(predicate::str::contains("received*"))
        .stdout(predicate::str::contains("start: received -> in_progress"))
        .stdout(predicate::str::contains("completed milestone: picked_up"));
}

#[test]
fn check_json_lists_transitions() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let out = ticketflow()
        .args(["--output", "json", "check"])
        .arg(&def)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["kind"], "ticket");
    assert_eq!(json["stateMachine"]["initialState"], "received");
    assert_eq!(json["stateMachine"]["transitions"].as_array().unwrap().len(), 5);
}

#[test]
fn check_rejects_unknown_transition_state() {
    let tmp = TempDir::new().unwrap();
    let def = write(
        &tmp,
        "broken.json",
        r#"{
          "typeCode": "broken",
          "typeName": "Broken",
          "stateMachine": {
            "initialState": "A",
            "states": ["A", "B"],
            "transitions": [{ "name": "go", "from": "A", "to": "Z" }]
          }
        }"#,
    );
    ticketflow()
        .arg("check")
        .arg(&def)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("undeclared state 'Z'"));
}

#[test]
fn check_missing_file_fails() {
    ticketflow()
        .args(["check", "does/not/exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading type definition"));
}

// ──────────────────────────────────────────────
// 3. validate
// ──────────────────────────────────────────────

#[test]
fn validate_accepts_matching_payload() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let payload = write(&tmp, "payload.json", r#"{ "customer": "Ada", "qty": 1 }"#);
    ticketflow()
        .arg("validate")
        .arg(&def)
        .arg(&payload)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn validate_reports_every_violation() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let payload = write(&tmp, "payload.json", r#"{ "qty": "two" }"#);
    ticketflow()
        .arg("validate")
        .arg(&def)
        .arg(&payload)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("/customer"))
        .stderr(predicate::str::contains("/qty"));
}

#[test]
fn validate_json_errors_carry_field_paths() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let payload = write(&tmp, "payload.json", r#"{}"#);
    let out = ticketflow()
        .args(["--output", "json", "validate"])
        .arg(&def)
        .arg(&payload)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["valid"], false);
    assert_eq!(json["errors"][0]["field_path"], "/customer");
}

// ──────────────────────────────────────────────
// 4. simulate
// ──────────────────────────────────────────────

#[test]
fn simulate_applies_transitions_and_prints_history() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let payload = write(&tmp, "payload.json", r#"{ "customer": "Ada" }"#);
    ticketflow()
        .arg("simulate")
        .arg(&def)
        .arg("--payload")
        .arg(&payload)
        .args(["start", "finish", "pick_up"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. created -> received"))
        .stdout(predicate::str::contains("4. pick_up: ready -> picked_up"))
        .stdout(predicate::str::contains("final state: picked_up"));
}

#[test]
fn simulate_stops_at_first_rejection_with_alternatives() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let payload = write(&tmp, "payload.json", r#"{ "customer": "Ada" }"#);
    ticketflow()
        .arg("simulate")
        .arg(&def)
        .arg("--payload")
        .arg(&payload)
        .args(["start", "pick_up", "finish"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("final state: in_progress"))
        .stderr(predicate::str::contains(
            "valid transitions from 'in_progress': cancel, finish",
        ));
}

#[test]
fn simulate_json_reports_rejection() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let payload = write(&tmp, "payload.json", r#"{ "customer": "Ada" }"#);
    let out = ticketflow()
        .args(["--output", "json", "simulate"])
        .arg(&def)
        .arg("--payload")
        .arg(&payload)
        .args(["teleport"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["final_state"], "received");
    assert_eq!(json["rejected"]["transition"], "teleport");
    assert_eq!(json["history"].as_array().unwrap().len(), 1);
    assert_eq!(
        json["rejected"]["valid_transitions"],
        serde_json::json!(["cancel", "start"])
    );
}

#[test]
fn simulate_rejects_invalid_payload() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    ticketflow()
        .arg("simulate")
        .arg(&def)
        .arg("start")
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation failed"));
}

#[test]
fn simulate_honours_config_file() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let payload = write(&tmp, "payload.json", r#"{ "customer": "Ada" }"#);
    let config = write(&tmp, "engine.toml", "[retry]\nmax_attempts = 0\n");
    ticketflow()
        .arg("simulate")
        .arg(&def)
        .arg("--payload")
        .arg(&payload)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts"));
}

#[test]
fn quiet_suppresses_output_but_keeps_exit_code() {
    let tmp = TempDir::new().unwrap();
    let def = write(&tmp, "repair.json", REPAIR);
    let payload = write(&tmp, "payload.json", r#"{ "customer": "Ada" }"#);
    ticketflow()
        .arg("--quiet")
        .arg("simulate")
        .arg(&def)
        .arg("--payload")
        .arg(&payload)
        .arg("finish")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty());
}
