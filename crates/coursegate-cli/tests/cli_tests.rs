//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const COURSES: &str = "../../courses";

fn coursegate() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("coursegate").unwrap()
}

/// A command wired to the sample catalog and a private state file.
fn with_state(state: &Path) -> Command {
    let mut cmd = coursegate();
    cmd.env_remove("COURSEGATE_STATE_PATH")
        .env_remove("COURSEGATE_CATALOG_DIR")
        .arg("--courses")
        .arg(COURSES)
        .arg("--state")
        .arg(state);
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn help_output() {
    coursegate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("evaluation gating"));
}

#[test]
fn version_output() {
    coursegate()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("coursegate"));
}

#[test]
fn tier_lookup() {
    coursegate()
        .args(["tier", "65"])
        .assert()
        .success()
        .stdout(predicate::str::contains("near_pass"))
        .stdout(predicate::str::contains("\"lockout_minutes\": 15"));

    coursegate()
        .args(["tier", "150"])
        .assert()
        .success()
        .stdout(predicate::str::contains("out_of_range"));
}

#[test]
fn validate_sample_courses() {
    coursegate()
        .arg("validate")
        .arg(COURSES)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 course(s) loaded"))
        .stdout(predicate::str::contains("rust-intro"))
        .stdout(predicate::str::contains("All courses valid"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.toml");
    std::fs::write(
        &path,
        "[course]\nid = \"empty\"\nname = \"Empty\"\n\n[[modules]]\ntitle = \"Nothing here\"\n",
    )
    .unwrap();

    coursegate()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("has no content items"))
        .stdout(predicate::str::contains("1 warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    coursegate()
        .arg("validate")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    coursegate()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created coursegate.toml"))
        .stdout(predicate::str::contains("Created courses/example.toml"));

    assert!(dir.path().join("coursegate.toml").exists());
    assert!(dir.path().join("courses/example.toml").exists());

    // The generated course validates cleanly.
    coursegate()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("All courses valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    coursegate()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    coursegate()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn view_then_read_progress() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    let json = json_stdout(
        with_state(&state).args(["view", "--user", "alice", "--course", "rust-intro", "--module", "0", "--item", "1"]),
    );
    assert_eq!(json["success"], Value::Bool(true));
    assert_eq!(json["progress"]["progress_percent"], Value::from(5));
    assert!(state.exists());

    let json = json_stdout(with_state(&state).args(["progress", "--user", "alice", "--course", "rust-intro"]));
    assert_eq!(json["progress"]["current_content_index"], Value::from(1));

    let json = json_stdout(with_state(&state).args(["progress", "--user", "bob", "--course", "rust-intro"]));
    assert_eq!(json["success"], Value::Bool(true));
    assert_eq!(json["progress"], Value::Null);
}

#[test]
fn out_of_range_view_fails() {
    let dir = TempDir::new().unwrap();
    with_state(&dir.path().join("state.json"))
        .args(["view", "--user", "alice", "--course", "rust-intro", "--module", "5", "--item", "0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"success\": false"))
        .stdout(predicate::str::contains("out of range"));
}

#[test]
fn unknown_course_fails() {
    let dir = TempDir::new().unwrap();
    with_state(&dir.path().join("state.json"))
        .args(["complete-module", "--user", "alice", "--course", "nope", "--module", "0", "--score", "80"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn failed_module_is_locked() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    let json = json_stdout(with_state(&state).args([
        "complete-module", "--user", "alice", "--course", "rust-intro", "--module", "0", "--score", "25",
    ]));
    assert_eq!(json["passed"], Value::Bool(false));
    assert_eq!(json["tier"]["lockout_minutes"], Value::from(45));

    let json = json_stdout(with_state(&state).args([
        "check-lock", "--user", "alice", "--course", "rust-intro", "--module", "0",
    ]));
    assert_eq!(json["locked"], Value::Bool(true));
    assert_eq!(json["remaining_minutes"], Value::from(45));

    let json = json_stdout(with_state(&state).args([
        "check-lock", "--user", "alice", "--course", "rust-intro", "--final",
    ]));
    assert_eq!(json["locked"], Value::Bool(false));
}

#[test]
fn check_lock_requires_a_scope() {
    let dir = TempDir::new().unwrap();
    with_state(&dir.path().join("state.json"))
        .args(["check-lock", "--user", "alice", "--course", "rust-intro"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("module_index is required"));
}

#[test]
fn passing_module_raises_skill() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    with_state(&state)
        .args(["user", "add", "--user", "alice", "--skill", "3"])
        .assert()
        .success();

    let json = json_stdout(with_state(&state).args([
        "complete-module", "--user", "alice", "--course", "ownership-deep-dive", "--module", "0", "--score", "95",
    ]));
    assert_eq!(json["passed"], Value::Bool(true));
    assert_eq!(json["next_module_index"], Value::from(1));
    assert_eq!(json["skill"]["value"], Value::from(3.5));
    assert_eq!(json["skill"]["persisted"], Value::Bool(true));

    let json = json_stdout(with_state(&state).args(["skill", "get", "--user", "alice"]));
    assert_eq!(json["skill"], Value::from(3.5));
}

#[test]
fn skill_override_is_clamped() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    with_state(&state)
        .args(["user", "add", "--user", "alice"])
        .assert()
        .success();
    let json = json_stdout(with_state(&state).args(["skill", "set", "--user", "alice", "--value", "9"]));
    assert_eq!(json["skill"], Value::from(5.0));
    let json = json_stdout(with_state(&state).args(["skill", "set", "--user", "alice", "--value", "0"]));
    assert_eq!(json["skill"], Value::from(1.0));

    with_state(&state)
        .args(["user", "add", "--user", "bob", "--skill", "0.5"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("skill must be between 1 and 5"));

    with_state(&state)
        .args(["skill", "get", "--user", "ghost"])
        .assert()
        .failure();
}

#[test]
fn final_flow_completes_course() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    for module in ["0", "1"] {
        with_state(&state)
            .args(["complete-module", "--user", "alice", "--course", "rust-intro", "--module", module, "--score", "90"])
            .assert()
            .success();
    }

    let json = json_stdout(with_state(&state).args(["can-take-final", "--user", "alice", "--course", "rust-intro"]));
    assert_eq!(json["can_take_final"], Value::Bool(true));
    assert_eq!(json["modules_completed"], Value::from(2));

    let json = json_stdout(with_state(&state).args([
        "complete-final", "--user", "alice", "--course", "rust-intro", "--score", "88",
    ]));
    assert_eq!(json["passed"], Value::Bool(true));
    assert_eq!(json["progress"]["progress_percent"], Value::from(100));
    assert_eq!(json["progress"]["status"], Value::from("completed"));

    with_state(&state)
        .args(["progress", "--user", "alice", "--table"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust-intro"))
        .stdout(predicate::str::contains("100%"));
}

#[test]
fn reset_and_abandon() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    with_state(&state)
        .args(["view", "--user", "alice", "--course", "cargo-workshop", "--module", "0", "--item", "0"])
        .assert()
        .success();

    let json = json_stdout(with_state(&state).args(["abandon", "--user", "alice", "--course", "cargo-workshop"]));
    assert_eq!(json["progress"]["status"], Value::from("abandoned"));

    let json = json_stdout(with_state(&state).args(["reset", "--user", "alice", "--course", "cargo-workshop"]));
    assert_eq!(json["progress"]["progress_percent"], Value::from(0));
    assert_eq!(json["progress"]["status"], Value::from("in_progress"));
}

#[test]
fn raw_json_request() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    with_state(&state)
        .arg("request")
        .arg(r#"{"op":"force_complete","user_id":"alice","course_id":"cargo-workshop"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"course_completed\": true"));

    with_state(&state)
        .arg("request")
        .write_stdin(r#"{"op":"list_progress","user_id":"alice"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("cargo-workshop"));

    with_state(&state)
        .arg("request")
        .arg("{}")
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid request"));
}

#[test]
fn config_file_selects_memory_storage() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("coursegate.toml");
    std::fs::write(
        &config,
        format!(
            "catalog_dir = \"{}\"\n\n[storage]\ntype = \"memory\"\n",
            Path::new(COURSES).canonicalize().unwrap().display()
        ),
    )
    .unwrap();

    coursegate()
        .env_remove("COURSEGATE_STATE_PATH")
        .env_remove("COURSEGATE_CATALOG_DIR")
        .arg("--config")
        .arg(&config)
        .args(["view", "--user", "alice", "--course", "rust-intro", "--module", "0", "--item", "0"])
        .assert()
        .success();

    // Nothing persisted between invocations.
    coursegate()
        .env_remove("COURSEGATE_STATE_PATH")
        .env_remove("COURSEGATE_CATALOG_DIR")
        .arg("--config")
        .arg(&config)
        .args(["progress", "--user", "alice", "--course", "rust-intro"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"progress\": null"));
}
