#![allow(missing_docs)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

fn diffs(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("diffs");
    cmd.env_remove("DIFFS_DB")
        .env_remove("RUST_LOG")
        .env("DIFFS_CONFIG", dir.path().join("no-config.toml"));
    cmd
}

#[test]
fn drop_writes_trace_and_profile() {
    let dir = TempDir::new().expect("tempdir");
    let trace = dir.path().join("trace.json");
    let cpu = dir.path().join("cpu.folded");
    diffs(&dir)
        .arg("--db")
        .arg(dir.path().join("db"))
        .arg("--trace")
        .arg(&trace)
        .arg("--cpu")
        .arg(&cpu)
        .arg("drop")
        .write_stdin("y\n")
        .assert()
        .success();

    let events: Vec<Value> = fs::read_to_string(&trace)
        .expect("trace file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert!(!events.is_empty());
    assert!(events
        .iter()
        .any(|event| event["fields"]["message"] == "dropped database"));

    let profile = fs::read_to_string(&cpu).expect("cpu file");
    assert!(
        profile.lines().any(|line| line.starts_with("drop ")),
        "profile: {profile}"
    );
}

#[test]
fn declined_drop_still_flushes_sinks() {
    let dir = TempDir::new().expect("tempdir");
    let trace = dir.path().join("trace.json");
    let cpu = dir.path().join("cpu.folded");
    diffs(&dir)
        .args(["--db", "mem"])
        .arg("--trace")
        .arg(&trace)
        .arg("--cpu")
        .arg(&cpu)
        .arg("drop")
        .write_stdin("n\n")
        .assert()
        .success();
    assert!(trace.exists());
    assert!(fs::read_to_string(&cpu)
        .expect("cpu file")
        .lines()
        .any(|line| line.starts_with("drop ")));
}

#[test]
fn failing_command_still_flushes_sinks() {
    let dir = TempDir::new().expect("tempdir");
    let cpu = dir.path().join("cpu.folded");
    diffs(&dir)
        .args(["--db", "mem"])
        .arg("--cpu")
        .arg(&cpu)
        .arg("drop")
        .write_stdin("")
        .assert()
        .failure()
        .code(1);
    assert!(fs::read_to_string(&cpu)
        .expect("cpu file")
        .lines()
        .any(|line| line.starts_with("drop ")));
}

#[test]
fn unwritable_trace_sink_fails_before_running() {
    let dir = TempDir::new().expect("tempdir");
    let trace = dir.path().join("missing").join("trace.json");
    let output = diffs(&dir)
        .args(["--db", "mem"])
        .arg("--trace")
        .arg(&trace)
        .arg("drop")
        .write_stdin("y\n")
        .assert()
        .failure()
        .code(1)
        .get_output()
        .clone();
    assert!(output.stdout.is_empty(), "prompt must not be shown");
    assert!(!output.stderr.is_empty());
}

#[test]
fn unwritable_profile_sink_closes_trace() {
    let dir = TempDir::new().expect("tempdir");
    let trace = dir.path().join("trace.json");
    let cpu = dir.path().join("missing").join("cpu.folded");
    diffs(&dir)
        .args(["--db", "mem"])
        .arg("--trace")
        .arg(&trace)
        .arg("--cpu")
        .arg(&cpu)
        .arg("drop")
        .write_stdin("y\n")
        .assert()
        .failure()
        .code(1);
    assert!(trace.exists());
    assert!(!cpu.exists());
}
