#![allow(missing_docs)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use tempfile::TempDir;

fn diffs(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("diffs");
    cmd.env_remove("DIFFS_DB")
        .env("DIFFS_CONFIG", dir.path().join("no-config.toml"));
    cmd
}

fn stderr_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run diffs");
    String::from_utf8(output.stderr).expect("utf-8")
}

#[test]
fn no_arguments_prints_usage_and_succeeds() {
    let dir = TempDir::new().expect("tempdir");
    diffs(&dir).assert().success().stdout("");
    let usage = stderr_of(&mut diffs(&dir));
    assert!(usage.contains("Usage"));
    assert!(usage.contains("--db"));
    assert!(usage.contains("serve"));
    assert!(usage.contains("drop"));
}

#[test]
fn version_prints_only_the_version() {
    let dir = TempDir::new().expect("tempdir");
    let expected = format!("{}\n", diffs::VERSION);
    diffs(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(expected.clone());
    diffs(&dir).arg("-v").assert().success().stdout(expected);
}

#[test]
fn version_wins_over_commands() {
    let dir = TempDir::new().expect("tempdir");
    diffs(&dir)
        .args(["--version", "drop"])
        .write_stdin("y\n")
        .assert()
        .success()
        .stdout(format!("{}\n", diffs::VERSION));
}

#[test]
fn version_after_command_is_accepted() {
    let dir = TempDir::new().expect("tempdir");
    diffs(&dir)
        .args(["drop", "-v"])
        .write_stdin("y\n")
        .assert()
        .success()
        .stdout(format!("{}\n", diffs::VERSION));
}

#[test]
fn unknown_flag_fails() {
    let dir = TempDir::new().expect("tempdir");
    diffs(&dir)
        .args(["--db", "mem", "--frobnicate", "drop"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn unknown_command_fails() {
    let dir = TempDir::new().expect("tempdir");
    diffs(&dir)
        .args(["--db", "mem", "explode"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn missing_db_fails() {
    let dir = TempDir::new().expect("tempdir");
    let stderr = stderr_of(diffs(&dir).arg("drop").write_stdin("y\n"));
    assert!(stderr.contains("--db"), "stderr: {stderr}");
    diffs(&dir).arg("drop").write_stdin("y\n").assert().failure().code(1);
}

#[test]
fn malformed_config_fails() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[serve]\nport = \"high\"\n").expect("write config");
    cargo_bin_cmd!("diffs")
        .env_remove("DIFFS_DB")
        .env("DIFFS_CONFIG", &config)
        .args(["--db", "mem", "drop"])
        .write_stdin("n\n")
        .assert()
        .failure()
        .code(1);
}
