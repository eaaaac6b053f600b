#![allow(missing_docs)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use diffs::cli::DROP_WARNING;
use diffs::db::{Database, LocalDatabase, LOCAL_DATASET};
use serde_json::json;
use tempfile::TempDir;

fn seeded_db(dir: &TempDir) -> std::path::PathBuf {
    let root = dir.path().join("db");
    let db = LocalDatabase::open(&root).expect("open");
    let ds = db.get_dataset(LOCAL_DATASET).expect("dataset");
    db.commit(&ds, json!({"todos": ["write tests"]})).expect("commit");
    root
}

fn head_exists(root: &Path) -> bool {
    LocalDatabase::open(root)
        .expect("reopen")
        .get_dataset(LOCAL_DATASET)
        .expect("dataset")
        .head()
        .is_some()
}

fn diffs(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("diffs");
    cmd.env_remove("DIFFS_DB")
        .env("DIFFS_CONFIG", dir.path().join("no-config.toml"));
    cmd
}

#[test]
fn declining_keeps_the_database() {
    let dir = TempDir::new().expect("tempdir");
    let root = seeded_db(&dir);
    let output = diffs(&dir)
        .arg("--db")
        .arg(&root)
        .arg("drop")
        .write_stdin("n\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).expect("utf-8"), DROP_WARNING);
    assert!(head_exists(&root));
}

#[test]
fn confirming_deletes_the_database() {
    let dir = TempDir::new().expect("tempdir");
    let root = seeded_db(&dir);
    diffs(&dir)
        .arg("--db")
        .arg(&root)
        .arg("drop")
        .write_stdin("  y \n")
        .assert()
        .success();
    assert!(!head_exists(&root));
}

#[test]
fn db_from_environment_is_used() {
    let dir = TempDir::new().expect("tempdir");
    let root = seeded_db(&dir);
    diffs(&dir)
        .env("DIFFS_DB", &root)
        .arg("drop")
        .write_stdin("y\n")
        .assert()
        .success();
    assert!(!head_exists(&root));
}

#[test]
fn db_from_config_file_is_used() {
    let dir = TempDir::new().expect("tempdir");
    let root = seeded_db(&dir);
    let config = dir.path().join("config.toml");
    std::fs::write(&config, format!("db = {:?}\n", root.to_str().expect("utf-8 path")))
        .expect("write config");
    cargo_bin_cmd!("diffs")
        .env_remove("DIFFS_DB")
        .env("DIFFS_CONFIG", &config)
        .arg("drop")
        .write_stdin("y\n")
        .assert()
        .success();
    assert!(!head_exists(&root));
}

#[test]
fn closed_stdin_fails() {
    let dir = TempDir::new().expect("tempdir");
    let root = seeded_db(&dir);
    let output = diffs(&dir)
        .arg("--db")
        .arg(&root)
        .arg("drop")
        .write_stdin("")
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    assert!(!output.is_empty());
    assert!(head_exists(&root));
}

#[test]
fn unresolvable_location_fails_after_confirmation() {
    let dir = TempDir::new().expect("tempdir");
    let file = dir.path().join("plain-file");
    std::fs::write(&file, b"not a database").expect("write");
    diffs(&dir)
        .arg("--db")
        .arg(&file)
        .arg("drop")
        .write_stdin("y\n")
        .assert()
        .failure()
        .code(1);
}
