#![allow(missing_docs)]
#![cfg(unix)]

use std::fs;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

fn spawn_serve(dir: &TempDir, port: u16, trace: &std::path::Path, cpu: &std::path::Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_diffs"))
        .env_remove("DIFFS_DB")
        .env_remove("RUST_LOG")
        .env("DIFFS_CONFIG", dir.path().join("no-config.toml"))
        .args(["--db", "mem", "serve", "--port", &port.to_string()])
        .arg("--trace")
        .arg(trace)
        .arg("--cpu")
        .arg(cpu)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn diffs serve")
}

fn wait_healthy(port: u16) -> Value {
    let url = format!("http://127.0.0.1:{port}/health");
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        match ureq::get(&url).call() {
            Ok(response) => return response.into_json().expect("health json"),
            Err(err) if Instant::now() >= deadline => panic!("server never became healthy: {err}"),
            Err(_) => thread::sleep(Duration::from_millis(50)),
        }
    }
}

fn terminate(child: &Child) {
    let status = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .expect("run kill");
    assert!(status.success());
}

#[test]
fn sigterm_flushes_capture_and_exits_nonzero() {
    let dir = TempDir::new().expect("tempdir");
    let trace = dir.path().join("trace.json");
    let cpu = dir.path().join("cpu.folded");
    let port = free_port();
    let mut child = spawn_serve(&dir, port, &trace, &cpu);

    let health = wait_healthy(port);
    assert_eq!(health["status"], "ok");

    let pull: Value = ureq::post(&format!("http://127.0.0.1:{port}/pull"))
        .set("Authorization", "1")
        .send_json(serde_json::json!({"baseStateID": ""}))
        .expect("pull")
        .into_json()
        .expect("pull json");
    assert_eq!(pull["stateID"], "");
    assert_eq!(pull["unchanged"], true);

    terminate(&child);
    let status = child.wait().expect("wait");
    assert_eq!(status.code(), Some(1));

    let trace_contents = fs::read_to_string(&trace).expect("trace file");
    assert!(
        trace_contents.contains("Listening on"),
        "trace: {trace_contents}"
    );
    let profile = fs::read_to_string(&cpu).expect("cpu file");
    assert!(
        profile.lines().any(|line| line.contains("pull")),
        "profile: {profile}"
    );
}

#[test]
fn unauthorized_pull_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let port = free_port();
    let mut child = spawn_serve(
        &dir,
        port,
        &dir.path().join("trace.json"),
        &dir.path().join("cpu.folded"),
    );
    wait_healthy(port);

    let result = ureq::post(&format!("http://127.0.0.1:{port}/pull"))
        .send_json(serde_json::json!({"baseStateID": ""}));
    assert!(matches!(result, Err(ureq::Error::Status(401, _))));

    terminate(&child);
    child.wait().expect("wait");
}
