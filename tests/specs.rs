// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end specs driving the real `clud`/`cludd` binaries (§6/§6.1).
//!
//! Grounded on the teacher's `tests/specs/daemon/lifecycle.rs`: a real
//! daemon process started/stopped through the CLI, polled through
//! `clud daemon status` rather than reaching into its internals. Each test
//! gets its own `CLUD_CONFIG_DIR` and loopback port so daemon processes
//! never collide; `#[serial]` still guards every test here since they all
//! spawn and reap real OS processes through the same `clud` binary.

use assert_cmd::Command;
use serial_test::serial;
use std::process::Output;
use std::time::{Duration, Instant};

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port").local_addr().expect("local addr").port()
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

struct Harness {
    config_dir: tempfile::TempDir,
    port: u16,
}

impl Harness {
    fn new() -> Self {
        let config_dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(config_dir.path().join("config.toml"), "agent_command = [\"cat\"]\n")
            .expect("write config.toml");
        Self { config_dir, port: free_port() }
    }

    fn clud(&self) -> Command {
        let mut cmd = Command::cargo_bin("clud").expect("clud binary");
        cmd.env("CLUD_CONFIG_DIR", self.config_dir.path())
            .env("CLUD_DAEMON_PORT", self.port.to_string())
            .env_remove("CLUD_AUTH_TOKEN")
            .args(["--port", &self.port.to_string()]);
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.clud().args(args).output().expect("spawn clud")
    }

    fn wait_until_running(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let stdout = stdout_of(&self.run(&["daemon", "status"]));
            if stdout.contains("Status: ok") {
                return;
            }
            assert!(Instant::now() < deadline, "daemon never reported running: {stdout}");
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn wait_until_stopped(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if stdout_of(&self.run(&["daemon", "status"])).contains("Daemon not running") {
                return;
            }
            assert!(Instant::now() < deadline, "daemon never stopped");
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn stop(&self) {
        let output = self.run(&["daemon", "stop"]);
        assert!(output.status.success(), "daemon stop failed: {}", String::from_utf8_lossy(&output.stderr));
        self.wait_until_stopped();
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.run(&["daemon", "stop"]);
    }
}

#[test]
#[serial]
fn status_reports_not_running_before_start() {
    let harness = Harness::new();
    let output = harness.run(&["daemon", "status"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("Daemon not running"));
}

#[test]
#[serial]
fn daemon_start_status_stop_round_trip() {
    let harness = Harness::new();
    let start = harness.run(&["daemon", "start"]);
    assert!(start.status.success(), "{}", String::from_utf8_lossy(&start.stderr));
    harness.wait_until_running();

    assert!(harness.config_dir.path().join("daemon.pid").exists());

    harness.stop();
}

#[test]
#[serial]
fn starting_twice_is_reported_as_already_running() {
    let harness = Harness::new();
    assert!(harness.run(&["daemon", "start"]).status.success());
    harness.wait_until_running();

    let second_start = harness.run(&["daemon", "start"]);
    assert_eq!(second_start.status.code(), Some(4));

    harness.stop();
}

#[test]
#[serial]
fn cron_add_list_enable_disable_rm_round_trip() {
    let harness = Harness::new();
    assert!(harness.run(&["daemon", "start"]).status.success());
    harness.wait_until_running();

    let add = harness.run(&["cron", "add", "*/5 * * * *", "/tmp/prompt.txt"]);
    assert!(add.status.success(), "{}", String::from_utf8_lossy(&add.stderr));
    let add_text = stdout_of(&add);
    let id = add_text.lines().next().expect("added line").trim_start_matches("Added cron task ").to_string();
    assert!(!id.is_empty());

    let list = stdout_of(&harness.run(&["cron", "list"]));
    assert!(list.contains(&id));
    assert!(list.contains("enabled"));

    assert!(harness.run(&["cron", "disable", &id]).status.success());
    assert!(stdout_of(&harness.run(&["cron", "list"])).contains("disabled"));

    assert!(harness.run(&["cron", "enable", &id]).status.success());
    assert!(stdout_of(&harness.run(&["cron", "list"])).contains("enabled"));

    assert!(harness.run(&["cron", "rm", &id]).status.success());
    assert!(stdout_of(&harness.run(&["cron", "list"])).contains("No cron tasks"));

    harness.stop();
}

#[test]
#[serial]
fn invalid_cron_expression_exits_with_validation_code() {
    let harness = Harness::new();
    assert!(harness.run(&["daemon", "start"]).status.success());
    harness.wait_until_running();

    let add = harness.run(&["cron", "add", "not a cron expression", "/tmp/prompt.txt"]);
    assert_eq!(add.status.code(), Some(2));

    harness.stop();
}

#[test]
#[serial]
fn agent_list_is_empty_for_a_fresh_daemon() {
    let harness = Harness::new();
    assert!(harness.run(&["daemon", "start"]).status.success());
    harness.wait_until_running();

    let list = harness.run(&["agent", "list"]);
    assert!(list.status.success());
    assert!(stdout_of(&list).contains("No registered agents"));

    harness.stop();
}

#[test]
#[serial]
fn getting_an_unknown_agent_fails() {
    let harness = Harness::new();
    assert!(harness.run(&["daemon", "start"]).status.success());
    harness.wait_until_running();

    let get = harness.run(&["agent", "get", "does-not-exist"]);
    assert!(!get.status.success());

    harness.stop();
}
