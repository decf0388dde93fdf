// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the daemon control plane (§6) plus `ensure_daemon_running`
//! (§4.7): probe, spawn detached if down, poll until ready.
//!
//! Grounded on `oj-cli/src/commands/daemon.rs`'s `DaemonClient::connect_or_start`
//! probe-then-spawn-then-poll idiom and `find_ojd_binary`'s sibling-of-the-
//! current-executable lookup, adapted from the teacher's hand-rolled
//! length-prefixed socket protocol to plain HTTP/JSON over loopback.

use crate::exit_error::ExitError;
use anyhow::{anyhow, Result};
use clud_core::{AgentRecord, CronTask};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const ENSURE_RUNNING_DEADLINE: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub pid: u32,
    pub uptime_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
    auth_token: Option<String>,
}

impl DaemonClient {
    pub fn new(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::new(),
            auth_token: clud_core::config::auth_token_env(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check<T: for<'de> Deserialize<'de>>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| anyhow!("malformed response body: {e}"));
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error.message)
            .unwrap_or_else(|_| status.to_string());
        if status.as_u16() == 400 || status.as_u16() == 409 {
            Err(ExitError::validation(message).into())
        } else {
            Err(anyhow!(message))
        }
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.request(reqwest::Method::GET, "/health").send().await?;
        self.check(response).await
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let response = self.request(reqwest::Method::GET, "/agents").send().await?;
        self.check(response).await
    }

    pub async fn get_agent(&self, id: &str) -> Result<AgentRecord> {
        self.list_agents()
            .await?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow!("no such agent: {id:?}"))
    }

    pub async fn stop_agent(&self, id: &str) -> Result<()> {
        let response = self.request(reqwest::Method::POST, &format!("/agents/{id}/stop")).send().await?;
        self.check::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn list_cron(&self) -> Result<Vec<CronTask>> {
        let response = self.request(reqwest::Method::GET, "/cron/tasks").send().await?;
        self.check(response).await
    }

    pub async fn add_cron(&self, expression: &str, task_file: &str) -> Result<(String, Option<u64>)> {
        #[derive(Deserialize)]
        struct AddResponse {
            id: String,
            next_run: Option<u64>,
        }
        let response = self
            .request(reqwest::Method::POST, "/cron/tasks")
            .json(&json!({ "expression": expression, "task_file": task_file }))
            .send()
            .await?;
        let body: AddResponse = self.check(response).await?;
        Ok((body.id, body.next_run))
    }

    pub async fn remove_cron(&self, id: &str) -> Result<()> {
        let response = self.request(reqwest::Method::DELETE, &format!("/cron/tasks/{id}")).send().await?;
        self.check::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn enable_cron(&self, id: &str) -> Result<()> {
        let response = self.request(reqwest::Method::POST, &format!("/cron/tasks/{id}/enable")).send().await?;
        self.check::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn disable_cron(&self, id: &str) -> Result<()> {
        let response = self.request(reqwest::Method::POST, &format!("/cron/tasks/{id}/disable")).send().await?;
        self.check::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn send(&self, session_id: &str, text: &str) -> Result<()> {
        #[derive(Serialize)]
        struct SendRequest<'a> {
            text: &'a str,
        }
        let response = self
            .request(reqwest::Method::POST, &format!("/sessions/{session_id}/send"))
            .json(&SendRequest { text })
            .send()
            .await?;
        self.check::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// `ws://127.0.0.1:{port}/sessions/{id}/stream`, for `clud attach`.
    pub fn stream_url(&self, session_id: &str) -> String {
        format!("ws{}/sessions/{session_id}/stream", self.base_url.trim_start_matches("http"))
    }
}

/// Probe the daemon; if it's down, spawn `cludd` detached and poll
/// `/health` until it responds or `ENSURE_RUNNING_DEADLINE` elapses (§4.7).
pub async fn ensure_daemon_running(port: u16) -> Result<DaemonClient> {
    let client = DaemonClient::new(port);
    if client.health().await.is_ok() {
        return Ok(client);
    }

    let stale_pid_cleaned = detect_stale_pid()?;
    spawn_daemon_detached()?;

    let deadline = Instant::now() + ENSURE_RUNNING_DEADLINE;
    loop {
        if client.health().await.is_ok() {
            if stale_pid_cleaned {
                return Err(ExitError::new(5, "daemon started (stale pid file cleaned up)").into());
            }
            return Ok(client);
        }
        if Instant::now() >= deadline {
            return Err(ExitError::unreachable(format!(
                "daemon did not become ready within {ENSURE_RUNNING_DEADLINE:?}"
            ))
            .into());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// True if `daemon.pid` names a process that is no longer alive -- the CLI
/// reports this as exit code 5 once the daemon it spawns takes over and
/// removes/rewrites the file.
fn detect_stale_pid() -> Result<bool> {
    let config_dir = clud_core::config::config_dir()?;
    let pid_path = config_dir.join("daemon.pid");
    Ok(match clud_storage::lockfile::read_pid(&pid_path) {
        Some(pid) => !clud_storage::lockfile::process_alive(pid),
        None => false,
    })
}

fn spawn_daemon_detached() -> Result<()> {
    let cludd_path = find_cludd_binary()?;
    std::process::Command::new(cludd_path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;
    Ok(())
}

/// Look next to the running `clud` binary first (the common install layout),
/// falling back to `PATH`.
fn find_cludd_binary() -> Result<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("cludd");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }
    Ok(PathBuf::from("cludd"))
}
