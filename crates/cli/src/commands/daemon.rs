// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clud daemon` - start/stop/restart/status/logs (§6.1).
//!
//! Grounded on `oj-cli/src/commands/daemon.rs`'s subcommand shape
//! (`start`/`stop`/`restart`/`status`/`logs`) and its `find_ojd_binary`
//! sibling-of-the-current-executable lookup (reused here via
//! `crate::client`'s `ensure_daemon_running`). Stopping the daemon has no
//! HTTP counterpart -- there is no `/shutdown` route -- so it goes straight
//! to the PID recorded in `daemon.pid` and a `SIGTERM`, mirroring the
//! teacher's `daemon_stop` helper but over a signal instead of the IPC
//! socket's own stop message.

use crate::client::{ensure_daemon_running, DaemonClient};
use crate::exit_error::ExitError;
use anyhow::Result;
use clap::{Args, Subcommand};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader};
use std::time::{Duration, Instant};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommand,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon if it isn't already running
    Start,
    /// Stop the running daemon
    Stop,
    /// Stop then start the daemon
    Restart,
    /// Check whether the daemon is running
    Status,
    /// Print the tail of the daemon's log file
    Logs {
        /// Number of recent lines to show
        #[arg(short = 'n', long, default_value = "200")]
        lines: usize,
    },
}

pub async fn run(args: DaemonArgs, port: u16) -> Result<()> {
    match args.command {
        DaemonCommand::Start => start(port).await,
        DaemonCommand::Stop => stop().await,
        DaemonCommand::Restart => {
            stop().await?;
            start(port).await
        }
        DaemonCommand::Status => status(port).await,
        DaemonCommand::Logs { lines } => logs(lines),
    }
}

async fn start(port: u16) -> Result<()> {
    let client = DaemonClient::new(port);
    if client.health().await.is_ok() {
        return Err(ExitError::already_running("daemon already running").into());
    }
    ensure_daemon_running(port).await?;
    println!("Daemon started");
    Ok(())
}

async fn stop() -> Result<()> {
    let pid_path = pid_file_path()?;
    let pid = match clud_storage::lockfile::read_pid(&pid_path) {
        Some(pid) if clud_storage::lockfile::process_alive(pid) => pid,
        _ => {
            println!("Daemon not running");
            return Ok(());
        }
    };

    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| ExitError::unreachable(format!("failed to signal pid {pid}: {e}")))?;

    let deadline = Instant::now() + STOP_DEADLINE;
    while clud_storage::lockfile::process_alive(pid) {
        if Instant::now() >= deadline {
            return Err(ExitError::unreachable(format!(
                "daemon (pid {pid}) did not exit within {STOP_DEADLINE:?}"
            ))
            .into());
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }

    println!("Daemon stopped");
    Ok(())
}

async fn status(port: u16) -> Result<()> {
    let client = DaemonClient::new(port);
    match client.health().await {
        Ok(health) => {
            println!("Status: {}", health.status);
            println!("PID: {}", health.pid);
            println!("Uptime: {}s", health.uptime_seconds);
        }
        Err(_) => println!("Daemon not running"),
    }
    Ok(())
}

fn logs(lines: usize) -> Result<()> {
    let config_dir = clud_core::config::config_dir()?;
    let log_path = config_dir.join("logs").join("daemon.log");
    if !log_path.exists() {
        println!("No log file found at {}", log_path.display());
        return Ok(());
    }
    let file = std::fs::File::open(&log_path)?;
    let all_lines: Vec<String> = BufReader::new(file).lines().collect::<std::io::Result<_>>()?;
    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{line}");
    }
    Ok(())
}

fn pid_file_path() -> Result<std::path::PathBuf> {
    Ok(clud_core::config::config_dir()?.join("daemon.pid"))
}
