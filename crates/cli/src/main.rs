// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clud` - control-plane CLI for `cludd` (§6/§6.1).
//!
//! Grounded on `oj-cli`'s top-level dispatch shape (one `Commands` enum,
//! one async handler per variant) with the exit-code mapping from
//! `oj-cli/src/exit_error.rs` preserved verbatim: commands return
//! `anyhow::Result<()>`, and any `ExitError` downcast out of the top-level
//! error determines the process exit code instead of the usual "any error
//! is exit code 1".

mod client;
mod commands;
mod exit_error;

use clap::{Parser, Subcommand};
use exit_error::ExitError;

#[derive(Parser)]
#[command(
    name = "clud",
    version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")),
    about = "Developer workstation control plane CLI"
)]
struct Cli {
    /// Daemon port, overriding CLUD_DAEMON_PORT and the config.toml default
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the cludd daemon process
    Daemon(commands::daemon::DaemonArgs),
    /// Manage scheduled cron tasks
    Cron(commands::cron::CronArgs),
    /// Inspect and control registered agents
    Agent(commands::agent::AgentArgs),
    /// Send text to a session's agent
    Send {
        /// Session id
        session_id: String,
        /// Text to send
        text: String,
    },
    /// Stream a session's output to stdout
    Attach {
        /// Session id
        session_id: String,
    },
}

fn resolve_port(cli_port: Option<u16>) -> u16 {
    cli_port.or_else(clud_core::config::daemon_port_env).unwrap_or_else(|| clud_core::Config::default().daemon_port)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let port = resolve_port(cli.port);

    let result = run(cli.command, port).await;

    if let Err(err) = result {
        match err.downcast_ref::<ExitError>() {
            Some(exit_err) => {
                eprintln!("{exit_err}");
                std::process::exit(exit_err.code);
            }
            None => {
                eprintln!("error: {err:#}");
                std::process::exit(1);
            }
        }
    }
}

async fn run(command: Commands, port: u16) -> anyhow::Result<()> {
    match command {
        Commands::Daemon(args) => commands::daemon::run(args, port).await,
        Commands::Cron(args) => {
            let client = client::ensure_daemon_running(port).await?;
            commands::cron::run(args, &client).await
        }
        Commands::Agent(args) => {
            let client = client::ensure_daemon_running(port).await?;
            commands::agent::run(args, &client).await
        }
        Commands::Send { session_id, text } => {
            let client = client::ensure_daemon_running(port).await?;
            commands::session::send(&client, &session_id, &text).await
        }
        Commands::Attach { session_id } => {
            let client = client::ensure_daemon_running(port).await?;
            commands::session::attach(&client, &session_id).await
        }
    }
}
