// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clud agent` - list/get/stop (§6.1).
//!
//! Grounded on `oj-cli/src/commands/agent/mod.rs`'s `list`/`show` pair,
//! trimmed to this crate's flatter agent model (no per-job grouping, no
//! peek/wait/hooks -- this registry is a heartbeat table, not the
//! teacher's event-sourced agent timeline).

use crate::client::DaemonClient;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommand,
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List registered agents
    List,
    /// Show a single agent's record
    Get {
        /// Agent id
        id: String,
    },
    /// Stop a registered agent
    Stop {
        /// Agent id
        id: String,
    },
}

pub async fn run(args: AgentArgs, client: &DaemonClient) -> Result<()> {
    match args.command {
        AgentCommand::List => {
            let mut agents = client.list_agents().await?;
            if agents.is_empty() {
                println!("No registered agents");
                return Ok(());
            }
            agents.sort_by(|a, b| a.id.cmp(&b.id));
            for agent in &agents {
                println!(
                    "{}  pid={}  state={:?}  last_heartbeat={}",
                    agent.id, agent.pid, agent.state, agent.last_heartbeat
                );
            }
        }
        AgentCommand::Get { id } => {
            let agent = client.get_agent(&id).await?;
            println!("id: {}", agent.id);
            println!("pid: {}", agent.pid);
            println!("state: {:?}", agent.state);
            println!("started_at: {}", agent.started_at);
            println!("last_heartbeat: {}", agent.last_heartbeat);
            for (key, value) in &agent.metadata {
                println!("  {key}: {value}");
            }
        }
        AgentCommand::Stop { id } => {
            client.stop_agent(&id).await?;
            println!("Stopped agent {id}");
        }
    }
    Ok(())
}
