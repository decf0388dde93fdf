// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clud cron` - add/list/rm/enable/disable (§6.1, §4.3.1).
//!
//! Grounded on `oj-cli/src/commands/cron.rs`'s subcommand shape, adapted
//! from the teacher's start/stop/once verbs (which address a runbook's
//! named cron entry) to this crate's CRUD-over-HTTP surface, since cron
//! tasks here are created and addressed by an opaque id rather than looked
//! up by name inside a project's runbook.

use crate::client::DaemonClient;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct CronArgs {
    #[command(subcommand)]
    pub command: CronCommand,
}

#[derive(Subcommand)]
pub enum CronCommand {
    /// Schedule a new cron task
    Add {
        /// Five-field cron expression, e.g. "*/15 * * * *"
        expression: String,
        /// Path to the prompt file run on each fire
        task_file: String,
    },
    /// List all scheduled cron tasks
    List,
    /// Remove a cron task
    Rm {
        /// Cron task id
        id: String,
    },
    /// Re-enable a cron task that was added or auto-disabled
    Enable {
        /// Cron task id
        id: String,
    },
    /// Disable a cron task without removing it
    Disable {
        /// Cron task id
        id: String,
    },
}

pub async fn run(args: CronArgs, client: &DaemonClient) -> Result<()> {
    match args.command {
        CronCommand::Add { expression, task_file } => {
            let (id, next_run) = client.add_cron(&expression, &task_file).await?;
            println!("Added cron task {id}");
            if let Some(next_run) = next_run {
                println!("Next run: {next_run}");
            }
        }
        CronCommand::List => {
            let mut tasks = client.list_cron().await?;
            if tasks.is_empty() {
                println!("No cron tasks");
                return Ok(());
            }
            tasks.sort_by(|a, b| a.id.cmp(&b.id));
            for task in &tasks {
                let state = if task.enabled { "enabled" } else { "disabled" };
                println!(
                    "{}  {}  {}  {}  failures={}",
                    task.id, task.expression, state, task.task_file, task.consecutive_failures
                );
            }
        }
        CronCommand::Rm { id } => {
            client.remove_cron(&id).await?;
            println!("Removed cron task {id}");
        }
        CronCommand::Enable { id } => {
            client.enable_cron(&id).await?;
            println!("Enabled cron task {id}");
        }
        CronCommand::Disable { id } => {
            client.disable_cron(&id).await?;
            println!("Disabled cron task {id}");
        }
    }
    Ok(())
}
