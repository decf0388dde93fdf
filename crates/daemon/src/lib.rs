// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! clud-daemon: the long-running control-plane process (`cludd`). Owns the
//! instance pool, the per-session router, the cron scheduler, the agent
//! registry, and the subsystem manager, and exposes all of it over HTTP.

pub mod credential;
pub mod cron;
pub mod error;
pub mod http;
pub mod instance;
pub mod lifecycle;
pub mod logging;
pub mod pool;
pub mod registry;
pub mod router;
pub mod subsystem;

pub use credential::{CredentialStore, NullCredentialStore};
pub use cron::{CronRuntimeConfig, CronService};
pub use error::DaemonError;
pub use http::router;
pub use instance::{AgentCommand, Instance};
pub use lifecycle::{
    port_is_live, run_until_second_signal, shutdown, spawn_background_tasks, startup,
    wait_for_shutdown_signal, DaemonState,
};
pub use pool::{InstancePool, PoolConfig};
pub use registry::{AgentRegistry, RegistryConfig};
pub use router::{Frame, Publisher, Router};
pub use subsystem::{EchoSubsystem, Subsystem, SubsystemManager, SubsystemStatus};
