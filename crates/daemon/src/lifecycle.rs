// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown (§4.7). Grounded on the teacher's
//! `lifecycle/startup.rs` step-numbered structure and its
//! `cleanup_on_failure` idiom, with the WAL/snapshot/breadcrumb machinery
//! (not part of this specification) dropped: there is no event log here,
//! just the cron table, the agent registry, and the pool, each loaded
//! whole from `clud-storage`.

use crate::cron::{CronRuntimeConfig, CronService};
use crate::error::DaemonError;
use crate::instance::AgentCommand;
use crate::pool::{InstancePool, PoolConfig};
use crate::registry::{AgentRegistry, RegistryConfig};
use crate::router::Router;
use crate::subsystem::{EchoSubsystem, SubsystemManager};
use clud_core::{Clock, Config};
use clud_storage::{lockfile, ConfigStore, LockFile};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Everything the HTTP control plane needs, wired together. Generic over
/// the clock for the same reason [`InstancePool`] is; production wiring
/// fixes `C = SystemClock` (see [`crate::main`]), tests substitute
/// `FakeClock`.
pub struct DaemonState<C: Clock> {
    pub config: Config,
    pub router: Router,
    pub pool: InstancePool<C>,
    pub cron: CronService<C>,
    pub registry: AgentRegistry<C>,
    pub subsystems: Arc<SubsystemManager>,
    pub start_time: Instant,
    lock: LockFile,
}

impl<C: Clock> DaemonState<C> {
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn pid(&self) -> u32 {
        std::process::id()
    }
}

fn pid_path(config: &Config) -> std::path::PathBuf {
    config.config_dir.join("daemon.pid")
}

/// 1-second connect probe used both by startup's "already running" check
/// and by the CLI's `ensure_daemon_running` (§4.7).
pub async fn port_is_live(port: u16) -> bool {
    let addr = format!("127.0.0.1:{port}");
    tokio::time::timeout(Duration::from_secs(1), tokio::net::TcpStream::connect(addr)).await.is_ok_and(|r| r.is_ok())
}

/// Run the full startup sequence (§4.7 steps 1-5): stale-PID cleanup,
/// already-running detection, port claim, PID-file write, persisted-state
/// load, and background task spawn. The HTTP listener accept loop itself
/// (step 6) is the caller's job (`main.rs`/`http.rs`), so this returns the
/// bound [`TcpListener`] alongside the assembled state.
pub async fn startup<C: Clock>(config: Config, clock: C) -> Result<(DaemonState<C>, TcpListener), DaemonError> {
    if config.agent_command.is_empty() {
        return Err(DaemonError::Validation("agent_command must not be empty".into()));
    }

    std::fs::create_dir_all(&config.config_dir).map_err(DaemonError::Io)?;

    let pid_file = pid_path(&config);
    if let Some(pid) = lockfile::read_pid(&pid_file) {
        if lockfile::process_alive(pid) && port_is_live(config.daemon_port).await {
            return Err(DaemonError::Conflict("daemon already running".into()));
        }
        tracing::info!(pid, "removing stale daemon.pid");
        let _ = std::fs::remove_file(&pid_file);
    }

    let listener = TcpListener::bind(("127.0.0.1", config.daemon_port))
        .await
        .map_err(|e| DaemonError::Conflict(format!("port {} busy: {e}", config.daemon_port)))?;

    let lock = LockFile::acquire(&pid_file).map_err(DaemonError::Storage)?;

    let store = Arc::new(ConfigStore::new(config.config_dir.clone()));
    store.ensure_dir().map_err(DaemonError::Storage)?;

    let router = Router::new(config.per_session_ring_bytes, config.subscriber_channel_capacity);

    let program = config.agent_command[0].clone();
    let args = config.agent_command[1..].to_vec();
    let pool_config = PoolConfig {
        max_instances: config.max_instances,
        idle_timeout: config.idle_timeout,
        sweep_interval: config.sweep_interval,
        terminate_grace: config.terminate_grace,
        agent_command: AgentCommand { program, args },
        workspace_root: config.config_dir.join("workspaces"),
    };
    let pool = InstancePool::new(
        pool_config,
        router.clone(),
        Arc::new(crate::credential::NullCredentialStore),
        clock.clone(),
    );

    let cron = CronService::load(
        store.clone(),
        pool.clone(),
        clock.clone(),
        CronRuntimeConfig {
            retry_attempts: config.cron_retry_attempts,
            retry_base: config.cron_retry_base,
            logs_dir: config.config_dir.join("logs"),
        },
    )?;

    let registry_config = RegistryConfig {
        stale_threshold: config.stale_threshold,
        stale_scan_interval: config.stale_scan_interval,
        retention_window: config.retention_window,
    };
    let registry = AgentRegistry::load(store, clock, registry_config)?;

    let mut subsystems = SubsystemManager::new(config.terminate_grace);
    subsystems.register("echo", Arc::new(EchoSubsystem::default()));

    tracing::info!(port = config.daemon_port, pid = std::process::id(), "daemon started");

    let state = DaemonState {
        lock,
        config,
        router,
        pool,
        cron,
        registry,
        subsystems: Arc::new(subsystems),
        start_time: Instant::now(),
    };
    Ok((state, listener))
}

/// Spawn the three background loops (scheduler, pool sweeper, staleness
/// scanner) under one [`CancellationToken`], tracked so shutdown can await
/// them (§5's "cron executions are spawned as independent tasks and
/// tracked so shutdown can await them").
pub fn spawn_background_tasks<C: Clock>(state: &DaemonState<C>, cancel: CancellationToken) -> TaskTracker {
    let tracker = TaskTracker::new();
    tracker.spawn({
        let cron = state.cron.clone();
        let cancel = cancel.clone();
        async move { cron.spawn(cancel).await.ok(); }
    });
    tracker.spawn({
        let pool = state.pool.clone();
        let cancel = cancel.clone();
        pool.spawn_sweeper(cancel)
    });
    tracker.spawn({
        let registry = state.registry.clone();
        registry.spawn_scanner(cancel)
    });
    tracker.close();
    tracker
}

/// Shut down: stop accepting new work, terminate every Instance with
/// `terminate_grace`, stop every subsystem, and let the caller drop the
/// `DaemonState` (its `LockFile` removes `daemon.pid` on drop) (§4.7).
pub async fn shutdown<C: Clock>(state: &DaemonState<C>, background: CancellationToken, tracker: TaskTracker) {
    background.cancel();
    state.pool.terminate_all(state.config.terminate_grace).await;
    state.subsystems.stop_all().await;

    if tokio::time::timeout(state.config.shutdown_grace, tracker.wait()).await.is_err() {
        tracing::warn!("background tasks did not join within shutdown_grace");
    }
}

/// Wait for SIGINT or SIGTERM. A second signal received while the caller is
/// already inside `shutdown` forces an immediate exit (§4.7).
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler, SIGINT only");
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Race `shutdown_fut` against a second shutdown signal; forces the process
/// to exit immediately if the second signal wins.
pub async fn run_until_second_signal<F: std::future::Future<Output = ()>>(shutdown_fut: F) {
    tokio::select! {
        _ = shutdown_fut => {},
        _ = wait_for_shutdown_signal() => {
            tracing::warn!("second shutdown signal received, forcing exit");
            std::process::exit(130);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clud_core::FakeClock;

    fn test_config(dir: &std::path::Path, port: u16) -> Config {
        Config {
            config_dir: dir.to_path_buf(),
            daemon_port: port,
            agent_command: vec!["cat".into()],
            ..Config::default()
        }
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn startup_rejects_empty_agent_command() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port().await;
        let mut config = test_config(dir.path(), port);
        config.agent_command = vec![];
        let err = startup(config, FakeClock::default()).await.unwrap_err();
        assert!(matches!(err, DaemonError::Validation(_)));
    }

    #[tokio::test]
    async fn startup_writes_a_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port().await;
        let config = test_config(dir.path(), port);
        let (state, _listener) = startup(config, FakeClock::default()).await.unwrap();
        assert_eq!(lockfile::read_pid(&dir.path().join("daemon.pid")), Some(std::process::id()));
        drop(state);
        assert!(!dir.path().join("daemon.pid").exists());
    }

    #[tokio::test]
    async fn second_startup_on_the_same_port_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port().await;
        let (state, _listener) = startup(test_config(dir.path(), port), FakeClock::default()).await.unwrap();

        // The first startup's daemon.pid still names this live process, so
        // the stale-PID check doesn't remove it; the second startup then
        // fails claiming the same port, which is already bound.
        let err = startup(test_config(dir.path(), port), FakeClock::default()).await.unwrap_err();
        assert!(matches!(err, DaemonError::Conflict(_)));
        drop(state);
    }

    #[tokio::test]
    async fn stale_pid_file_is_removed_before_claiming() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port().await;
        std::fs::write(dir.path().join("daemon.pid"), "999999999\n").unwrap();

        let (state, _listener) = startup(test_config(dir.path(), port), FakeClock::default()).await.unwrap();
        assert_eq!(lockfile::read_pid(&dir.path().join("daemon.pid")), Some(std::process::id()));
        drop(state);
    }
}
