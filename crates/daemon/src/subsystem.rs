// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subsystem harness (§4.8): background services that run inside the
//! daemon so they outlive the launching terminal (e.g. a chat-bot polling
//! loop). Each subsystem gets its own task group, isolated from the others;
//! the only object they share is the [`crate::router::Router`].
//!
//! Grounded on the teacher's `CancellationToken`-races-the-handler idiom in
//! `listener/mod.rs` (one token per unit of work, cooperative cancellation
//! via `tokio::select!`) generalized from per-connection scope to
//! per-subsystem scope: here the token spans the subsystem's whole
//! lifetime rather than a single request.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A snapshot of one subsystem's liveness, returned by `status` (§6's
/// `GET /subsystems/{name}/status`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubsystemStatus {
    pub running: bool,
    pub details: Value,
}

/// A background service hosted by the daemon. Implementations own their own
/// event loop; `run` is expected to honor `cancel` cooperatively and return
/// once cancelled or once the loop has nothing left to do.
#[async_trait]
pub trait Subsystem: Send + Sync {
    async fn run(&self, config: Value, cancel: CancellationToken);

    /// Details merged into the `status` response while running. Defaults to
    /// an empty object.
    fn details(&self) -> Value {
        Value::Object(Default::default())
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Name -> handle map owned by the daemon supervisor. `start`/`stop`/
/// `status` are idempotent (§4.8).
pub struct SubsystemManager {
    registry: HashMap<String, Arc<dyn Subsystem>>,
    running: Mutex<HashMap<String, Running>>,
    terminate_grace: Duration,
}

impl SubsystemManager {
    pub fn new(terminate_grace: Duration) -> Self {
        Self { registry: HashMap::new(), running: Mutex::new(HashMap::new()), terminate_grace }
    }

    pub fn register(&mut self, name: impl Into<String>, subsystem: Arc<dyn Subsystem>) {
        self.registry.insert(name.into(), subsystem);
    }

    /// Start `name` with `config`; returns `already_running` (not an error)
    /// if it is already up (§4.8).
    pub async fn start(&self, name: &str, config: Value) -> Result<&'static str, SubsystemError> {
        let subsystem = self.registry.get(name).ok_or_else(|| SubsystemError::Unknown(name.to_string()))?.clone();

        let mut running = self.running.lock().await;
        if running.contains_key(name) {
            return Ok("already_running");
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move { subsystem.run(config, task_cancel).await });
        running.insert(name.to_string(), Running { cancel, handle });
        Ok("started")
    }

    /// Idempotent: stopping a subsystem that is not running is a no-op
    /// returning `not_running` (§4.8).
    pub async fn stop(&self, name: &str) -> Result<&'static str, SubsystemError> {
        if !self.registry.contains_key(name) {
            return Err(SubsystemError::Unknown(name.to_string()));
        }

        let entry = self.running.lock().await.remove(name);
        let Some(entry) = entry else {
            return Ok("not_running");
        };

        entry.cancel.cancel();
        match tokio::time::timeout(self.terminate_grace, entry.handle).await {
            Ok(_) => Ok("stopped"),
            Err(_) => {
                tracing::warn!(subsystem = name, "subsystem did not join within terminate_grace");
                Ok("stopped")
            }
        }
    }

    pub async fn status(&self, name: &str) -> Result<SubsystemStatus, SubsystemError> {
        let subsystem = self.registry.get(name).ok_or_else(|| SubsystemError::Unknown(name.to_string()))?;
        let running = self.running.lock().await.contains_key(name);
        Ok(SubsystemStatus { running, details: subsystem.details() })
    }

    /// Stop every running subsystem, for daemon shutdown (§4.7).
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.running.lock().await.keys().cloned().collect();
        for name in names {
            let _ = self.stop(&name).await;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubsystemError {
    #[error("unknown subsystem {0:?}")]
    Unknown(String),
}

/// A trivial subsystem used to exercise the harness end-to-end without the
/// real chat-bot poller (out of scope, §1): counts ticks until cancelled.
pub struct EchoSubsystem {
    ticks: Arc<std::sync::atomic::AtomicU64>,
}

impl Default for EchoSubsystem {
    fn default() -> Self {
        Self { ticks: Arc::new(std::sync::atomic::AtomicU64::new(0)) }
    }
}

impl EchoSubsystem {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Subsystem for EchoSubsystem {
    async fn run(&self, _config: Value, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(10)) => {
                    self.ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }
        }
    }

    fn details(&self) -> Value {
        serde_json::json!({ "ticks": self.ticks() })
    }
}
