// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! InstancePool (§4.4): a session-id → Instance map with creation, capacity
//! eviction, and a background idle sweeper. The pool owns its Instances; the
//! [`crate::router::Router`] only ever sees publish capabilities, never the
//! Instance itself — breaking the cycle the spec calls out in its design
//! notes.
//!
//! Generic over `C: Clock` the same way the cron scheduler is, so tests can
//! drive eviction and sweeping with a `FakeClock` instead of real sleeps.

use crate::credential::CredentialStore;
use crate::error::DaemonError;
use crate::instance::{AgentCommand, Instance};
use crate::router::Router;
use clud_core::{Clock, InstanceState, SessionId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub max_instances: usize,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub terminate_grace: Duration,
    pub agent_command: AgentCommand,
    /// Each session's subprocess runs with cwd `workspace_root/<session-id>`.
    pub workspace_root: PathBuf,
}

impl PoolConfig {
    pub fn defaults(agent_command: AgentCommand, workspace_root: PathBuf) -> Self {
        Self {
            max_instances: 100,
            idle_timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            terminate_grace: Duration::from_secs(5),
            agent_command,
            workspace_root,
        }
    }
}

struct PoolInner<C: Clock> {
    config: PoolConfig,
    credentials: Arc<dyn CredentialStore>,
    router: Router,
    clock: C,
    instances: Mutex<HashMap<SessionId, Arc<Instance>>>,
}

pub struct InstancePool<C: Clock> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Clock> Clone for InstancePool<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<C: Clock> InstancePool<C> {
    pub fn new(config: PoolConfig, router: Router, credentials: Arc<dyn CredentialStore>, clock: C) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                credentials,
                router,
                clock,
                instances: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the existing live Instance for `session_id`, or creates one.
    /// If a past Instance for this session crashed (`gone`), it is replaced.
    /// At capacity, evicts the idle Instance with the oldest `last_used_at`;
    /// if none are evictable, fails with `PoolSaturated` (§4.4).
    pub async fn acquire(&self, session_id: SessionId) -> Result<Arc<Instance>, DaemonError> {
        let mut guard = self.inner.instances.lock().await;

        if let Some(existing) = guard.get(&session_id) {
            if existing.state() != InstanceState::Gone {
                return Ok(existing.clone());
            }
            guard.remove(&session_id);
        }

        if guard.len() >= self.inner.config.max_instances {
            let evictable = guard
                .iter()
                .filter(|(_, inst)| inst.state() == InstanceState::Idle)
                .min_by_key(|(_, inst)| inst.last_used_at())
                .map(|(id, _)| id.clone());

            let Some(victim) = evictable else {
                return Err(DaemonError::PoolSaturated);
            };
            if let Some(inst) = guard.remove(&victim) {
                inst.terminate(self.inner.config.terminate_grace).await;
            }
        }

        let cwd = self.inner.config.workspace_root.join(session_id.as_str());
        let publisher = self.inner.router.publisher(session_id.clone());
        let now = self.inner.clock.now_unix();
        let instance = Instance::spawn(
            session_id.clone(),
            &self.inner.config.agent_command,
            &cwd,
            self.inner.credentials.as_ref(),
            publisher,
            now,
        )
        .await?;
        guard.insert(session_id, instance.clone());
        Ok(instance)
    }

    /// Mark an Instance idle and refresh its `last_used_at` (§4.4).
    pub async fn release(&self, session_id: &SessionId) {
        let guard = self.inner.instances.lock().await;
        if let Some(inst) = guard.get(session_id) {
            inst.mark_idle(self.inner.clock.now_unix());
        }
    }

    /// Terminate and remove an Instance regardless of its state.
    pub async fn drop_session(&self, session_id: &SessionId) {
        let removed = {
            let mut guard = self.inner.instances.lock().await;
            guard.remove(session_id)
        };
        if let Some(inst) = removed {
            inst.terminate(self.inner.config.terminate_grace).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.instances.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, session_id: &SessionId) -> bool {
        self.inner.instances.lock().await.contains_key(session_id)
    }

    /// Terminate and remove every Instance whose `last_used_at + idle_timeout
    /// < now` and whose state is `idle` (§4.4's background sweeper, run once
    /// here; [`InstancePool::spawn_sweeper`] calls this on a timer).
    pub async fn sweep_idle(&self) {
        let now = self.inner.clock.now_unix();
        let idle_timeout_secs = self.inner.config.idle_timeout.as_secs();

        let stale: Vec<SessionId> = {
            let guard = self.inner.instances.lock().await;
            guard
                .iter()
                .filter(|(_, inst)| {
                    inst.state() == InstanceState::Idle
                        && inst.last_used_at() + idle_timeout_secs < now
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for session_id in stale {
            tracing::info!(session_id = %session_id, "evicting idle instance");
            self.drop_session(&session_id).await;
        }
    }

    /// Spawn the background idle sweeper. Runs `sweep_idle` every
    /// `sweep_interval` until `cancel` fires.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let interval = self.inner.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => pool.sweep_idle().await,
                }
            }
        })
    }

    /// Terminate every live Instance, with `grace` per instance (daemon
    /// shutdown, §4.6).
    pub async fn terminate_all(&self, grace: Duration) {
        let instances: Vec<Arc<Instance>> = {
            let mut guard = self.inner.instances.lock().await;
            guard.drain().map(|(_, inst)| inst).collect()
        };
        for inst in instances {
            inst.terminate(grace).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::NullCredentialStore;
    use clud_core::FakeClock;

    fn pool_with_capacity(max_instances: usize) -> (InstancePool<FakeClock>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(4096, 16);
        let config = PoolConfig {
            max_instances,
            idle_timeout: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(60),
            terminate_grace: Duration::from_millis(50),
            agent_command: AgentCommand { program: "cat".into(), args: vec![] },
            workspace_root: dir.path().to_path_buf(),
        };
        let pool = InstancePool::new(config, router, Arc::new(NullCredentialStore), FakeClock::default());
        (pool, dir)
    }

    #[tokio::test]
    async fn acquire_is_idempotent_for_the_same_session() {
        let (pool, _dir) = pool_with_capacity(10);
        let sid = SessionId::new("s1");
        let a = pool.acquire(sid.clone()).await.unwrap();
        let b = pool.acquire(sid.clone()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn saturation_without_evictable_instances_fails() {
        let (pool, _dir) = pool_with_capacity(1);
        let busy = pool.acquire(SessionId::new("s1")).await.unwrap();
        busy.send("hang on").await.unwrap();

        let err = pool.acquire(SessionId::new("s2")).await.unwrap_err();
        assert!(matches!(err, DaemonError::PoolSaturated));
    }

    #[tokio::test]
    async fn saturation_evicts_the_oldest_idle_instance() {
        let (pool, _dir) = pool_with_capacity(1);
        let first = pool.acquire(SessionId::new("s1")).await.unwrap();
        pool.release(&SessionId::new("s1")).await;
        assert_eq!(first.state(), InstanceState::Idle);

        let second = pool.acquire(SessionId::new("s2")).await.unwrap();
        assert_eq!(pool.len().await, 1);
        assert!(pool.contains(&SessionId::new("s2")).await);
        assert!(!pool.contains(&SessionId::new("s1")).await);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn drop_session_terminates_and_removes() {
        let (pool, _dir) = pool_with_capacity(10);
        let sid = SessionId::new("s1");
        pool.acquire(sid.clone()).await.unwrap();
        pool.drop_session(&sid).await;
        assert!(!pool.contains(&sid).await);
    }

    #[tokio::test]
    async fn crashed_instance_is_replaced_on_next_acquire() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(4096, 16);
        let config = PoolConfig::defaults(
            AgentCommand { program: "true".into(), args: vec![] },
            dir.path().to_path_buf(),
        );
        let pool = InstancePool::new(config, router, Arc::new(NullCredentialStore), FakeClock::default());

        let sid = SessionId::new("s1");
        let first = pool.acquire(sid.clone()).await.unwrap();
        first.wait().await; // `true` exits on its own, no stdin needed

        let second = pool.acquire(sid.clone()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn sweep_idle_evicts_instances_past_idle_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(4096, 16);
        let clock = FakeClock::default();
        let config = PoolConfig {
            idle_timeout: Duration::from_secs(10),
            ..PoolConfig::defaults(AgentCommand { program: "cat".into(), args: vec![] }, dir.path().to_path_buf())
        };
        let pool = InstancePool::new(config, router, Arc::new(NullCredentialStore), clock.clone());

        let sid = SessionId::new("s1");
        pool.acquire(sid.clone()).await.unwrap();
        pool.release(&sid).await;

        clock.advance(Duration::from_secs(11));
        pool.sweep_idle().await;
        assert!(!pool.contains(&sid).await);
    }
}
