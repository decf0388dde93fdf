// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry (§4.6): a persisted `(agent-id -> state)` store updated by
//! external CLIs via heartbeat, with a background staleness scanner and
//! retention-window eviction.
//!
//! Grounded on the teacher's `storage/state/agents.rs` event handlers for
//! the state-transition shape (`running` -> `idle`/`stale`/`gone`-style
//! status flips driven by external signals rather than internal polling of
//! the agent itself) but generalized to the spec's simpler CRUD surface:
//! this registry has no event log or owner/job linkage, just
//! register/heartbeat/stop plus the staleness sweep.

use crate::error::DaemonError;
use clud_core::{AgentRecord, AgentState, Clock};
use clud_storage::{ConfigStore, RegistryDocument};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub stale_threshold: Duration,
    pub stale_scan_interval: Duration,
    pub retention_window: Duration,
}

struct RegistryInner<C: Clock> {
    clock: C,
    store: Arc<ConfigStore>,
    config: RegistryConfig,
    agents: Mutex<HashMap<String, AgentRecord>>,
}

/// Owns the persisted agent table and the background staleness scanner.
/// Cheap to clone (an `Arc` inside).
pub struct AgentRegistry<C: Clock> {
    inner: Arc<RegistryInner<C>>,
}

impl<C: Clock> Clone for AgentRegistry<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<C: Clock> AgentRegistry<C> {
    pub fn load(store: Arc<ConfigStore>, clock: C, config: RegistryConfig) -> Result<Self, DaemonError> {
        let doc = store.load_registry()?;
        let agents = doc.agents.into_iter().map(|rec| (rec.id.clone(), rec)).collect();
        Ok(Self { inner: Arc::new(RegistryInner { clock, store, config, agents: Mutex::new(agents) }) })
    }

    /// Assign (or accept an externally chosen) id and record
    /// `{pid, started_at=now, last_heartbeat=now, state=running}` (§4.6).
    /// Re-registering an existing id resets it to `running`.
    pub fn register(&self, id: Option<String>, pid: u32, metadata: BTreeMap<String, String>) -> AgentRecord {
        let now = self.inner.clock.now_unix();
        let id = id.unwrap_or_else(|| clud_core::new_id("agent"));
        let record = AgentRecord::new(id.clone(), pid, now, metadata);

        self.inner.agents.lock().insert(id, record.clone());
        self.persist();
        record
    }

    /// Refresh `last_heartbeat = now`; flips a `stale` record back to
    /// `running` (§4.6). `stopped` records are never auto-unstopped.
    pub fn heartbeat(&self, id: &str) -> Result<AgentRecord, DaemonError> {
        let now = self.inner.clock.now_unix();
        let record = {
            let mut agents = self.inner.agents.lock();
            let record = agents.get_mut(id).ok_or_else(|| DaemonError::NotFound(format!("agent {id:?}")))?;
            record.last_heartbeat = now;
            if record.state == AgentState::Stale {
                record.state = AgentState::Running;
            }
            record.clone()
        };
        self.persist();
        Ok(record)
    }

    pub fn stop(&self, id: &str) -> Result<AgentRecord, DaemonError> {
        let record = {
            let mut agents = self.inner.agents.lock();
            let record = agents.get_mut(id).ok_or_else(|| DaemonError::NotFound(format!("agent {id:?}")))?;
            record.state = AgentState::Stopped;
            record.clone()
        };
        self.persist();
        Ok(record)
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        self.inner.agents.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<AgentRecord> {
        self.inner.agents.lock().get(id).cloned()
    }

    /// `{total, running, stale}` for `GET /health` (§6).
    pub fn counts(&self) -> (usize, usize, usize) {
        let agents = self.inner.agents.lock();
        let total = agents.len();
        let running = agents.values().filter(|a| a.state == AgentState::Running).count();
        let stale = agents.values().filter(|a| a.state == AgentState::Stale).count();
        (total, running, stale)
    }

    /// Flip `running` records past `stale_threshold` to `stale`, then prune
    /// `stopped`/`stale` records past `retention_window` (§4.6).
    pub fn scan(&self) {
        let now = self.inner.clock.now_unix();
        let stale_threshold = self.inner.config.stale_threshold.as_secs();
        let retention_window = self.inner.config.retention_window.as_secs();

        let mut agents = self.inner.agents.lock();
        for record in agents.values_mut() {
            if record.is_newly_stale(now, stale_threshold) {
                record.state = AgentState::Stale;
                tracing::info!(agent_id = %record.id, "agent marked stale");
            }
        }
        agents.retain(|_, record| {
            let evict = record.is_evictable(now, retention_window);
            if evict {
                tracing::info!(agent_id = %record.id, "evicting retired agent record");
            }
            !evict
        });
        drop(agents);
        self.persist();
    }

    /// Spawn the background staleness scanner. Runs `scan` every
    /// `stale_scan_interval` until `cancel` fires.
    pub fn spawn_scanner(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        let interval = self.inner.config.stale_scan_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => registry.scan(),
                }
            }
        })
    }

    fn persist(&self) {
        let doc = RegistryDocument { agents: self.list() };
        if let Err(e) = self.inner.store.save_registry(&doc) {
            tracing::error!(error = %e, "failed to persist agent registry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clud_core::FakeClock;

    fn registry(dir: &std::path::Path) -> AgentRegistry<FakeClock> {
        let store = Arc::new(ConfigStore::new(dir.join("config")));
        let config = RegistryConfig {
            stale_threshold: Duration::from_secs(60),
            stale_scan_interval: Duration::from_secs(30),
            retention_window: Duration::from_secs(24 * 3600),
        };
        AgentRegistry::load(store, FakeClock::default(), config).unwrap()
    }

    #[test]
    fn register_assigns_an_id_when_none_given() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let record = reg.register(None, 4242, BTreeMap::new());
        assert!(record.id.starts_with("agent_"));
        assert_eq!(record.state, AgentState::Running);
    }

    #[test]
    fn register_accepts_an_externally_chosen_id() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let record = reg.register(Some("caller-chosen".into()), 1, BTreeMap::new());
        assert_eq!(record.id, "caller-chosen");
        assert!(reg.get("caller-chosen").is_some());
    }

    #[test]
    fn heartbeat_on_unknown_agent_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        assert!(matches!(reg.heartbeat("nope").unwrap_err(), DaemonError::NotFound(_)));
    }

    #[test]
    fn heartbeat_revives_a_stale_agent() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let record = reg.register(None, 1, BTreeMap::new());
        reg.inner.agents.lock().get_mut(&record.id).unwrap().state = AgentState::Stale;

        let revived = reg.heartbeat(&record.id).unwrap();
        assert_eq!(revived.state, AgentState::Running);
    }

    #[test]
    fn stop_never_auto_revives() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let record = reg.register(None, 1, BTreeMap::new());
        reg.stop(&record.id).unwrap();

        let after = reg.heartbeat(&record.id).unwrap();
        assert_eq!(after.state, AgentState::Stopped);
    }

    #[test]
    fn scan_marks_stale_then_evicts_after_retention_window() {
        let dir = tempfile::tempdir().unwrap();
        let clock = FakeClock::default();
        let store = Arc::new(ConfigStore::new(dir.path().join("config")));
        let config = RegistryConfig {
            stale_threshold: Duration::from_secs(60),
            stale_scan_interval: Duration::from_secs(30),
            retention_window: Duration::from_secs(100),
        };
        let reg = AgentRegistry::load(store, clock.clone(), config).unwrap();
        let record = reg.register(None, 1, BTreeMap::new());

        clock.advance(Duration::from_secs(61));
        reg.scan();
        assert_eq!(reg.get(&record.id).unwrap().state, AgentState::Stale);

        clock.advance(Duration::from_secs(100));
        reg.scan();
        assert!(reg.get(&record.id).is_none());
    }

    #[test]
    fn counts_reflect_running_and_stale() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.register(None, 1, BTreeMap::new());
        let stale_one = reg.register(None, 2, BTreeMap::new());
        reg.inner.agents.lock().get_mut(&stale_one.id).unwrap().state = AgentState::Stale;

        let (total, running, stale) = reg.counts();
        assert_eq!((total, running, stale), (2, 1, 1));
    }
}
