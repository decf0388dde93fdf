// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted and in-memory record types shared across the workspace:
//! [`CronTask`], [`AgentRecord`], and the small state enums each carries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scheduled task: a cron expression paired with a prompt file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronTask {
    pub id: String,
    pub expression: String,
    pub task_file: String,
    pub enabled: bool,
    pub created_at: u64,
    pub last_run: Option<u64>,
    pub next_run: Option<u64>,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<u64>,
}

impl CronTask {
    /// Auto-disable threshold: three exhausted fires in a row.
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

    pub fn new(id: String, expression: String, task_file: String, created_at: u64) -> Self {
        Self {
            id,
            expression,
            task_file,
            enabled: true,
            created_at,
            last_run: None,
            next_run: None,
            consecutive_failures: 0,
            last_failure_time: None,
        }
    }

    /// Record a completed-failed fire (all retries exhausted): bump the
    /// counter and auto-disable once it reaches [`Self::MAX_CONSECUTIVE_FAILURES`].
    pub fn record_failure(&mut self, now: u64) {
        self.consecutive_failures += 1;
        self.last_failure_time = Some(now);
        if self.consecutive_failures >= Self::MAX_CONSECUTIVE_FAILURES {
            self.enabled = false;
        }
    }

    /// Record a successful fire: reset the failure counter.
    pub fn record_success(&mut self, now: u64) {
        self.consecutive_failures = 0;
        self.last_run = Some(now);
    }
}

/// Liveness state of a registered agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Running,
    Stopped,
    Stale,
}

/// A registered external agent process tracked by heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub pid: u32,
    pub started_at: u64,
    pub last_heartbeat: u64,
    pub state: AgentState,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AgentRecord {
    pub fn new(id: String, pid: u32, now: u64, metadata: BTreeMap<String, String>) -> Self {
        Self { id, pid, started_at: now, last_heartbeat: now, state: AgentState::Running, metadata }
    }

    /// True iff this record should be flipped to `stale`: running, and the
    /// heartbeat gap exceeds `stale_threshold_secs`.
    pub fn is_newly_stale(&self, now: u64, stale_threshold_secs: u64) -> bool {
        self.state == AgentState::Running && now.saturating_sub(self.last_heartbeat) > stale_threshold_secs
    }

    /// True iff this record is old enough to prune (stopped or stale, past
    /// its retention window, measured from its last heartbeat).
    pub fn is_evictable(&self, now: u64, retention_window_secs: u64) -> bool {
        matches!(self.state, AgentState::Stopped | AgentState::Stale)
            && now.saturating_sub(self.last_heartbeat) > retention_window_secs
    }
}

/// Lifecycle state of a pooled subprocess instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Starting,
    Idle,
    Busy,
    Terminating,
    Gone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_failures_auto_disable() {
        let mut task = CronTask::new("c1".into(), "* * * * *".into(), "/tmp/t".into(), 0);
        task.record_failure(10);
        task.record_failure(20);
        assert!(task.enabled);
        task.record_failure(30);
        assert!(!task.enabled);
        assert_eq!(task.consecutive_failures, 3);
    }

    #[test]
    fn success_resets_counter() {
        let mut task = CronTask::new("c1".into(), "* * * * *".into(), "/tmp/t".into(), 0);
        task.record_failure(10);
        task.record_failure(20);
        task.record_success(30);
        assert_eq!(task.consecutive_failures, 0);
        assert_eq!(task.last_run, Some(30));
    }

    #[test]
    fn agent_goes_stale_after_threshold() {
        let agent = AgentRecord::new("a1".into(), 123, 0, BTreeMap::new());
        assert!(!agent.is_newly_stale(60, 60));
        assert!(agent.is_newly_stale(61, 60));
    }

    #[test]
    fn stopped_agent_never_goes_stale() {
        let mut agent = AgentRecord::new("a1".into(), 123, 0, BTreeMap::new());
        agent.state = AgentState::Stopped;
        assert!(!agent.is_newly_stale(1_000_000, 60));
    }

    #[test]
    fn eviction_requires_retention_window_elapsed() {
        let mut agent = AgentRecord::new("a1".into(), 123, 0, BTreeMap::new());
        agent.state = AgentState::Stale;
        assert!(!agent.is_evictable(100, 24 * 3600));
        assert!(agent.is_evictable(24 * 3600 + 1, 24 * 3600));
    }
}
