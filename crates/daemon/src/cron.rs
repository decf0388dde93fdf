// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron scheduler and CRUD surface (§4.3/§4.3.1): a single loop re-selecting
//! the task with the smallest `next_run`, sleeping until it fires (capped at
//! a one-hour ceiling), executing with retry/backoff, and persisting the
//! updated task table after every fire.
//!
//! Grounded on the shape of a sibling example's per-job scheduler (one
//! `MAX_CONSECUTIVE_FAILURES`-style constant, a drop-guard releasing an
//! in-flight flag) but restructured around a single shared loop rather than
//! one timer per job, since the spec calls for one scheduler re-selecting
//! the smallest `next_run` across the whole table rather than N independent
//! interval timers.

use crate::error::DaemonError;
use crate::pool::InstancePool;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clud_core::{cron_session_id, Clock, CronExpression, CronTask, SessionId};
use clud_storage::{ConfigStore, CronDocument};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const WAKE_CEILING: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug)]
pub struct CronRuntimeConfig {
    pub retry_attempts: u32,
    pub retry_base: Duration,
    pub logs_dir: PathBuf,
}

struct CronInner<C: Clock> {
    clock: C,
    store: Arc<ConfigStore>,
    pool: InstancePool<C>,
    config: CronRuntimeConfig,
    tasks: Mutex<HashMap<String, CronTask>>,
    wake: Notify,
}

/// Owns the persisted cron table and the background scheduler loop. Cheap
/// to clone (an `Arc` inside).
pub struct CronService<C: Clock> {
    inner: Arc<CronInner<C>>,
}

impl<C: Clock> Clone for CronService<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<C: Clock> CronService<C> {
    /// Load the persisted task table and recompute `next_run` for any task
    /// whose `next_run` is in the past or unset (crash recovery, §4.3: "Do
    /// not replay missed fires"). Tasks whose `task_file` no longer exists
    /// are kept (`enabled` untouched) with a warning logged.
    pub fn load(
        store: Arc<ConfigStore>,
        pool: InstancePool<C>,
        clock: C,
        config: CronRuntimeConfig,
    ) -> Result<Self, DaemonError> {
        let doc = store.load_cron()?;
        let now = clock.now_unix();
        let mut tasks = HashMap::new();
        for mut task in doc.tasks {
            if !std::path::Path::new(&task.task_file).exists() {
                tracing::warn!(cron_id = %task.id, task_file = %task.task_file, "cron task_file missing at startup");
            }
            if task.enabled && task.next_run.is_none_or(|n| n <= now) {
                task.next_run = compute_next_run(&task.expression, now);
            }
            tasks.insert(task.id.clone(), task);
        }

        let service = Self {
            inner: Arc::new(CronInner {
                clock,
                store,
                pool,
                config,
                tasks: Mutex::new(tasks),
                wake: Notify::new(),
            }),
        };
        service.persist();
        Ok(service)
    }

    /// Validate `expression`, mint an id, compute the initial `next_run`,
    /// persist, and wake the scheduler loop (§4.3.1).
    pub fn add(&self, expression: String, task_file: String) -> Result<CronTask, DaemonError> {
        let expr = CronExpression::parse(&expression)?;
        let now = self.inner.clock.now_unix();
        let next = expr.next_fire(epoch_to_local_naive(now)).ok_or_else(|| {
            DaemonError::InvalidCron(clud_core::CronError::new(
                "expression",
                &expression,
                "no matching fire time within the four-year search window",
            ))
        })?;

        let mut task = CronTask::new(clud_core::new_id("cron"), expression, task_file, now);
        task.next_run = Some(to_epoch(next));

        let mut tasks = self.inner.tasks.lock();
        tasks.insert(task.id.clone(), task.clone());
        drop(tasks);
        self.persist();
        self.inner.wake.notify_one();
        Ok(task)
    }

    /// Delete a task and persist; wakes the loop so a removed currently-
    /// selected task does not linger until the next ceiling wakeup.
    pub fn remove(&self, id: &str) -> Result<(), DaemonError> {
        let removed = {
            let mut tasks = self.inner.tasks.lock();
            tasks.remove(id).is_some()
        };
        if !removed {
            return Err(DaemonError::NotFound(format!("cron task {id:?}")));
        }
        self.persist();
        self.inner.wake.notify_one();
        Ok(())
    }

    pub fn list(&self) -> Vec<CronTask> {
        self.inner.tasks.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<CronTask> {
        self.inner.tasks.lock().get(id).cloned()
    }

    /// Re-enable, resetting `consecutive_failures` to 0 (operator recovery
    /// after auto-disable, §4.3.1).
    pub fn enable(&self, id: &str) -> Result<CronTask, DaemonError> {
        let task = {
            let mut tasks = self.inner.tasks.lock();
            let task = tasks.get_mut(id).ok_or_else(|| DaemonError::NotFound(format!("cron task {id:?}")))?;
            task.enabled = true;
            task.consecutive_failures = 0;
            let now = self.inner.clock.now_unix();
            task.next_run = compute_next_run(&task.expression, now);
            task.clone()
        };
        self.persist();
        self.inner.wake.notify_one();
        Ok(task)
    }

    pub fn disable(&self, id: &str) -> Result<CronTask, DaemonError> {
        let task = {
            let mut tasks = self.inner.tasks.lock();
            let task = tasks.get_mut(id).ok_or_else(|| DaemonError::NotFound(format!("cron task {id:?}")))?;
            task.enabled = false;
            task.clone()
        };
        self.persist();
        Ok(task)
    }

    /// Spawn the scheduler loop. Runs until `cancel` fires.
    pub fn spawn(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move { service.run_loop(cancel).await })
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        loop {
            let sleep_for = self.next_wake_duration();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(sleep_for) => {},
                _ = self.inner.wake.notified() => {},
            }
            if cancel.is_cancelled() {
                break;
            }
            self.fire_due_tasks();
        }
    }

    /// Smallest enabled `next_run` minus now, capped at the one-hour
    /// ceiling (§4.3 steps 1-2); a non-positive delta sleeps for zero so an
    /// already-due task fires on the very next loop iteration.
    fn next_wake_duration(&self) -> Duration {
        let now = self.inner.clock.now_unix();
        let tasks = self.inner.tasks.lock();
        let smallest = tasks.values().filter(|t| t.enabled).filter_map(|t| t.next_run).min();
        drop(tasks);

        match smallest {
            Some(next) if next > now => Duration::from_secs(next - now).min(WAKE_CEILING),
            Some(_) => Duration::ZERO,
            None => WAKE_CEILING,
        }
    }

    /// Fire every enabled task whose `next_run <= now`. Coincident fires
    /// run in parallel: no queue, no interlock (§4.3).
    fn fire_due_tasks(&self) {
        let now = self.inner.clock.now_unix();
        let due: Vec<String> = {
            let tasks = self.inner.tasks.lock();
            tasks
                .values()
                .filter(|t| t.enabled && t.next_run.is_some_and(|n| n <= now))
                .map(|t| t.id.clone())
                .collect()
        };

        for task_id in due {
            let service = self.clone();
            tokio::spawn(async move { service.execute(task_id, now).await });
        }
    }

    async fn execute(&self, task_id: String, fire_epoch: u64) {
        let (task_file, expression) = {
            let tasks = self.inner.tasks.lock();
            let Some(task) = tasks.get(&task_id) else { return };
            (task.task_file.clone(), task.expression.clone())
        };

        let success = match std::fs::read_to_string(&task_file) {
            Err(e) => {
                tracing::warn!(cron_id = %task_id, task_file = %task_file, error = %e, "cron task_file unreadable");
                false
            }
            Ok(prompt) => self.execute_with_retry(&task_id, &prompt, fire_epoch).await,
        };

        tracing::info!(cron_id = %task_id, success, "cron fire complete");
        self.finish_fire(&task_id, success, &expression, fire_epoch);
    }

    /// Up to `retry_attempts` retries after the first failure, delays
    /// `retry_base * 2^(attempt-1)` (2s, 4s, 8s at the documented default).
    /// A retry is part of the same fire: it does not shift `next_run`.
    async fn execute_with_retry(&self, task_id: &str, prompt: &str, fire_epoch: u64) -> bool {
        let mut delay = self.inner.config.retry_base;
        for attempt in 0..=self.inner.config.retry_attempts {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            match self.run_once(task_id, prompt, fire_epoch, attempt).await {
                Ok(true) => return true,
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(cron_id = %task_id, attempt, error = %e, "cron execution attempt failed");
                }
            }
        }
        false
    }

    async fn run_once(
        &self,
        task_id: &str,
        prompt: &str,
        fire_epoch: u64,
        attempt: u32,
    ) -> Result<bool, DaemonError> {
        let session_id = SessionId::new(cron_session_id(task_id, fire_epoch));
        let instance = self.inner.pool.acquire(session_id.clone()).await?;
        instance.send(prompt).await?;
        let exit_code = instance.wait().await;
        self.inner.pool.drop_session(&session_id).await;
        self.write_execution_log(task_id, attempt, exit_code, prompt);
        Ok(exit_code == 0)
    }

    fn write_execution_log(&self, task_id: &str, attempt: u32, exit_code: i32, prompt: &str) {
        let dir = self.inner.config.logs_dir.join("cron").join(task_id);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(cron_id = %task_id, error = %e, "failed to create cron log directory");
            return;
        }
        let stamp = self.inner.clock.now_local().format("%Y-%m-%dT%H-%M-%S");
        let path = dir.join(format!("{stamp}.log"));
        let body = format!("attempt={attempt}\nexit_code={exit_code}\n---\n{prompt}\n");
        if let Err(e) = std::fs::write(&path, body) {
            tracing::warn!(cron_id = %task_id, error = %e, "failed to write cron execution log");
        }
    }

    fn finish_fire(&self, task_id: &str, success: bool, expression: &str, fire_epoch: u64) {
        let mut tasks = self.inner.tasks.lock();
        if let Some(task) = tasks.get_mut(task_id) {
            if success {
                task.record_success(fire_epoch);
            } else {
                task.record_failure(fire_epoch);
            }
            if task.enabled {
                task.next_run = compute_next_run(expression, fire_epoch);
            }
        }
        drop(tasks);
        self.persist();
    }

    fn persist(&self) {
        let doc = CronDocument { tasks: self.list() };
        if let Err(e) = self.inner.store.save_cron(&doc) {
            tracing::error!(error = %e, "failed to persist cron table");
        }
    }
}

fn epoch_to_local_naive(epoch: u64) -> NaiveDateTime {
    DateTime::from_timestamp(epoch as i64, 0).unwrap_or_default().with_timezone(&Local).naive_local()
}

fn to_epoch(dt: NaiveDateTime) -> u64 {
    match Local.from_local_datetime(&dt) {
        chrono::LocalResult::Single(t) => t.timestamp().max(0) as u64,
        chrono::LocalResult::Ambiguous(t, _) => t.timestamp().max(0) as u64,
        chrono::LocalResult::None => dt.and_utc().timestamp().max(0) as u64,
    }
}

fn compute_next_run(expression: &str, from_epoch: u64) -> Option<u64> {
    let expr = CronExpression::parse(expression).ok()?;
    let next = expr.next_fire(epoch_to_local_naive(from_epoch))?;
    Some(to_epoch(next))
}
