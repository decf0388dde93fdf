// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON documents for the two pieces of state the daemon persists:
//! the cron table (`cron.json`) and the agent registry (`registry.json`).
//!
//! Both are loaded whole and saved whole (§4.2: "write-all-or-nothing", "no
//! partial loads"). A single [`parking_lot::Mutex`] serializes access within
//! this process; cross-process exclusivity is the separate job of
//! [`crate::lockfile::LockFile`] held on `daemon.pid`.

use crate::error::StorageError;
use clud_core::{AgentRecord, CronTask};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// `cron.json`: `{"tasks": [...]}` (§6). Unknown keys ignored on read,
/// missing optional fields default, per the "keys stable across versions"
/// contract.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CronDocument {
    #[serde(default)]
    pub tasks: Vec<CronTask>,
}

/// `registry.json`: `{"agents": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
}

/// Owns the two persisted documents under a config directory, with a
/// single coarse lock serializing reads and writes within this process
/// (§4.2's "a single coarse lock serializes access within a process").
pub struct ConfigStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), lock: Mutex::new(()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn cron_path(&self) -> PathBuf {
        self.dir.join("cron.json")
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.join("registry.json")
    }

    /// Create the config directory if it does not already exist.
    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)
            .map_err(|source| StorageError::CreateDir { path: self.dir.clone(), source })
    }

    pub fn load_cron(&self) -> Result<CronDocument, StorageError> {
        let _guard = self.lock.lock();
        load_json(&self.cron_path())
    }

    pub fn save_cron(&self, doc: &CronDocument) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.ensure_dir()?;
        save_json_atomic(&self.cron_path(), doc)
    }

    pub fn load_registry(&self) -> Result<RegistryDocument, StorageError> {
        let _guard = self.lock.lock();
        load_json(&self.registry_path())
    }

    pub fn save_registry(&self, doc: &RegistryDocument) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.ensure_dir()?;
        save_json_atomic(&self.registry_path(), doc)
    }
}

/// Missing file -> empty (default) document. Present-but-malformed -> a
/// [`StorageError::Malformed`] carrying the line/column of the parse
/// failure; callers (the daemon's startup sequence) treat this as fatal
/// rather than silently dropping state.
fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => return Err(StorageError::Io { path: path.to_path_buf(), source }),
    };

    serde_json::from_str(&raw).map_err(|source| StorageError::Malformed {
        path: path.to_path_buf(),
        line: source.line(),
        column: source.column(),
        source,
    })
}

/// Serialize to a sibling temp file, fsync it, then rename over the target
/// (§4.2). The rename is atomic on the same filesystem, so readers never
/// observe a partially written document.
fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let tmp_path = path.with_extension(format!("json.tmp.{}", std::process::id()));
    let body = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Malformed {
        path: path.to_path_buf(),
        line: source.line(),
        column: source.column(),
        source,
    })?;

    let write_result = (|| -> Result<(), StorageError> {
        let mut file = File::create(&tmp_path)
            .map_err(|source| StorageError::Io { path: tmp_path.clone(), source })?;
        file.write_all(&body).map_err(|source| StorageError::Io { path: tmp_path.clone(), source })?;
        file.sync_all().map_err(|source| StorageError::Io { path: tmp_path.clone(), source })?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        StorageError::Io { path: path.to_path_buf(), source }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clud_core::{AgentState, CronTask};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        assert_eq!(store.load_cron().unwrap(), CronDocument::default());
        assert_eq!(store.load_registry().unwrap(), RegistryDocument::default());
    }

    #[test]
    fn round_trips_cron_tasks() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let task = CronTask::new("c1".into(), "*/2 * * * *".into(), "/tmp/t.md".into(), 100);
        let doc = CronDocument { tasks: vec![task.clone()] };
        store.save_cron(&doc).unwrap();

        let loaded = store.load_cron().unwrap();
        assert_eq!(loaded.tasks, vec![task]);
    }

    #[test]
    fn round_trips_agent_registry() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let agent = AgentRecord::new("a1".into(), 4242, 100, BTreeMap::new());
        let doc = RegistryDocument { agents: vec![agent.clone()] };
        store.save_registry(&doc).unwrap();

        let loaded = store.load_registry().unwrap();
        assert_eq!(loaded.agents, vec![agent]);
        assert_eq!(loaded.agents[0].state, AgentState::Running);
    }

    #[test]
    fn malformed_file_is_refused_with_position() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cron.json"), b"{ not json").unwrap();
        let store = ConfigStore::new(dir.path());
        let err = store.load_cron().unwrap_err();
        match err {
            StorageError::Malformed { line, .. } => assert_eq!(line, 1),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_are_ignored_on_read() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cron.json"), br#"{"tasks": [], "future_field": 1}"#).unwrap();
        let store = ConfigStore::new(dir.path());
        assert_eq!(store.load_cron().unwrap(), CronDocument::default());
    }

    #[test]
    fn save_does_not_leave_a_temp_file_behind() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        store.save_cron(&CronDocument::default()).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("cron.json")]);
    }
}
