// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process exclusivity: a combined lock/PID file at
//! `<config_dir>/daemon.pid`. Holding an exclusive `flock` on this file
//! doubles as "this process is the live daemon"; the PID line inside it lets
//! a second process distinguish a live holder from a stale one before it
//! retries the lock.

use crate::error::StorageError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// An exclusively held lock/PID file. The lock is released when this value
/// is dropped (process exit included).
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Attempt to claim the lock at `path`, writing this process's PID into
    /// it only after the lock is held (never truncate before acquiring, so a
    /// failed attempt never clobbers the real owner's PID line).
    pub fn acquire(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new().create(true).write(true).open(path).map_err(|source| {
            StorageError::Io { path: path.to_path_buf(), source }
        })?;

        file.try_lock_exclusive().map_err(|_| StorageError::LockHeld { path: path.to_path_buf() })?;

        let mut file = file;
        file.set_len(0).map_err(|source| StorageError::Io { path: path.to_path_buf(), source })?;
        writeln!(file, "{}", std::process::id())
            .map_err(|source| StorageError::Io { path: path.to_path_buf(), source })?;

        Ok(Self { file, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Read the PID recorded in a (possibly stale) lock/PID file without taking
/// the lock, so a caller can decide whether the recorded process is alive.
pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// True iff a process with this PID currently exists. Uses `kill(pid, 0)`,
/// which performs no signal delivery, only an existence/permission check.
pub fn process_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}
