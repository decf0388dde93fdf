// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type owned by this crate: filesystem, JSON, and lock-contention
//! failures. Wrapped by `clud_daemon::DaemonError` at the HTTP boundary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("malformed state file {path} at line {line}, column {column}: {source}")]
    Malformed { path: PathBuf, line: usize, column: usize, #[source] source: serde_json::Error },

    #[error("another daemon already holds the lock at {path}")]
    LockHeld { path: PathBuf },

    #[error("could not create config directory {path}: {source}")]
    CreateDir { path: PathBuf, #[source] source: std::io::Error },
}
