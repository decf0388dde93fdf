// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type owned by this crate: cron parsing/validation and config
//! resolution failures. Wrapped by `clud_daemon::DaemonError` at the HTTP
//! boundary.

use crate::cron::CronError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid cron expression: {0}")]
    InvalidCron(#[from] CronError),

    #[error("could not determine a config directory (HOME is unset)")]
    NoConfigDir,

    #[error("malformed config file {path}: {reason}")]
    MalformedConfig { path: String, reason: String },
}
