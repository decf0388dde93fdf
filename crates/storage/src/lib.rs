// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! clud-storage: atomic JSON persistence for the cron table and agent
//! registry, plus the cross-process daemon lock/PID file.

pub mod error;
pub mod lockfile;
pub mod store;

pub use error::StorageError;
pub use lockfile::LockFile;
pub use store::{CronDocument, ConfigStore, RegistryDocument};
