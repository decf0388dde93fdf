// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured logging for `cludd` (§6's `logs/daemon.log`, §7).
//!
//! Grounded on the teacher's declared tracing stack (`tracing`,
//! `tracing-subscriber` with the `env-filter` feature, `tracing-appender`)
//! and on `ConaryLabs-Conary/src/main.rs`'s
//! `tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env()...)`
//! idiom (the teacher declares the same three crates but its retrieved
//! source never shows the call site), generalized from one stderr layer to
//! stderr-plus-file. Size-based rotation (10 MiB, keep 5) has no
//! counterpart in any example's dependency table: `tracing-appender`'s
//! `rolling` module only rotates on a time schedule, so [`RollingWriter`]
//! below is a small hand-rolled `MakeWriter` rather than a borrowed crate.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use parking_lot::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
const MAX_KEPT_LOGS: usize = 5;

struct RotatingFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl RotatingFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    fn generation_path(&self, generation: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{generation}"));
        PathBuf::from(name)
    }

    /// Roll `daemon.log` -> `daemon.log.1` -> ... -> `daemon.log.5` (oldest
    /// dropped) before a write would push the current file past
    /// `MAX_LOG_BYTES`.
    fn rotate_if_needed(&self, incoming: usize) -> io::Result<()> {
        let current_len = self.file.lock().metadata()?.len();
        if current_len + incoming as u64 <= MAX_LOG_BYTES {
            return Ok(());
        }

        for generation in (1..MAX_KEPT_LOGS).rev() {
            let from = self.generation_path(generation);
            if from.exists() {
                let _ = fs::rename(&from, self.generation_path(generation + 1));
            }
        }
        let _ = fs::rename(&self.path, self.generation_path(1));

        let new_file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        *self.file.lock() = new_file;
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.rotate_if_needed(buf.len())?;
        self.file.lock().write(buf)
    }

    fn flush(&self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

/// `tracing_subscriber::fmt::MakeWriter` impl over [`RotatingFile`]. Cheap
/// to clone (an `Arc` inside), as the trait requires a fresh writer per
/// formatted event.
#[derive(Clone)]
pub struct RollingWriter(Arc<RotatingFile>);

impl RollingWriter {
    pub fn open(path: PathBuf) -> io::Result<Self> {
        Ok(Self(Arc::new(RotatingFile::open(path)?)))
    }
}

impl Write for RollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for RollingWriter {
    type Writer = RollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global subscriber: `CLUD_LOG_LEVEL` (default `info`) via
/// [`clud_core::config::log_level`], mirrored to stderr and to
/// `<config_dir>/logs/daemon.log`.
pub fn init(config_dir: &std::path::Path) -> io::Result<()> {
    let file_writer = RollingWriter::open(config_dir.join("logs").join("daemon.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(clud_core::config::log_level()))
        .with_ansi(false)
        .with_writer(io::stderr.and(file_writer))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_keeps_at_most_five_generations_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.log");
        let rotating = RotatingFile::open(path.clone()).unwrap();

        // Each write after the first pushes the current file past
        // MAX_LOG_BYTES, forcing a rotation; (MAX_KEPT_LOGS + 3) writes
        // guarantees the oldest generation has been evicted at least once.
        let chunk = vec![b'x'; (MAX_LOG_BYTES as usize / 2) + 1];
        for _ in 0..MAX_KEPT_LOGS + 3 {
            rotating.write(&chunk).unwrap();
        }

        let mut generations = 0;
        for generation in 1..=MAX_KEPT_LOGS + 2 {
            if rotating.generation_path(generation).exists() {
                generations += 1;
            }
        }
        assert!(generations <= MAX_KEPT_LOGS);
        assert!(path.exists());
    }
}
