// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembled daemon configuration: compiled-in defaults, layered with an
//! optional `config.toml`, then environment overrides.

use crate::error::CoreError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Resolve the user config directory: `CLUD_CONFIG_DIR` > `XDG_CONFIG_HOME/clud` > `~/.config/clud`.
pub fn config_dir() -> Result<PathBuf, CoreError> {
    if let Ok(dir) = std::env::var("CLUD_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("clud"));
    }
    let home = std::env::var("HOME").map_err(|_| CoreError::NoConfigDir)?;
    Ok(PathBuf::from(home).join(".config/clud"))
}

/// Daemon port override, read straight from the environment (bypasses the
/// `config.toml` layer so `ensure_daemon_running` can probe it cheaply).
pub fn daemon_port_env() -> Option<u16> {
    std::env::var("CLUD_DAEMON_PORT").ok().and_then(|s| s.parse().ok())
}

pub fn no_browser() -> bool {
    std::env::var("CLUD_NO_BROWSER").is_ok_and(|v| v != "0" && !v.is_empty())
}

pub fn auth_token_env() -> Option<String> {
    std::env::var("CLUD_AUTH_TOKEN").ok().filter(|s| !s.is_empty())
}

/// `tracing-subscriber` env-filter directive, defaulting to `info`.
pub fn log_level() -> String {
    std::env::var("CLUD_LOG_LEVEL").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| "info".to_string())
}

/// On-disk, operator-edited tuning overrides. Every field optional: absent
/// fields fall back to the compiled-in default, then to an environment
/// override where one exists (see [`Config::load`]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub daemon_port: Option<u16>,
    pub max_instances: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
    pub sweep_interval_seconds: Option<u64>,
    pub terminate_grace_seconds: Option<u64>,
    pub stale_threshold_seconds: Option<u64>,
    pub stale_scan_interval_seconds: Option<u64>,
    pub retention_window_seconds: Option<u64>,
    pub shutdown_grace_seconds: Option<u64>,
    pub cron_retry_attempts: Option<u32>,
    pub cron_retry_base_seconds: Option<u64>,
    pub per_session_ring_bytes: Option<usize>,
    pub subscriber_channel_capacity: Option<usize>,
    pub agent_command: Option<Vec<String>>,
}

/// The assembled, validated configuration used to construct daemon state.
#[derive(Debug, Clone)]
pub struct Config {
    pub daemon_port: u16,
    pub config_dir: PathBuf,
    pub max_instances: usize,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub terminate_grace: Duration,
    pub stale_threshold: Duration,
    pub stale_scan_interval: Duration,
    pub retention_window: Duration,
    pub shutdown_grace: Duration,
    pub cron_retry_attempts: u32,
    pub cron_retry_base: Duration,
    pub per_session_ring_bytes: usize,
    pub subscriber_channel_capacity: usize,
    pub agent_command: Vec<String>,
    pub auth_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_port: 7565,
            config_dir: PathBuf::new(),
            max_instances: 100,
            idle_timeout: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(60),
            terminate_grace: Duration::from_secs(5),
            stale_threshold: Duration::from_secs(60),
            stale_scan_interval: Duration::from_secs(30),
            retention_window: Duration::from_secs(24 * 3600),
            shutdown_grace: Duration::from_secs(10),
            cron_retry_attempts: 3,
            cron_retry_base: Duration::from_secs(2),
            per_session_ring_bytes: 1024 * 1024,
            subscriber_channel_capacity: 64,
            agent_command: Vec::new(),
            auth_token: None,
        }
    }
}

impl Config {
    /// Layer compiled-in defaults, then `<config_dir>/config.toml` if
    /// present, then environment overrides (§6 of the interface contract);
    /// `config.toml` is never written back by the daemon.
    pub fn load() -> Result<Self, CoreError> {
        let config_dir = config_dir()?;
        let mut config = Config { config_dir: config_dir.clone(), ..Config::default() };

        let toml_path = config_dir.join("config.toml");
        if let Ok(raw) = std::fs::read_to_string(&toml_path) {
            let file: ConfigFile = toml::from_str(&raw)
                .map_err(|e| CoreError::MalformedConfig { path: toml_path.display().to_string(), reason: e.to_string() })?;
            config.apply_file(file);
        }

        if let Some(port) = daemon_port_env() {
            config.daemon_port = port;
        }
        config.auth_token = auth_token_env().or(config.auth_token);

        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.daemon_port {
            self.daemon_port = v;
        }
        if let Some(v) = file.max_instances {
            self.max_instances = v;
        }
        if let Some(v) = file.idle_timeout_seconds {
            self.idle_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.sweep_interval_seconds {
            self.sweep_interval = Duration::from_secs(v);
        }
        if let Some(v) = file.terminate_grace_seconds {
            self.terminate_grace = Duration::from_secs(v);
        }
        if let Some(v) = file.stale_threshold_seconds {
            self.stale_threshold = Duration::from_secs(v);
        }
        if let Some(v) = file.stale_scan_interval_seconds {
            self.stale_scan_interval = Duration::from_secs(v);
        }
        if let Some(v) = file.retention_window_seconds {
            self.retention_window = Duration::from_secs(v);
        }
        if let Some(v) = file.shutdown_grace_seconds {
            self.shutdown_grace = Duration::from_secs(v);
        }
        if let Some(v) = file.cron_retry_attempts {
            self.cron_retry_attempts = v;
        }
        if let Some(v) = file.cron_retry_base_seconds {
            self.cron_retry_base = Duration::from_secs(v);
        }
        if let Some(v) = file.per_session_ring_bytes {
            self.per_session_ring_bytes = v;
        }
        if let Some(v) = file.subscriber_channel_capacity {
            self.subscriber_channel_capacity = v;
        }
        if let Some(v) = file.agent_command {
            self.agent_command = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.daemon_port, 7565);
        assert_eq!(config.max_instances, 100);
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.per_session_ring_bytes, 1024 * 1024);
    }

    #[test]
    fn file_overrides_apply_only_present_fields() {
        let mut config = Config::default();
        config.apply_file(ConfigFile { daemon_port: Some(9000), ..Default::default() });
        assert_eq!(config.daemon_port, 9000);
        assert_eq!(config.max_instances, 100);
    }
}
