// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Daemon configuration from environment variables.
//!
//! Every field has a default; command-line flags override what is read here.

use crate::launcher::{DEFAULT_CONTAINER_RUNTIME, LaunchSettings};
use crate::mode::{Mode, ModeValidator};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const DEFAULT_ADDR: &str = "0.0.0.0:80";
const DEFAULT_LOG_DIR: &str = "/var/log/diploy";
const DEFAULT_DB_FILE: &str = "diploy.yaml";
const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STOP_ON_EXIT: bool = true;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Control plane listen address
    pub addr: String,

    /// Directory holding the daemon's and the services' logs
    pub log_dir: PathBuf,

    /// Service database; `<log_dir>/diploy.yaml` when unset
    pub db_path: Option<PathBuf>,

    /// Grace period between SIGTERM and SIGKILL
    pub stop_timeout: Duration,

    pub modes: Vec<Mode>,

    pub container_runtime: String,

    /// Stop running services when the daemon exits
    pub stop_on_exit: bool,

    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            db_path: None,
            stop_timeout: Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS),
            modes: Mode::ALL.to_vec(),
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            stop_on_exit: DEFAULT_STOP_ON_EXIT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            addr: env::var("DIPLOY_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string()),
            log_dir: env::var("DIPLOY_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR)),
            db_path: env::var("DIPLOY_DB_URL").ok().map(PathBuf::from),
            stop_timeout: Duration::from_secs(
                Self::parse_u64("DIPLOY_STOP_TIMEOUT").unwrap_or(DEFAULT_STOP_TIMEOUT_SECS),
            ),
            modes: Self::parse_modes(),
            container_runtime: env::var("DIPLOY_CONTAINER_RUNTIME")
                .unwrap_or_else(|_| DEFAULT_CONTAINER_RUNTIME.to_string()),
            stop_on_exit: Self::parse_bool("DIPLOY_STOP_ON_EXIT", DEFAULT_STOP_ON_EXIT),
            log_level: Self::log_level_from_env(),
        }
    }

    fn parse_u64(var_name: &str) -> Option<u64> {
        let raw = env::var(var_name).ok()?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring {var_name}={raw}: not a number");
                None
            }
        }
    }

    fn parse_bool(var_name: &str, default: bool) -> bool {
        env::var(var_name)
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
    }

    /// Comma-separated list; unknown names are dropped with a warning.
    fn parse_modes() -> Vec<Mode> {
        let Ok(raw) = env::var("DIPLOY_MODES") else {
            return Mode::ALL.to_vec();
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse::<Mode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    warn!("DIPLOY_MODES: {e}");
                    None
                }
            })
            .collect()
    }

    /// Log filter alone, for initialising logging before the rest is read.
    pub fn log_level_from_env() -> String {
        // Priority: DIPLOY_LOG_LEVEL > RUST_LOG > default
        env::var("DIPLOY_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn database_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.log_dir.join(DEFAULT_DB_FILE))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        self.addr
            .parse()
            .map_err(|e| format!("invalid listen address '{}': {e}", self.addr))
    }

    pub fn launch_settings(&self) -> LaunchSettings {
        LaunchSettings {
            stop_timeout: self.stop_timeout,
            container_runtime: self.container_runtime.clone(),
        }
    }

    pub fn mode_validator(&self) -> ModeValidator {
        ModeValidator::new(self.modes.iter().copied())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.modes.is_empty() {
            return Err("DIPLOY_MODES enables no known mode".to_string());
        }
        if self.stop_timeout.is_zero() {
            return Err("DIPLOY_STOP_TIMEOUT must be greater than zero".to_string());
        }
        if self.container_runtime.trim().is_empty() && self.modes.contains(&Mode::Container) {
            return Err("DIPLOY_CONTAINER_RUNTIME is empty but container mode is enabled".to_string());
        }
        self.socket_addr()?;
        Ok(())
    }
}
