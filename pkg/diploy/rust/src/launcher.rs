// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Turns a [`ServiceConfig`] and a [`Mode`] into a ready-to-spawn command.

use crate::error::{Result, SupervisorError};
use crate::mode::Mode;
use crate::registry::ServiceConfig;
use std::fs::OpenOptions;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONTAINER_RUNTIME: &str = "docker";

/// Supervisor-wide launch parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Grace period between SIGTERM and SIGKILL when the service has none.
    pub stop_timeout: Duration,
    /// Binary used to run services in container mode.
    pub container_runtime: String,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
        }
    }
}

impl LaunchSettings {
    pub fn stop_timeout_for(&self, config: &ServiceConfig) -> Duration {
        config.stop_timeout.unwrap_or(self.stop_timeout)
    }
}

/// Name given to the container of a service, so it can be found with `docker ps`.
pub fn container_name(service: &str) -> String {
    format!("diploy-{service}")
}

/// Build the command for `config` in `mode`. Output goes to the service log,
/// which is created (with its parent directories) if needed.
pub fn build_command(
    config: &ServiceConfig,
    mode: Mode,
    settings: &LaunchSettings,
) -> Result<Command> {
    let spawn_err = |reason: String| SupervisorError::Spawn {
        service: config.name.clone(),
        reason,
    };

    if let Some(parent) = config.log_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| spawn_err(format!("log directory {}: {e}", parent.display())))?;
    }
    let stdout = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
        .map_err(|e| spawn_err(format!("log file {}: {e}", config.log_path.display())))?;
    let stderr = stdout
        .try_clone()
        .map_err(|e| spawn_err(format!("log file {}: {e}", config.log_path.display())))?;

    let mut cmd = match mode {
        Mode::Foreground | Mode::Daemon => {
            let mut cmd = Command::new(&config.command);
            cmd.args(&config.args);
            cmd.envs(&config.env);
            if let Some(ref dir) = config.working_dir {
                cmd.current_dir(dir);
            }
            cmd
        }
        Mode::Container => {
            let mut cmd = Command::new(&settings.container_runtime);
            cmd.arg("run")
                .arg("--rm")
                .arg("--name")
                .arg(container_name(&config.name));
            for (key, value) in &config.env {
                cmd.arg("-e").arg(format!("{key}={value}"));
            }
            if let Some(ref dir) = config.working_dir {
                cmd.arg("-w").arg(dir);
            }
            cmd.arg(&config.command);
            cmd.args(&config.args);
            cmd
        }
    };

    cmd.stdin(Stdio::null());
    cmd.stdout(stdout);
    cmd.stderr(stderr);

    #[cfg(unix)]
    {
        if mode == Mode::Daemon {
            // SAFETY: setsid is async-signal-safe and touches no parent state.
            unsafe {
                cmd.pre_exec(|| {
                    nix::unistd::setsid()
                        .map(|_| ())
                        .map_err(std::io::Error::from)
                });
            }
        }
    }

    Ok(cmd)
}
