// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Host installation: log directory, binary copy and systemd unit.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_UNIT_FILE: &str = "/etc/systemd/system/diploy.service";

#[derive(Debug, Clone)]
pub struct UnitFileParams<'a> {
    pub bin_path: &'a Path,
    pub addr: &'a str,
    pub log_dir: &'a Path,
}

/// Render the systemd unit that runs `diployd server` at boot.
pub fn render_unit_file(params: &UnitFileParams<'_>) -> String {
    let log_dir = params.log_dir.display();
    format!(
        "[Unit]
Description=diploy server
After=network.target
StartLimitIntervalSec=0

[Service]
Type=simple
Restart=always
User=root
ExecStart={bin} server --addr {addr}

Environment=DIPLOY_DB_URL={log_dir}/diploy.yaml
Environment=DIPLOY_LOG_PATH={log_dir}

[Install]
WantedBy=multi-user.target
",
        bin = params.bin_path.display(),
        addr = params.addr,
    )
}

#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub bin_path: PathBuf,
    pub log_dir: PathBuf,
    pub addr: String,
    /// Where to write the unit; no unit is written when unset.
    pub unit_file: Option<PathBuf>,
}

/// What `run_setup` did, for the caller to report.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub log_dir: PathBuf,
    pub bin_path: PathBuf,
    pub unit_file: Option<PathBuf>,
}

/// Create the log directory (mode 0700), copy the running executable to
/// `bin_path`, and write the unit file if asked to.
pub fn run_setup(options: &SetupOptions) -> Result<SetupReport> {
    create_log_dir(&options.log_dir)?;
    info!(path = %options.log_dir.display(), "log directory ready");

    let current = std::env::current_exe().context("failed to locate the running executable")?;
    install_binary(&current, &options.bin_path)?;
    info!(from = %current.display(), to = %options.bin_path.display(), "binary installed");

    if let Some(ref unit_path) = options.unit_file {
        let unit = render_unit_file(&UnitFileParams {
            bin_path: &options.bin_path,
            addr: &options.addr,
            log_dir: &options.log_dir,
        });
        std::fs::write(unit_path, unit)
            .with_context(|| format!("couldn't write unit file {}", unit_path.display()))?;
        info!(path = %unit_path.display(), "systemd unit written, enable it with `systemctl enable diploy`");
    }

    Ok(SetupReport {
        log_dir: options.log_dir.clone(),
        bin_path: options.bin_path.clone(),
        unit_file: options.unit_file.clone(),
    })
}

fn create_log_dir(path: &Path) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(path)
        .with_context(|| format!("couldn't create log directory {}", path.display()))
}

fn install_binary(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if let Some(parent) = to.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("couldn't create {}", parent.display()))?;
    }
    std::fs::copy(from, to)
        .with_context(|| format!("couldn't copy binary to {}", to.display()))?;
    Ok(())
}
