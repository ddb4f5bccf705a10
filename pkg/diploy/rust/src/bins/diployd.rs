// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use diployd::config::DaemonConfig;
use diployd::setup::{DEFAULT_UNIT_FILE, SetupOptions, run_setup};
use diployd::{Dispatcher, ServiceRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "diployd", version)]
#[command(about = "Local process supervisor with an HTTP control plane")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the control plane (default)
    Server(ServerArgs),
    /// Install diployd on this host
    Setup(SetupArgs),
}

#[derive(Args, Debug, Default)]
struct ServerArgs {
    /// Listen address [ip:port], overrides DIPLOY_ADDR
    #[arg(long)]
    addr: Option<String>,

    /// Service database, overrides DIPLOY_DB_URL
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log directory, overrides DIPLOY_LOG_PATH
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl ServerArgs {
    fn apply(self, config: &mut DaemonConfig) {
        if let Some(addr) = self.addr {
            config.addr = addr;
        }
        if let Some(db) = self.db {
            config.db_path = Some(db);
        }
        if let Some(log_dir) = self.log_dir {
            config.log_dir = log_dir;
        }
    }
}

#[derive(Args, Debug)]
struct SetupArgs {
    /// Where to install the binary
    #[arg(long)]
    bin_path: PathBuf,

    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Address written into the systemd unit
    #[arg(long)]
    addr: Option<String>,

    /// Write a systemd unit (default path when given without a value)
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_UNIT_FILE)]
    unit_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    diployd::logging::init(&DaemonConfig::log_level_from_env());
    let mut config = DaemonConfig::from_env();

    match cli.command.unwrap_or(Command::Server(ServerArgs::default())) {
        Command::Server(args) => {
            args.apply(&mut config);
            run_server(config).await
        }
        Command::Setup(args) => {
            let options = SetupOptions {
                bin_path: args.bin_path,
                log_dir: args.log_dir.unwrap_or(config.log_dir),
                addr: args.addr.unwrap_or(config.addr),
                unit_file: args.unit_file,
            };
            let report = run_setup(&options)?;
            info!(
                log_dir = %report.log_dir.display(),
                bin_path = %report.bin_path.display(),
                unit_file = ?report.unit_file,
                "setup complete"
            );
            Ok(())
        }
    }
}

async fn run_server(config: DaemonConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("invalid configuration")?;
    let addr = config.socket_addr().map_err(|e| anyhow!(e))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        modes = ?config.modes,
        "diployd starting"
    );

    let db_path = config.database_path();
    let registry = ServiceRegistry::load(&db_path, &config.log_dir)
        .with_context(|| format!("failed to load service database {}", db_path.display()))?;
    info!(services = ?registry.names(), "services registered");

    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        config.mode_validator(),
        config.launch_settings(),
    ));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "control plane listening");

    diployd::api::serve(listener, Arc::clone(&dispatcher), shutdown_signal())
        .await
        .context("control plane failed")?;

    if config.stop_on_exit {
        dispatcher.shutdown().await;
    }
    info!("diployd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM"),
                    _ = sigint.recv() => info!("received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => warn!("failed to install signal handlers: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("received ctrl-c");
}
