// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Service definitions, loaded once at startup from the service database.
//!
//! The database is a YAML document with a single `services` map:
//!
//! ```yaml
//! services:
//!   web:
//!     command: /usr/bin/python3
//!     args: ["-m", "http.server", "8080"]
//!     working_dir: /srv/www
//!     env:
//!       PYTHONUNBUFFERED: "1"
//!     mode: daemon
//!     stop_timeout: 5
//! ```

use crate::error::{Result, SupervisorError};
use crate::mode::Mode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Launch description of one service. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// stdout and stderr of the process are appended here.
    pub log_path: PathBuf,
    /// Mode used by `restart` when the service was never started.
    pub mode: Mode,
    /// Overrides the supervisor-wide grace period between SIGTERM and SIGKILL.
    pub stop_timeout: Option<Duration>,
}

impl ServiceConfig {
    /// Minimal definition, logging to `<log_dir>/<name>.log`.
    pub fn new(name: impl Into<String>, command: impl Into<String>, log_dir: &Path) -> Self {
        let name = name.into();
        let log_path = log_dir.join(format!("{name}.log"));
        Self {
            name,
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            log_path,
            mode: Mode::default(),
            stop_timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServiceDatabase {
    #[serde(default)]
    services: BTreeMap<String, ServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    #[serde(default)]
    command: String,
    #[serde(default)]
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    log_path: Option<PathBuf>,
    mode: Option<String>,
    stop_timeout: Option<u64>,
}

impl ServiceEntry {
    /// `database` is the file the entry came from, named in rejections.
    fn into_config(self, name: String, log_dir: &Path, database: &Path) -> Result<ServiceConfig> {
        if self.command.trim().is_empty() {
            return Err(SupervisorError::Persistence {
                path: database.display().to_string(),
                reason: format!("service '{name}' has an empty command"),
            });
        }
        let mode = match self.mode.as_deref() {
            Some(m) => m.parse()?,
            None => Mode::default(),
        };
        let log_path = self
            .log_path
            .unwrap_or_else(|| log_dir.join(format!("{name}.log")));
        Ok(ServiceConfig {
            name,
            command: self.command,
            args: self.args,
            working_dir: self.working_dir,
            env: self.env,
            log_path,
            mode,
            stop_timeout: self.stop_timeout.map(Duration::from_secs),
        })
    }
}

/// Read-only map from service name to its definition.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<ServiceConfig>>,
}

impl ServiceRegistry {
    /// Build a registry from in-memory definitions. The first definition of a
    /// name wins.
    pub fn from_configs(configs: impl IntoIterator<Item = ServiceConfig>) -> Self {
        let mut services = HashMap::new();
        for config in configs {
            if services.contains_key(&config.name) {
                warn!(service = %config.name, "duplicate service definition ignored");
                continue;
            }
            services.insert(config.name.clone(), Arc::new(config));
        }
        Self { services }
    }

    /// Load the service database at `path`.
    ///
    /// A missing file yields an empty registry. A file that cannot be read or
    /// parsed is an error. Entries with an empty command or an unknown mode are
    /// skipped with a warning.
    pub fn load(path: &Path, log_dir: &Path) -> Result<Self> {
        let persistence = |reason: String| SupervisorError::Persistence {
            path: path.display().to_string(),
            reason,
        };

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "service database not found, no services registered");
                return Ok(Self::default());
            }
            Err(e) => return Err(persistence(e.to_string())),
        };

        let database: ServiceDatabase = if contents.trim().is_empty() {
            ServiceDatabase::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|e| persistence(e.to_string()))?
        };

        let mut configs = Vec::with_capacity(database.services.len());
        for (name, entry) in database.services {
            match entry.into_config(name.clone(), log_dir, path) {
                Ok(config) => {
                    debug!(service = %name, command = %config.command, "loaded service");
                    configs.push(config);
                }
                Err(e) => warn!(service = %name, "skipping service: {e}"),
            }
        }

        let registry = Self::from_configs(configs);
        info!(path = %path.display(), count = registry.len(), "service database loaded");
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<ServiceConfig>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
