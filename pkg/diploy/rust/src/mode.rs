// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a service's process is launched and attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Child of the supervisor, output captured in the service log.
    #[default]
    Foreground,
    /// New session, detached from the controlling terminal.
    Daemon,
    /// The command is an image run through the container runtime.
    Container,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Foreground, Mode::Daemon, Mode::Container];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Foreground => "foreground",
            Mode::Daemon => "daemon",
            Mode::Container => "container",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = SupervisorError;

    /// Exact, case-sensitive match against the mode names.
    fn from_str(s: &str) -> Result<Self> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| SupervisorError::InvalidMode(s.to_string()))
    }
}

/// The set of modes this supervisor accepts for `start`.
#[derive(Debug, Clone)]
pub struct ModeValidator {
    enabled: Vec<Mode>,
}

impl ModeValidator {
    pub fn new(enabled: impl IntoIterator<Item = Mode>) -> Self {
        let mut modes = Vec::new();
        for mode in enabled {
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        Self { enabled: modes }
    }

    pub fn validate(&self, mode: &str) -> bool {
        self.parse(mode).is_ok()
    }

    /// Parse `mode` and check that it is enabled.
    pub fn parse(&self, mode: &str) -> Result<Mode> {
        let parsed: Mode = mode.parse()?;
        if self.enabled.contains(&parsed) {
            Ok(parsed)
        } else {
            Err(SupervisorError::InvalidMode(mode.to_string()))
        }
    }

    pub fn enabled(&self) -> &[Mode] {
        &self.enabled
    }
}

impl Default for ModeValidator {
    fn default() -> Self {
        Self::new(Mode::ALL)
    }
}
