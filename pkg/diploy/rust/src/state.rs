// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Result, SupervisorError};
use crate::mode::Mode;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessStatus {
    /// No process. Initial state of every service.
    #[default]
    Stopped,
    /// Spawn in progress.
    Starting,
    /// Child process is alive.
    Running,
    /// Termination signal sent, waiting for exit.
    Stopping,
    /// Spawn or stop failed, or the process exited unsuccessfully.
    Failed,
}

impl ProcessStatus {
    /// A start request in this state must not spawn another process.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ProcessStatus::Starting | ProcessStatus::Running | ProcessStatus::Stopping
        )
    }

    pub(crate) fn can_transition_to(self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Failed, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Stopped => write!(f, "stopped"),
            ProcessStatus::Starting => write!(f, "starting"),
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Stopping => write!(f, "stopping"),
            ProcessStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Runtime status of one service, owned by that service's worker.
///
/// `pid` is only ever set while the status is starting, running or stopping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessState {
    status: ProcessStatus,
    pid: Option<u32>,
    last_error: Option<String>,
    last_mode: Option<Mode>,
}

impl ProcessState {
    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Mode of the most recent successful start.
    pub fn last_mode(&self) -> Option<Mode> {
        self.last_mode
    }

    fn transition(&mut self, next: ProcessStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SupervisorError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn mark_starting(&mut self) -> Result<()> {
        self.transition(ProcessStatus::Starting)?;
        self.pid = None;
        Ok(())
    }

    pub(crate) fn mark_running(&mut self, pid: u32, mode: Mode) -> Result<()> {
        self.transition(ProcessStatus::Running)?;
        self.pid = Some(pid);
        self.last_mode = Some(mode);
        self.last_error = None;
        Ok(())
    }

    pub(crate) fn mark_stopping(&mut self) -> Result<()> {
        self.transition(ProcessStatus::Stopping)
    }

    pub(crate) fn mark_stopped(&mut self) -> Result<()> {
        self.transition(ProcessStatus::Stopped)?;
        self.pid = None;
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self, error: String) -> Result<()> {
        self.transition(ProcessStatus::Failed)?;
        self.pid = None;
        self.last_error = Some(error);
        Ok(())
    }

    /// Record an error that did not change the status (e.g. a rejected start).
    pub(crate) fn record_error(&mut self, error: String) {
        self.last_error = Some(error);
    }
}
