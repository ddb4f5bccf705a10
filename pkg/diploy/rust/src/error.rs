// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Supervisor errors.
//!
//! `NotFound` and `InvalidMode` are returned synchronously by the dispatcher.
//! Everything raised inside a service worker is recorded in that service's
//! `last_error` and delivered through its ticket.

use crate::state::ProcessStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("service '{0}' not found")]
    NotFound(String),

    #[error("mode '{0}' not supported")]
    InvalidMode(String),

    #[error("service '{service}' is already {status}")]
    AlreadyActive {
        service: String,
        status: ProcessStatus,
    },

    #[error("failed to spawn '{service}': {reason}")]
    Spawn { service: String, reason: String },

    #[error("failed to stop '{service}': {reason}")]
    Signal { service: String, reason: String },

    #[error("service database {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ProcessStatus,
        to: ProcessStatus,
    },

    #[error("service '{0}' is no longer accepting requests")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
