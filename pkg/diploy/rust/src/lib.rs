// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Local process supervisor with an HTTP control plane.
//!
//! The [`registry::ServiceRegistry`] holds the service definitions loaded at
//! startup, the [`dispatch::Dispatcher`] resolves control intents against it
//! and hands them to one [`controller::ServiceHandle`] per service, and
//! [`api`] exposes start/stop/restart over HTTP.

pub mod api;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod mode;
pub mod registry;
pub mod setup;
pub mod state;

pub use controller::{Operation, Outcome, ServiceHandle, Ticket};
pub use dispatch::Dispatcher;
pub use error::{Result, SupervisorError};
pub use mode::{Mode, ModeValidator};
pub use registry::{ServiceConfig, ServiceRegistry};
pub use state::{ProcessState, ProcessStatus};
