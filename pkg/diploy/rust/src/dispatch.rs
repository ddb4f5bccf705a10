// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Entry point for control intents.
//!
//! The dispatcher validates a request against the registry and the enabled
//! modes, then hands it to the service's controller and returns immediately
//! with a [`Ticket`]. Awaiting the ticket is optional.

use crate::controller::{Operation, ServiceHandle, Ticket};
use crate::error::Result;
use crate::launcher::LaunchSettings;
use crate::mode::ModeValidator;
use crate::registry::ServiceRegistry;
use crate::state::ProcessState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    modes: ModeValidator,
    settings: Arc<LaunchSettings>,
    handles: Mutex<HashMap<String, ServiceHandle>>,
}

impl Dispatcher {
    pub fn new(registry: ServiceRegistry, modes: ModeValidator, settings: LaunchSettings) -> Self {
        Self {
            registry: Arc::new(registry),
            modes,
            settings: Arc::new(settings),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn modes(&self) -> &ModeValidator {
        &self.modes
    }

    /// Queue a start of `name` in `mode`. Unknown names are rejected before
    /// the mode is looked at, and no controller is created for a rejected
    /// request.
    pub fn start(&self, name: &str, mode: &str) -> Result<Ticket> {
        self.registry.lookup(name)?;
        let mode = self.modes.parse(mode)?;
        let handle = self.handle_for(name)?;
        Ok(self.submit(&handle, Operation::Start(mode)))
    }

    pub fn stop(&self, name: &str) -> Result<Ticket> {
        let handle = self.handle_for(name)?;
        Ok(self.submit(&handle, Operation::Stop))
    }

    pub fn restart(&self, name: &str) -> Result<Ticket> {
        let handle = self.handle_for(name)?;
        Ok(self.submit(&handle, Operation::Restart))
    }

    /// Current state of `name`. Services never touched report the default
    /// stopped state.
    pub fn state(&self, name: &str) -> Result<ProcessState> {
        self.registry.lookup(name)?;
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(handles
            .get(name)
            .map(ServiceHandle::state)
            .unwrap_or_default())
    }

    pub fn subscribe(&self, name: &str) -> Result<watch::Receiver<ProcessState>> {
        Ok(self.handle_for(name)?.subscribe())
    }

    /// Stop every service that has a controller and wait for all of them.
    ///
    /// The stop is queued behind whatever the controller has not applied yet,
    /// so a start accepted just before shutdown is stopped as well.
    pub async fn shutdown(&self) {
        let tickets: Vec<Ticket> = {
            let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
            handles
                .values()
                .map(|handle| handle.submit(Operation::Stop))
                .collect()
        };
        info!(count = tickets.len(), "stopping services");
        for ticket in tickets {
            let service = ticket.service().to_string();
            if let Err(e) = ticket.outcome().await {
                warn!(%service, "stop during shutdown failed: {e}");
            }
        }
    }

    fn submit(&self, handle: &ServiceHandle, operation: Operation) -> Ticket {
        debug!(service = handle.name(), %operation, "dispatching");
        handle.submit(operation)
    }

    /// Controller for `name`, created on first use.
    fn handle_for(&self, name: &str) -> Result<ServiceHandle> {
        let config = self.registry.lookup(name)?;
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = handles
            .entry(config.name.clone())
            .or_insert_with(|| ServiceHandle::spawn(config, Arc::clone(&self.settings)));
        Ok(handle.clone())
    }
}
