// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory [`ServiceManager`] that resolves every pushed service to a
//! synthetic content-addressed path, simulating the out-of-scope artifact
//! store (`spec.md` §1, §6).

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use svcmgr_core::{Error, LayerInfo, ServiceInfo, ServiceManager};

/// Recorded call to [`InMemoryServiceManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceManagerCall {
    ProcessDesiredServices { service_ids: Vec<String> },
}

struct State {
    resolved: HashMap<String, (String, String)>,
    broken: HashSet<String>,
    calls: Vec<ServiceManagerCall>,
    process_error: Option<Error>,
}

/// Resolves every service in a `process_desired_services` push to
/// `/var/svc/<service_id>/<version>`, unless the service id has been
/// marked broken with [`Self::mark_broken`] — in which case it resolves to
/// nothing, matching the "broken service" case in `spec.md` §4.2.
pub struct InMemoryServiceManager {
    state: Mutex<State>,
}

impl Default for InMemoryServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryServiceManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                resolved: HashMap::new(),
                broken: HashSet::new(),
                calls: Vec::new(),
                process_error: None,
            }),
        }
    }

    /// Mark `service_id` as unresolvable: future `process_desired_services`
    /// pushes will skip it, so `get_service_path`/`get_service_version`
    /// keep returning `Ok(None)` for it.
    pub fn mark_broken(&self, service_id: impl Into<String>) {
        self.state.lock().broken.insert(service_id.into());
    }

    pub fn fail_next_process(&self, err: Error) {
        self.state.lock().process_error = Some(err);
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn calls(&self) -> Vec<ServiceManagerCall> {
        self.state.lock().calls.clone()
    }
}

impl ServiceManager for InMemoryServiceManager {
    fn process_desired_services(
        &self,
        services: &[ServiceInfo],
        layers: &[LayerInfo],
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.calls.push(ServiceManagerCall::ProcessDesiredServices {
            service_ids: services.iter().map(|s| s.service_id.clone()).collect(),
        });
        if let Some(err) = state.process_error.take() {
            return Err(err);
        }
        tracing::debug!(
            services = services.len(),
            layers = layers.len(),
            "in-memory service manager: processed desired services"
        );
        for svc in services {
            if state.broken.contains(&svc.service_id) {
                tracing::warn!(service_id = %svc.service_id, "in-memory service manager: service is broken");
                continue;
            }
            state.resolved.insert(
                svc.service_id.clone(),
                (
                    format!("/var/svc/{}/{}", svc.service_id, svc.version),
                    svc.version.clone(),
                ),
            );
        }
        Ok(())
    }

    fn get_service_path(&self, service_id: &str) -> Result<Option<String>, Error> {
        Ok(self
            .state
            .lock()
            .resolved
            .get(service_id)
            .map(|(path, _)| path.clone()))
    }

    fn get_service_version(&self, service_id: &str) -> Result<Option<String>, Error> {
        Ok(self
            .state
            .lock()
            .resolved
            .get(service_id)
            .map(|(_, version)| version.clone()))
    }
}

#[cfg(test)]
#[path = "service_manager_tests.rs"]
mod tests;
