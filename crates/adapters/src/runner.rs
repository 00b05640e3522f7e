// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A simulated [`Runner`] that tracks started idents in memory and always
//! answers immediately, logging every call with `tracing`. Stands in for
//! the out-of-scope process/container runner (`spec.md` §1, §6).

use std::collections::HashMap;

use parking_lot::Mutex;
use svcmgr_core::{Error, InstanceIdent, InstanceInfo, RunState, RunStatus, Runner};

/// Recorded call to [`SimulatedRunner`], kept for test/demo inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerCall {
    Start(InstanceIdent),
    Stop(InstanceIdent),
}

struct State {
    started: HashMap<InstanceIdent, ()>,
    calls: Vec<RunnerCall>,
    start_errors: HashMap<InstanceIdent, Error>,
    stop_errors: HashMap<InstanceIdent, Error>,
}

/// A `Runner` with no real process underneath: `start` always reports
/// `Running` unless a one-shot error was primed with [`Self::fail_start`],
/// and `stop` is idempotent by construction (there is nothing to actually
/// stop), matching `spec.md` §4.2's "AlreadyStopped" success case.
pub struct SimulatedRunner {
    state: Mutex<State>,
}

impl Default for SimulatedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                started: HashMap::new(),
                calls: Vec::new(),
                start_errors: HashMap::new(),
                stop_errors: HashMap::new(),
            }),
        }
    }

    /// Make the next `start` call for `ident` fail with `err`.
    pub fn fail_start(&self, ident: InstanceIdent, err: Error) {
        self.state.lock().start_errors.insert(ident, err);
    }

    /// Make the next `stop` call for `ident` fail with `err`.
    pub fn fail_stop(&self, ident: InstanceIdent, err: Error) {
        self.state.lock().stop_errors.insert(ident, err);
    }

    pub fn is_started(&self, ident: &InstanceIdent) -> bool {
        self.state.lock().started.contains_key(ident)
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn calls(&self) -> Vec<RunnerCall> {
        self.state.lock().calls.clone()
    }
}

impl Runner for SimulatedRunner {
    fn start(&self, instance: &InstanceInfo, oci_spec: &str) -> Result<RunStatus, Error> {
        let mut state = self.state.lock();
        state.calls.push(RunnerCall::Start(instance.ident.clone()));
        if let Some(err) = state.start_errors.remove(&instance.ident) {
            tracing::warn!(ident = %instance.ident, %err, "simulated runner: forced start failure");
            return Err(err);
        }
        state.started.insert(instance.ident.clone(), ());
        tracing::info!(ident = %instance.ident, spec_len = oci_spec.len(), "simulated runner: started instance");
        Ok(RunStatus {
            state: RunState::Running,
            observed_at_ms: 0,
        })
    }

    fn stop(&self, ident: &InstanceIdent) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.calls.push(RunnerCall::Stop(ident.clone()));
        if let Some(err) = state.stop_errors.remove(ident) {
            tracing::warn!(%ident, %err, "simulated runner: forced stop failure");
            return Err(err);
        }
        let was_started = state.started.remove(ident).is_some();
        tracing::info!(%ident, already_stopped = !was_started, "simulated runner: stopped instance");
        Ok(())
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
