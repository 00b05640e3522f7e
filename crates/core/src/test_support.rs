// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory, call-recording fakes for the capability-set traits.
//!
//! Grounded on the teacher's `FakeAgentAdapter` shape (`oj-adapters::agent::fake`):
//! a `Mutex`-guarded inner struct, a `calls()` accessor, and `set_*_error` knobs
//! for injecting failures. Exposed behind `test-support` so downstream crates
//! (`svcmgr-adapters`, `svcmgr-daemon`) can build their own fakes/tests on top
//! without duplicating this scaffolding.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Error;
use crate::ident::InstanceIdent;
use crate::instance::InstanceInfo;
use crate::overrides::OverrideEnvVars;
use crate::service::{LayerInfo, ServiceInfo};
use crate::status::{InstancesRunStatus, InstancesUpdateStatus, RunState, RunStatus};
use crate::traits::{OciSpecProducer, Runner, ServiceManager, StatusReceiver, Storage};

/// Recorded call to [`FakeRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerCall {
    Start(InstanceIdent),
    Stop(InstanceIdent),
}

struct FakeRunnerState {
    calls: Vec<RunnerCall>,
    start_errors: HashMap<InstanceIdent, Error>,
    stop_errors: HashMap<InstanceIdent, Error>,
    broken_after_start: std::collections::HashSet<InstanceIdent>,
    panic_on_start: std::collections::HashSet<InstanceIdent>,
}

/// A runner that starts/stops instances in memory, recording every call so
/// tests can assert on ordering and make individual instances fail.
pub struct FakeRunner {
    state: Mutex<FakeRunnerState>,
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeRunnerState {
                calls: Vec::new(),
                start_errors: HashMap::new(),
                stop_errors: HashMap::new(),
                broken_after_start: std::collections::HashSet::new(),
                panic_on_start: std::collections::HashSet::new(),
            }),
        }
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).calls.clone()
    }

    pub fn fail_start(&self, ident: InstanceIdent, err: Error) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .start_errors
            .insert(ident, err);
    }

    pub fn fail_stop(&self, ident: InstanceIdent, err: Error) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .stop_errors
            .insert(ident, err);
    }

    /// Make the next `start` call for `ident` panic instead of returning,
    /// to exercise the worker-job-panic path (`spec.md` §4.7).
    pub fn panic_on_start(&self, ident: InstanceIdent) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .panic_on_start
            .insert(ident);
    }
}

impl Runner for FakeRunner {
    fn start(&self, instance: &InstanceInfo, _oci_spec: &str) -> Result<RunStatus, Error> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.calls.push(RunnerCall::Start(instance.ident.clone()));
        if state.panic_on_start.remove(&instance.ident) {
            drop(state);
            panic!("forced test panic starting {}", instance.ident);
        }
        if let Some(err) = state.start_errors.remove(&instance.ident) {
            return Err(err);
        }
        Ok(RunStatus {
            state: RunState::Running,
            observed_at_ms: 0,
        })
    }

    fn stop(&self, ident: &InstanceIdent) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.calls.push(RunnerCall::Stop(ident.clone()));
        if let Some(err) = state.stop_errors.remove(ident) {
            return Err(err);
        }
        Ok(())
    }
}

/// A service manager that resolves every pushed `ServiceInfo` to a synthetic
/// local path, unless the service id has been marked broken.
pub struct FakeServiceManager {
    broken: Mutex<std::collections::HashSet<String>>,
    resolved: Mutex<HashMap<String, (String, String)>>,
    process_error: Mutex<Option<Error>>,
}

impl Default for FakeServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServiceManager {
    pub fn new() -> Self {
        Self {
            broken: Mutex::new(std::collections::HashSet::new()),
            resolved: Mutex::new(HashMap::new()),
            process_error: Mutex::new(None),
        }
    }

    pub fn mark_broken(&self, service_id: impl Into<String>) {
        self.broken
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(service_id.into());
    }

    pub fn fail_next_process(&self, err: Error) {
        *self.process_error.lock().unwrap_or_else(|p| p.into_inner()) = Some(err);
    }
}

impl ServiceManager for FakeServiceManager {
    fn process_desired_services(
        &self,
        services: &[ServiceInfo],
        _layers: &[LayerInfo],
    ) -> Result<(), Error> {
        if let Some(err) = self.process_error.lock().unwrap_or_else(|p| p.into_inner()).take() {
            return Err(err);
        }
        let broken = self.broken.lock().unwrap_or_else(|p| p.into_inner());
        let mut resolved = self.resolved.lock().unwrap_or_else(|p| p.into_inner());
        for svc in services {
            if broken.contains(&svc.service_id) {
                continue;
            }
            resolved.insert(
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
            .resolved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(service_id)
            .map(|(path, _)| path.clone()))
    }

    fn get_service_version(&self, service_id: &str) -> Result<Option<String>, Error> {
        Ok(self
            .resolved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(service_id)
            .map(|(_, version)| version.clone()))
    }
}

/// Produces a deterministic, inspectable "spec" string instead of a real OCI
/// document: `service_path|ident|sorted env pairs`.
pub struct FakeOciSpecProducer {
    fail_for: Mutex<std::collections::HashSet<InstanceIdent>>,
}

impl Default for FakeOciSpecProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeOciSpecProducer {
    pub fn new() -> Self {
        Self {
            fail_for: Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub fn fail_for(&self, ident: InstanceIdent) {
        self.fail_for.lock().unwrap_or_else(|p| p.into_inner()).insert(ident);
    }
}

impl OciSpecProducer for FakeOciSpecProducer {
    fn produce(
        &self,
        service_path: &str,
        instance: &InstanceInfo,
        env_overlay: &HashMap<String, String>,
    ) -> Result<String, Error> {
        if self
            .fail_for
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&instance.ident)
        {
            return Err(Error::InvalidSpec("forced test failure".into()));
        }
        let mut pairs: Vec<(&String, &String)> = env_overlay.iter().collect();
        pairs.sort_by_key(|(k, _)| (*k).clone());
        let env = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!("{service_path}|{}|{env}", instance.ident))
    }
}

/// In-memory [`Storage`] backing every persisted record in plain maps.
#[derive(Default)]
struct FakeStorageState {
    instances: HashMap<InstanceIdent, InstanceInfo>,
    operation_version: u64,
    overrides: OverrideEnvVars,
    online_time: Option<u64>,
}

pub struct FakeStorage {
    state: Mutex<FakeStorageState>,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeStorageState::default()),
        }
    }

    /// Seed a persisted instance set before constructing a dispatcher, to
    /// simulate crash-recovery scenarios.
    pub fn seed_instances(&self, instances: Vec<InstanceInfo>) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        for info in instances {
            state.instances.insert(info.ident.clone(), info);
        }
    }

    pub fn seed_operation_version(&self, version: u64) {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).operation_version = version;
    }

    pub fn instance_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).instances.len()
    }
}

impl Storage for FakeStorage {
    fn add_instance(&self, instance: &InstanceInfo) -> Result<(), Error> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .instances
            .insert(instance.ident.clone(), instance.clone());
        Ok(())
    }

    fn update_instance(&self, instance: &InstanceInfo) -> Result<(), Error> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .instances
            .insert(instance.ident.clone(), instance.clone());
        Ok(())
    }

    fn remove_instance(&self, ident: &InstanceIdent) -> Result<(), Error> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).instances.remove(ident);
        Ok(())
    }

    fn get_all_instances(&self) -> Result<Vec<InstanceInfo>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .instances
            .values()
            .cloned()
            .collect())
    }

    fn get_operation_version(&self) -> Result<u64, Error> {
        Ok(self.state.lock().unwrap_or_else(|p| p.into_inner()).operation_version)
    }

    fn set_operation_version(&self, version: u64) -> Result<(), Error> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).operation_version = version;
        Ok(())
    }

    fn get_override_env_vars(&self) -> Result<OverrideEnvVars, Error> {
        Ok(self.state.lock().unwrap_or_else(|p| p.into_inner()).overrides.clone())
    }

    fn set_override_env_vars(&self, overrides: &OverrideEnvVars) -> Result<(), Error> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).overrides = overrides.clone();
        Ok(())
    }

    fn get_online_time(&self) -> Result<Option<u64>, Error> {
        Ok(self.state.lock().unwrap_or_else(|p| p.into_inner()).online_time)
    }

    fn set_online_time(&self, epoch_ms: u64) -> Result<(), Error> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).online_time = Some(epoch_ms);
        Ok(())
    }
}

/// Records every published snapshot/delta in arrival order.
#[derive(Default)]
pub struct FakeStatusReceiver {
    snapshots: Mutex<Vec<InstancesRunStatus>>,
    deltas: Mutex<Vec<InstancesUpdateStatus>>,
}

impl FakeStatusReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<InstancesRunStatus> {
        self.snapshots.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn deltas(&self) -> Vec<InstancesUpdateStatus> {
        self.deltas.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn last_snapshot(&self) -> Option<InstancesRunStatus> {
        self.snapshots.lock().unwrap_or_else(|p| p.into_inner()).last().cloned()
    }
}

impl StatusReceiver for FakeStatusReceiver {
    fn instances_run_status(&self, snapshot: &InstancesRunStatus) {
        self.snapshots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(snapshot.clone());
    }

    fn instances_update_status(&self, delta: &InstancesUpdateStatus) {
        self.deltas.lock().unwrap_or_else(|p| p.into_inner()).push(delta.clone());
    }
}
