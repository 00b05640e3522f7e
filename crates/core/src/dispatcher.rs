// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reconciliation engine (`spec.md` §4.1).
//!
//! `Dispatcher` is the single logical owner of the instance map and
//! service cache. Its public methods serialize on `op_lock`: exactly one
//! of `run_instances`, `override_env_vars`, `set_cloud_connection`, or the
//! internal `run_last_instances` runs at a time, so an external caller
//! sees calls applied in arrival order with no interleaving. `update_run_status`
//! is the one operation that does not take `op_lock` — it is the runner's
//! callback and is documented to run concurrently with a reconcile.

use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::Error;
use crate::ident::InstanceIdent;
use crate::instance::{FailureReason, Instance, InstanceInfo, InstanceState};
use crate::limits::Limits;
use crate::operation_version::{self, C_OPERATION_VERSION};
use crate::overrides::{EnvVarStatus, OverrideEnvVarEntry, OverrideEnvVars};
use crate::service::{LayerInfo, ServiceCache, ServiceData, ServiceInfo};
use crate::status::{InstanceStatus, RunState, RunStatus, StatusAggregator};
use crate::traits::{OciSpecProducer, Runner, ServiceManager, StatusReceiver, Storage};
use crate::worker_pool::WorkerPool;

/// Construction-time collaborators (`spec.md` §9: explicit dependency
/// injection in place of the source's cyclic interface wiring).
pub struct DispatcherDeps {
    pub runner: Arc<dyn Runner>,
    pub service_manager: Arc<dyn ServiceManager>,
    pub oci_spec_producer: Arc<dyn OciSpecProducer>,
    pub storage: Arc<dyn Storage>,
    pub status_receiver: Arc<dyn StatusReceiver>,
    pub clock: Arc<dyn Clock>,
    pub limits: Limits,
}

struct Shared {
    instances: BTreeMap<InstanceIdent, Instance>,
    service_cache: ServiceCache,
}

pub struct Dispatcher {
    deps: Arc<DispatcherDeps>,
    op_lock: Mutex<()>,
    shared: Arc<Mutex<Shared>>,
    pool: WorkerPool,
    aggregator: Mutex<StatusAggregator>,
    publish_lock: Mutex<()>,
    cycle_active: Mutex<bool>,
    connection_gate: Mutex<crate::connection_gate::ConnectionGate>,
    overrides: Mutex<OverrideEnvVars>,
    closing: Mutex<bool>,
}

impl Dispatcher {
    /// Bring up the dispatcher: purge persisted instances if they predate
    /// this binary's operation version, then replay the (possibly now
    /// empty) persisted set through `run_last_instances` (`spec.md` §4.1,
    /// §6, testable property 7).
    pub fn init(deps: DispatcherDeps) -> Result<Self, Error> {
        let deps = Arc::new(deps);

        let stored_version = deps.storage.get_operation_version()?;
        if operation_version::needs_purge(stored_version) {
            tracing::warn!(
                stored_version,
                current = C_OPERATION_VERSION,
                "persisted operation version predates this binary; purging instance records"
            );
            for info in deps.storage.get_all_instances()? {
                deps.storage.remove_instance(&info.ident)?;
            }
        }
        deps.storage.set_operation_version(C_OPERATION_VERSION)?;

        let persisted = deps.storage.get_all_instances()?;
        let overrides = deps.storage.get_override_env_vars()?;
        let pool_size = deps.limits.worker_pool_size;
        let queue_capacity = deps.limits.max_instances.max(pool_size);

        let dispatcher = Self {
            deps: Arc::clone(&deps),
            op_lock: Mutex::new(()),
            shared: Arc::new(Mutex::new(Shared {
                instances: BTreeMap::new(),
                service_cache: ServiceCache::new(),
            })),
            pool: WorkerPool::new(pool_size, queue_capacity),
            aggregator: Mutex::new(StatusAggregator::new()),
            publish_lock: Mutex::new(()),
            cycle_active: Mutex::new(false),
            connection_gate: Mutex::new(crate::connection_gate::ConnectionGate::new()),
            overrides: Mutex::new(overrides),
            closing: Mutex::new(false),
        };

        dispatcher.run_last_instances(persisted)?;
        Ok(dispatcher)
    }

    fn ensure_not_closing(&self) -> Result<(), Error> {
        if *self.closing.lock() {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    /// Replace the goal state and reconcile towards it (`spec.md` §4.1).
    pub fn run_instances(
        &self,
        services: Vec<ServiceInfo>,
        layers: Vec<LayerInfo>,
        instances: Vec<InstanceInfo>,
        force_restart: bool,
    ) -> Result<(), Error> {
        let _op_guard = self.op_lock.lock();
        self.ensure_not_closing()?;

        self.deps
            .limits
            .check(services.len(), layers.len(), instances.len())
            .map_err(Error::InvalidArgument)?;

        let service_ids: HashSet<&str> = services.iter().map(|s| s.service_id.as_str()).collect();
        for info in &instances {
            info.validate()?;
            if !service_ids.contains(info.ident.service_id.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "instance {} references unknown service {}",
                    info.ident, info.ident.service_id
                )));
            }
        }

        let desired: BTreeMap<InstanceIdent, InstanceInfo> =
            instances.into_iter().map(|i| (i.ident.clone(), i)).collect();

        // spec.md §3: "expired variables are silently dropped at the next
        // reconcile" — purge before the start phase evaluates overlays, and
        // persist the pruned set regardless of how the rest of the cycle
        // turns out.
        let now = self.deps.clock.epoch_ms();
        let dropped = self.overrides.lock().purge_expired(now);
        if dropped > 0 {
            let snapshot = self.overrides.lock().clone();
            self.deps.storage.set_override_env_vars(&snapshot)?;
        }

        let pre_cycle = self.shared.lock().instances.clone();
        *self.cycle_active.lock() = true;
        let result = self.run_cycle_body(services, layers, desired, force_restart, &pre_cycle);
        *self.cycle_active.lock() = false;

        if let Err(err) = result {
            self.shared.lock().instances = pre_cycle;
            return Err(err);
        }

        self.publish_snapshot();
        Ok(())
    }

    fn run_cycle_body(
        &self,
        services: Vec<ServiceInfo>,
        layers: Vec<LayerInfo>,
        desired: BTreeMap<InstanceIdent, InstanceInfo>,
        force_restart: bool,
        pre_cycle: &BTreeMap<InstanceIdent, Instance>,
    ) -> Result<(), Error> {
        // Step 2: service push.
        self.deps
            .service_manager
            .process_desired_services(&services, &layers)?;

        // Step 3: cache update. Capture the pre-update versions so the
        // diff in step 4 can detect a service-version bump.
        let old_versions: std::collections::HashMap<String, String> = {
            let shared = self.shared.lock();
            services
                .iter()
                .filter_map(|svc| {
                    shared
                        .service_cache
                        .get(&svc.service_id)
                        .map(|data| (svc.service_id.clone(), data.info.version.clone()))
                })
                .collect()
        };
        let mut referenced = HashSet::with_capacity(services.len());
        {
            let mut shared = self.shared.lock();
            for svc in &services {
                referenced.insert(svc.service_id.clone());
                if let (Ok(Some(path)), Ok(Some(version))) = (
                    self.deps.service_manager.get_service_path(&svc.service_id),
                    self.deps.service_manager.get_service_version(&svc.service_id),
                ) {
                    shared.service_cache.insert(ServiceData {
                        info: ServiceInfo {
                            service_id: svc.service_id.clone(),
                            version,
                            provider_id: svc.provider_id.clone(),
                        },
                        local_path: path,
                    });
                }
            }
        }
        let new_versions: std::collections::HashMap<String, String> = {
            let shared = self.shared.lock();
            services
                .iter()
                .filter_map(|svc| {
                    shared
                        .service_cache
                        .get(&svc.service_id)
                        .map(|data| (svc.service_id.clone(), data.info.version.clone()))
                })
                .collect()
        };

        // Step 4: diff.
        let (to_stop, to_start) = compute_diff(
            pre_cycle,
            &desired,
            force_restart,
            &old_versions,
            &new_versions,
        );

        // Step 5: stop phase.
        self.run_stop_phase(&to_stop)?;

        // Instances whose goal state dropped them entirely are dropped
        // from the live map once their stop reached a terminal state
        // (`spec.md` §3). Restarting instances stay — they appear in
        // `to_start` below.
        {
            let mut shared = self.shared.lock();
            for ident in &to_stop {
                if !desired.contains_key(ident) {
                    let terminal = shared
                        .instances
                        .get(ident)
                        .is_some_and(Instance::is_terminal);
                    if terminal {
                        shared.instances.remove(ident);
                    }
                }
            }
        }

        // Step 6: start phase, highest priority first, ident as tiebreak.
        let mut to_start_sorted: Vec<InstanceInfo> = to_start;
        to_start_sorted.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.ident.cmp(&b.ident)));
        self.run_start_phase(&to_start_sorted)?;

        self.shared.lock().service_cache.purge_unreferenced(&referenced);

        // Step 7: persist.
        let pre_idents: HashSet<InstanceIdent> = pre_cycle.keys().cloned().collect();
        let (to_remove, to_upsert): (Vec<InstanceIdent>, Vec<InstanceInfo>) = {
            let shared = self.shared.lock();
            let final_idents: HashSet<InstanceIdent> = shared.instances.keys().cloned().collect();
            let to_remove = pre_idents.difference(&final_idents).cloned().collect();
            let to_upsert = shared
                .instances
                .values()
                .map(|inst| inst.desired.clone())
                .collect();
            (to_remove, to_upsert)
        };
        for ident in &to_remove {
            self.deps.storage.remove_instance(ident)?;
        }
        for info in &to_upsert {
            if pre_idents.contains(&info.ident) {
                self.deps.storage.update_instance(info)?;
            } else {
                self.deps.storage.add_instance(info)?;
            }
        }

        Ok(())
    }

    /// Validate and apply an override batch, then silently restart any
    /// live instance an accepted entry actually affects (`spec.md` §4.4).
    pub fn override_env_vars(
        &self,
        entries: Vec<OverrideEnvVarEntry>,
    ) -> Result<Vec<EnvVarStatus>, Error> {
        let _op_guard = self.op_lock.lock();
        self.ensure_not_closing()?;

        let live_idents: HashSet<InstanceIdent> =
            self.shared.lock().instances.keys().cloned().collect();

        let affected_selectors: Vec<_> = entries
            .iter()
            .map(|e| e.selector.clone())
            .collect();

        let mut overrides = self.overrides.lock();
        let statuses = overrides.apply(entries, &live_idents);
        self.deps.storage.set_override_env_vars(&overrides)?;
        drop(overrides);

        let affected: HashSet<InstanceIdent> = statuses
            .iter()
            .zip(affected_selectors.iter())
            .filter(|(status, _)| matches!(status, EnvVarStatus::Applied))
            .flat_map(|(_, selector)| {
                live_idents
                    .iter()
                    .filter(|ident| selector.matches(ident))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        self.reapply_overrides(affected)?;
        Ok(statuses)
    }

    fn reapply_overrides(&self, affected: HashSet<InstanceIdent>) -> Result<(), Error> {
        if affected.is_empty() {
            return Ok(());
        }
        let to_restart: Vec<InstanceInfo> = {
            let shared = self.shared.lock();
            affected
                .iter()
                .filter_map(|ident| shared.instances.get(ident))
                .filter(|inst| !inst.is_terminal())
                .map(|inst| inst.desired.clone())
                .collect()
        };
        if to_restart.is_empty() {
            return Ok(());
        }

        *self.cycle_active.lock() = true;
        let idents: Vec<InstanceIdent> = to_restart.iter().map(|i| i.ident.clone()).collect();
        let result = self
            .run_stop_phase(&idents)
            .and_then(|()| self.run_start_phase(&to_restart));
        *self.cycle_active.lock() = false;
        result?;

        self.publish_delta();
        Ok(())
    }

    /// Record the cloud-connectivity flag; the first connect since boot
    /// (or any connect after `force_resync`) replays the persisted
    /// instance set (`spec.md` §4.5, §9 Open Questions).
    pub fn set_cloud_connection(&self, connected: bool) -> Result<(), Error> {
        let should_resync = {
            let mut gate = self.connection_gate.lock();
            if connected {
                gate.on_connect()
            } else {
                gate.on_disconnect();
                false
            }
        };
        if connected {
            self.deps.storage.set_online_time(self.deps.clock.epoch_ms())?;
        }
        if should_resync {
            let persisted = self.deps.storage.get_all_instances()?;
            self.run_last_instances(persisted)?;
        }
        Ok(())
    }

    /// Expose the escape hatch from `spec.md` §9 Open Questions: force
    /// the next connect to replay regardless of prior connects.
    pub fn force_resync_on_next_connect(&self) {
        self.connection_gate.lock().force_resync();
    }

    /// Runner callback: apply status observations and, outside an active
    /// reconcile, publish the resulting delta (`spec.md` §4.3).
    pub fn update_run_status(&self, updates: Vec<(InstanceIdent, RunStatus)>) -> Result<(), Error> {
        self.ensure_not_closing()?;

        // spec.md §4.3: only a transition into a terminal state
        // (`Stopped`/`Failed`) triggers publication; a `Running`/`Unknown`
        // heartbeat that leaves the lifecycle state unchanged must not.
        let mut touched_terminal = false;
        {
            let mut shared = self.shared.lock();
            for (ident, run_status) in updates {
                match shared.instances.get_mut(&ident) {
                    Some(inst) => {
                        inst.observe_run_status(run_status);
                        if inst.is_terminal() {
                            touched_terminal = true;
                        }
                    }
                    None => {
                        tracing::debug!(%ident, "dropping run-status update for unknown instance");
                    }
                }
            }
        }

        if touched_terminal && !*self.cycle_active.lock() {
            self.publish_delta();
        }
        Ok(())
    }

    fn run_last_instances(&self, persisted: Vec<InstanceInfo>) -> Result<(), Error> {
        let _op_guard = self.op_lock.lock();
        self.ensure_not_closing()?;

        let mut sorted = persisted;
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.ident.cmp(&b.ident)));

        *self.cycle_active.lock() = true;
        let result = self.run_start_phase(&sorted);
        *self.cycle_active.lock() = false;
        result?;

        self.publish_snapshot();
        Ok(())
    }

    fn run_stop_phase(&self, idents: &[InstanceIdent]) -> Result<(), Error> {
        for ident in idents {
            let mut shared = self.shared.lock();
            if let Some(inst) = shared.instances.get_mut(ident) {
                inst.transition(InstanceState::Stopping);
            }
            drop(shared);

            let deps = Arc::clone(&self.deps);
            let shared = Arc::clone(&self.shared);
            let ident = ident.clone();
            self.pool.submit(move || run_stop_job(&deps, &shared, ident))?;
        }
        self.pool.wait_drain();
        Ok(())
    }

    fn run_start_phase(&self, infos: &[InstanceInfo]) -> Result<(), Error> {
        let overrides_snapshot = Arc::new(self.overrides.lock().clone());
        let now = self.deps.clock.epoch_ms();

        for info in infos {
            {
                let mut shared = self.shared.lock();
                shared
                    .instances
                    .insert(info.ident.clone(), Instance::created(info.clone()));
            }

            let deps = Arc::clone(&self.deps);
            let shared = Arc::clone(&self.shared);
            let overrides_snapshot = Arc::clone(&overrides_snapshot);
            let info = info.clone();
            self.pool
                .submit(move || run_start_job(&deps, &shared, &overrides_snapshot, now, info))?;
        }
        self.pool.wait_drain();
        Ok(())
    }

    fn publish_snapshot(&self) {
        let statuses: Vec<InstanceStatus> = self
            .shared
            .lock()
            .instances
            .values()
            .map(InstanceStatus::from_instance)
            .collect();
        let now = self.deps.clock.epoch_ms();

        let _publish_guard = self.publish_lock.lock();
        let snapshot = self
            .aggregator
            .lock()
            .snapshot(statuses, C_OPERATION_VERSION, now);
        self.deps.status_receiver.instances_run_status(&snapshot);
    }

    fn publish_delta(&self) {
        let statuses: Vec<InstanceStatus> = self
            .shared
            .lock()
            .instances
            .values()
            .map(InstanceStatus::from_instance)
            .collect();
        let now = self.deps.clock.epoch_ms();

        let _publish_guard = self.publish_lock.lock();
        let delta = self.aggregator.lock().diff(statuses, now);
        if !delta.is_empty() {
            self.deps.status_receiver.instances_update_status(&delta);
        }
    }

    /// Stop accepting new work, let in-flight jobs finish, then join the
    /// worker pool (`spec.md` §5 Cancellation / timeout).
    pub fn shutdown(self) {
        *self.closing.lock() = true;
        self.pool.wait_drain();
        let Dispatcher { pool, .. } = self;
        pool.shutdown();
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn live_instance_count(&self) -> usize {
        self.shared.lock().instances.len()
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn instance_state(&self, ident: &InstanceIdent) -> Option<InstanceState> {
        self.shared.lock().instances.get(ident).map(|i| i.state)
    }
}

fn compute_diff(
    live: &BTreeMap<InstanceIdent, Instance>,
    desired: &BTreeMap<InstanceIdent, InstanceInfo>,
    force_restart: bool,
    old_versions: &std::collections::HashMap<String, String>,
    new_versions: &std::collections::HashMap<String, String>,
) -> (Vec<InstanceIdent>, Vec<InstanceInfo>) {
    let mut to_stop = Vec::new();
    for (ident, inst) in live {
        match desired.get(ident) {
            None => to_stop.push(ident.clone()),
            Some(info) => {
                let version_changed = old_versions.get(&ident.service_id)
                    != new_versions.get(&ident.service_id);
                if force_restart
                    || version_changed
                    || info.resource_limits != inst.desired.resource_limits
                {
                    to_stop.push(ident.clone());
                }
            }
        }
    }
    let to_stop_set: HashSet<InstanceIdent> = to_stop.iter().cloned().collect();

    let to_start: Vec<InstanceInfo> = desired
        .iter()
        .filter(|(ident, _)| !live.contains_key(*ident) || to_stop_set.contains(*ident))
        .map(|(_, info)| info.clone())
        .collect();

    (to_stop, to_start)
}

fn resolve_service(
    deps: &DispatcherDeps,
    shared: &Mutex<Shared>,
    service_id: &str,
) -> Option<ServiceData> {
    if let Some(data) = shared.lock().service_cache.get(service_id) {
        return Some(data.clone());
    }
    let path = deps.service_manager.get_service_path(service_id).ok().flatten()?;
    let version = deps
        .service_manager
        .get_service_version(service_id)
        .ok()
        .flatten()?;
    let data = ServiceData {
        info: ServiceInfo {
            service_id: service_id.to_string(),
            version,
            provider_id: String::new(),
        },
        local_path: path,
    };
    shared.lock().service_cache.insert(data.clone());
    Some(data)
}

/// Run a start job, converting a panic into a per-instance
/// `Failed(Internal)` record instead of letting it escape (`spec.md`
/// §4.7: "Worker panic / unexpected fault | per job | convert to
/// Failed(Internal), do not propagate"). The worker pool's own
/// `catch_unwind` keeps a panicking job from taking a thread down, but it
/// has no view of `ident`/`shared` to fail the instance — that has to
/// happen here, where both are in scope.
fn run_start_job(
    deps: &DispatcherDeps,
    shared: &Mutex<Shared>,
    overrides: &OverrideEnvVars,
    now: u64,
    info: InstanceInfo,
) {
    let ident = info.ident.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_start_job_inner(deps, shared, overrides, now, &info)
    }));
    if let Err(payload) = outcome {
        let message = crate::worker_pool::panic_message(&payload);
        tracing::error!(%ident, panic = %message, "start job panicked");
        let mut s = shared.lock();
        if let Some(inst) = s.instances.get_mut(&ident) {
            inst.fail(FailureReason::Internal(message));
        }
    }
}

fn run_start_job_inner(
    deps: &DispatcherDeps,
    shared: &Mutex<Shared>,
    overrides: &OverrideEnvVars,
    now: u64,
    info: &InstanceInfo,
) {
    let ident = info.ident.clone();

    {
        let mut s = shared.lock();
        if let Some(inst) = s.instances.get_mut(&ident) {
            inst.transition(InstanceState::Starting);
        }
    }

    let Some(service_data) = resolve_service(deps, shared, &ident.service_id) else {
        let mut s = shared.lock();
        if let Some(inst) = s.instances.get_mut(&ident) {
            inst.fail(FailureReason::BrokenService);
        }
        return;
    };

    let env_overlay = overrides.evaluate(&ident, now);
    let oci_spec = match deps
        .oci_spec_producer
        .produce(&service_data.local_path, info, &env_overlay)
    {
        Ok(spec) => spec,
        Err(_) => {
            let mut s = shared.lock();
            if let Some(inst) = s.instances.get_mut(&ident) {
                inst.fail(FailureReason::InvalidSpec);
            }
            return;
        }
    };

    match deps.runner.start(info, &oci_spec) {
        Ok(run_status) => {
            let mut s = shared.lock();
            if let Some(inst) = s.instances.get_mut(&ident) {
                inst.env_overlay = env_overlay;
                match run_status.state {
                    RunState::Running => {
                        inst.last_run = Some(run_status);
                        inst.transition(InstanceState::Running);
                    }
                    RunState::Exited { .. } | RunState::Crashed { .. } => {
                        inst.last_run = Some(run_status.clone());
                        inst.fail(FailureReason::Runner(format!("{:?}", run_status.state)));
                    }
                    RunState::Unknown => {
                        inst.last_run = Some(run_status);
                    }
                }
            }
        }
        Err(e) => {
            let mut s = shared.lock();
            if let Some(inst) = s.instances.get_mut(&ident) {
                inst.fail(FailureReason::Runner(e.to_string()));
            }
        }
    }
}

/// Run a stop job, converting a panic into a per-instance
/// `Failed(Internal)` record for the same reason `run_start_job` does.
fn run_stop_job(deps: &DispatcherDeps, shared: &Mutex<Shared>, ident: InstanceIdent) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_stop_job_inner(deps, shared, &ident)
    }));
    if let Err(payload) = outcome {
        let message = crate::worker_pool::panic_message(&payload);
        tracing::error!(%ident, panic = %message, "stop job panicked");
        let mut s = shared.lock();
        if let Some(inst) = s.instances.get_mut(&ident) {
            inst.fail(FailureReason::Internal(message));
        }
    }
}

fn run_stop_job_inner(deps: &DispatcherDeps, shared: &Mutex<Shared>, ident: &InstanceIdent) {
    match deps.runner.stop(ident) {
        Ok(()) => {
            let mut s = shared.lock();
            if let Some(inst) = s.instances.get_mut(ident) {
                inst.transition(InstanceState::Stopped);
            }
        }
        Err(e) => {
            let mut s = shared.lock();
            if let Some(inst) = s.instances.get_mut(ident) {
                inst.fail(FailureReason::Runner(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
