// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `svcmgrd`: the thin host binary that wires `svcmgr_core::Dispatcher` to
//! concrete collaborators.
//!
//! `spec.md` §6 states plainly that the core "exposes no CLI, file format,
//! or wire protocol; it is embedded by a host binary that provides those
//! surfaces" — this crate *is* that host binary, and it stays intentionally
//! thin: configuration loading, logging setup, one-time dependency
//! injection, and an optional one-shot goal-state apply from a JSON file.
//! It does not reproduce the teacher's Unix-socket listener, WAL, or
//! signal-driven async event loop, none of which this core needs (`spec.md`
//! §5 rules out an async runtime for the core, and there is no wire
//! protocol to listen on).

pub mod config;
pub mod goal_state;
pub mod logging;

use std::sync::Arc;

use svcmgr_adapters::{
    ConnectionPublisher, InMemoryServiceManager, JsonOciSpecProducer, NoOpConnectionPublisher,
    SimulatedRunner, TracingStatusReceiver,
};
use svcmgr_core::{Dispatcher, DispatcherDeps, Error, SystemClock};
use svcmgr_storage::FileStorage;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::goal_state::{load_goal_state, GoalStateError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    GoalState(#[from] GoalStateError),
    #[error("failed to open storage at {path}: {source}")]
    Storage {
        path: std::path::PathBuf,
        #[source]
        source: svcmgr_storage::StorageError,
    },
    #[error(transparent)]
    Core(#[from] Error),
}

/// Build a `Dispatcher` wired to the demo/fake adapters and file-backed
/// storage described by `config`. Construction alone replays any persisted
/// instance set (`Dispatcher::init`, `spec.md` §4.5 crash recovery) — no
/// goal state needs to be supplied for that to happen.
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher, StartupError> {
    let storage = FileStorage::open(&config.state_dir).map_err(|source| StartupError::Storage {
        path: config.state_dir.clone(),
        source,
    })?;

    let deps = DispatcherDeps {
        runner: Arc::new(SimulatedRunner::new()),
        service_manager: Arc::new(InMemoryServiceManager::new()),
        oci_spec_producer: Arc::new(JsonOciSpecProducer::new()),
        storage: Arc::new(storage),
        status_receiver: Arc::new(TracingStatusReceiver::new()),
        clock: Arc::new(SystemClock),
        limits: config.limits(),
    };

    let dispatcher = Dispatcher::init(deps)?;

    // No real cloud transport is wired up in this demo binary; report the
    // connection as permanently down rather than silently never calling
    // `set_cloud_connection` at all, so the connection-gate machinery is
    // exercised the same way a real transport would exercise it.
    let connection_publisher = NoOpConnectionPublisher::always_disconnected();
    dispatcher.set_cloud_connection(connection_publisher.is_connected())?;

    Ok(dispatcher)
}

/// If `config.goal_state_path` is set, load it and apply it once via
/// `run_instances`. This is the only goal-state input surface this binary
/// offers, and it is entirely optional: most of the value of starting
/// `svcmgrd` with no goal state at all is the crash-recovery replay that
/// already happened inside `build_dispatcher`.
pub fn apply_configured_goal_state(
    dispatcher: &Dispatcher,
    config: &Config,
) -> Result<(), StartupError> {
    let Some(path) = &config.goal_state_path else {
        tracing::info!("no goal state file configured; relying on persisted instances only");
        return Ok(());
    };

    let goal = load_goal_state(path)?;
    tracing::info!(
        services = goal.services.len(),
        layers = goal.layers.len(),
        instances = goal.instances.len(),
        force_restart = goal.force_restart,
        path = %path.display(),
        "applying configured goal state"
    );
    dispatcher.run_instances(goal.services, goal.layers, goal.instances, goal.force_restart)?;
    Ok(())
}
