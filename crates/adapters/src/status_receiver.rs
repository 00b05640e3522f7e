// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A [`StatusReceiver`] that logs every published snapshot/delta with
//! `tracing` — the upstream cloud channel that would otherwise consume
//! these is out of scope (`spec.md` §1, §6).

use parking_lot::Mutex;
use svcmgr_core::{InstancesRunStatus, InstancesUpdateStatus, StatusReceiver};

/// Logs every snapshot/delta at `info`/`debug` level instead of forwarding
/// it anywhere.
#[derive(Default)]
pub struct TracingStatusReceiver;

impl TracingStatusReceiver {
    pub fn new() -> Self {
        Self
    }
}

impl StatusReceiver for TracingStatusReceiver {
    fn instances_run_status(&self, snapshot: &InstancesRunStatus) {
        tracing::info!(
            instances = snapshot.instances.len(),
            operation_version = snapshot.operation_version,
            emitted_at_ms = snapshot.emitted_at_ms,
            "published full run-status snapshot"
        );
    }

    fn instances_update_status(&self, delta: &InstancesUpdateStatus) {
        tracing::debug!(
            changed = delta.changed.len(),
            removed = delta.removed.len(),
            emitted_at_ms = delta.emitted_at_ms,
            "published run-status delta"
        );
    }
}

/// Records every published snapshot/delta in arrival order, for tests and
/// demos that need to inspect what was published rather than just log it.
#[derive(Default)]
pub struct RecordingStatusReceiver {
    snapshots: Mutex<Vec<InstancesRunStatus>>,
    deltas: Mutex<Vec<InstancesUpdateStatus>>,
}

impl RecordingStatusReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<InstancesRunStatus> {
        self.snapshots.lock().clone()
    }

    pub fn deltas(&self) -> Vec<InstancesUpdateStatus> {
        self.deltas.lock().clone()
    }

    pub fn last_snapshot(&self) -> Option<InstancesRunStatus> {
        self.snapshots.lock().last().cloned()
    }
}

impl StatusReceiver for RecordingStatusReceiver {
    fn instances_run_status(&self, snapshot: &InstancesRunStatus) {
        self.snapshots.lock().push(snapshot.clone());
    }

    fn instances_update_status(&self, delta: &InstancesUpdateStatus) {
        self.deltas.lock().push(delta.clone());
    }
}

#[cfg(test)]
#[path = "status_receiver_tests.rs"]
mod tests;
