// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status model: what the runner reports about a running instance
//! ([`RunStatus`]), what the dispatcher aggregates and republishes
//! ([`InstanceStatus`]), and the two shapes published to a
//! [`crate::traits::StatusReceiver`] — a full snapshot after every
//! reconcile and an incremental delta in between (`spec.md` §5).

use crate::ident::InstanceIdent;
use crate::instance::{FailureReason, Instance, InstanceState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runner-observed run state of an instance (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Unknown,
    Running,
    Exited { code: i32 },
    Crashed { signal: i32 },
}

/// A point-in-time observation the runner hands back from `start` or an
/// out-of-band watch callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,
    pub observed_at_ms: u64,
}

/// Aggregated status for one instance: lifecycle state plus the most
/// recent runner observation, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub ident: InstanceIdent,
    pub state: InstanceState,
    pub failure: Option<FailureReason>,
    pub run: Option<RunStatus>,
    pub generation: u64,
}

impl InstanceStatus {
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            ident: instance.ident.clone(),
            state: instance.state,
            failure: instance.failure.clone(),
            run: instance.last_run.clone(),
            generation: instance.generation,
        }
    }
}

/// Full snapshot of every known instance, published once per completed
/// reconcile cycle (`spec.md` §5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancesRunStatus {
    pub instances: Vec<InstanceStatus>,
    pub operation_version: u64,
    pub emitted_at_ms: u64,
}

/// Incremental status change, published as individual instances move
/// through their lifecycle between reconcile cycles (`spec.md` §5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancesUpdateStatus {
    pub changed: Vec<InstanceStatus>,
    pub removed: Vec<InstanceIdent>,
    pub emitted_at_ms: u64,
}

impl InstancesUpdateStatus {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Tracks the last-published view of every instance so the dispatcher can
/// compute minimal deltas instead of republishing full snapshots on every
/// status-worthy event (`spec.md` §5: "only the instances that changed are
/// included in an update").
#[derive(Debug, Clone, Default)]
pub struct StatusAggregator {
    last_published: HashMap<InstanceIdent, InstanceStatus>,
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full snapshot for the current instance set and record it
    /// as the new published baseline.
    pub fn snapshot(
        &mut self,
        statuses: Vec<InstanceStatus>,
        operation_version: u64,
        now_ms: u64,
    ) -> InstancesRunStatus {
        self.last_published = statuses
            .iter()
            .map(|s| (s.ident.clone(), s.clone()))
            .collect();
        InstancesRunStatus {
            instances: statuses,
            operation_version,
            emitted_at_ms: now_ms,
        }
    }

    /// Compute the delta between the last published baseline and
    /// `current`, updating the baseline. Idents present before but absent
    /// now are reported in `removed`; idents whose status value changed
    /// (including newly-seen idents) are reported in `changed`.
    pub fn diff(&mut self, current: Vec<InstanceStatus>, now_ms: u64) -> InstancesUpdateStatus {
        let mut changed = Vec::new();
        let mut seen = std::collections::HashSet::with_capacity(current.len());

        for status in &current {
            seen.insert(status.ident.clone());
            match self.last_published.get(&status.ident) {
                Some(previous) if previous == status => {}
                _ => changed.push(status.clone()),
            }
        }

        let removed: Vec<InstanceIdent> = self
            .last_published
            .keys()
            .filter(|ident| !seen.contains(*ident))
            .cloned()
            .collect();

        self.last_published = current
            .into_iter()
            .map(|s| (s.ident.clone(), s))
            .collect();

        InstancesUpdateStatus {
            changed,
            removed,
            emitted_at_ms: now_ms,
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
