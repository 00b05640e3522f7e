// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance model: desired-state records (`InstanceInfo`) and the runtime
//! record the dispatcher owns (`Instance`), including its lifecycle state
//! machine (`spec.md` §3, §4.6).

use crate::error::Error;
use crate::ident::InstanceIdent;
use crate::status::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource-limits block attached to a desired instance. Opaque numeric
/// fields forwarded to the OCI-spec producer; the core never interprets
/// them beyond equality comparison (used to detect a resource-limits
/// change during diffing, `spec.md` §4.1 step 4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_millis: u32,
    pub memory_bytes: u64,
    pub pids: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_millis: 0,
            memory_bytes: 0,
            pids: 0,
        }
    }
}

/// Desired-state record for one instance. Immutable within a reconcile
/// cycle; a goal state replaces the whole set wholesale across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub ident: InstanceIdent,
    pub priority: i32,
    pub storage_path: String,
    pub state_path: String,
    pub uid: u32,
    pub resource_limits: ResourceLimits,
}

impl InstanceInfo {
    /// Malformed per `spec.md` §4.1: bad identity, or paths that are empty.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.ident.is_well_formed() {
            return Err(Error::InvalidArgument(format!(
                "malformed instance identity: {}",
                self.ident
            )));
        }
        if self.storage_path.is_empty() || self.state_path.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "instance {} has an empty storage_path or state_path",
                self.ident
            )));
        }
        Ok(())
    }
}

/// Lifecycle state of a runtime [`Instance`] (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl InstanceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Stopped | InstanceState::Failed)
    }

    /// Whether `self -> next` is a transition shown in `spec.md` §4.6's
    /// diagram, plus the two skip-the-runner paths §4.7 requires
    /// (`Created -> Failed` for a broken service or bad OCI spec, never
    /// invoking the runner at all).
    fn allows(self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Created, Failed)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }
}

/// Reason an [`Instance`] is in [`InstanceState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    BrokenService,
    InvalidSpec,
    Internal(String),
    Runner(String),
}

/// Runtime record for one instance, owned by the dispatcher's shared
/// instance map. Replaced by a fresh `Created` record, not mutated in
/// place, whenever a new reconcile re-creates a previously failed or
/// absent instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub ident: InstanceIdent,
    pub desired: InstanceInfo,
    pub state: InstanceState,
    pub failure: Option<FailureReason>,
    pub last_run: Option<RunStatus>,
    pub env_overlay: HashMap<String, String>,
    pub generation: u64,
}

impl Instance {
    pub fn created(desired: InstanceInfo) -> Self {
        Self {
            ident: desired.ident.clone(),
            desired,
            state: InstanceState::Created,
            failure: None,
            last_run: None,
            env_overlay: HashMap::new(),
            generation: 0,
        }
    }

    /// Attempt a lifecycle transition. Invalid transitions are rejected:
    /// the state is left unchanged and the caller is expected to log the
    /// rejection (`spec.md` §4.6: "Transitions not shown are invalid and
    /// must be rejected (logged, state unchanged)").
    pub fn transition(&mut self, next: InstanceState) -> bool {
        if !self.state.allows(next) {
            tracing::warn!(
                ident = %self.ident,
                from = ?self.state,
                to = ?next,
                "rejected invalid instance state transition"
            );
            return false;
        }
        self.state = next;
        self.generation += 1;
        true
    }

    pub fn fail(&mut self, reason: FailureReason) -> bool {
        let transitioned = self.transition(InstanceState::Failed);
        if transitioned {
            self.failure = Some(reason);
        }
        transitioned
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Record a runner-pushed observation (`spec.md` §4.3). Always
    /// records `run_status` and bumps `generation`, even when it repeats
    /// the current state. A `Running` observation is honored only if the
    /// current state allows it, so a stale report can't resurrect an
    /// instance already `Stopped` or `Failed`; a fault observation always
    /// moves the instance to `Failed`.
    pub fn observe_run_status(&mut self, run_status: RunStatus) {
        let state = run_status.state.clone();
        self.generation += 1;
        match &state {
            crate::status::RunState::Running => {
                if self.state != InstanceState::Running && self.state.allows(InstanceState::Running)
                {
                    self.state = InstanceState::Running;
                }
            }
            crate::status::RunState::Exited { .. } | crate::status::RunState::Crashed { .. } => {
                if self.state != InstanceState::Failed {
                    self.failure = Some(FailureReason::Runner(format!("{state:?}")));
                    self.state = InstanceState::Failed;
                }
            }
            crate::status::RunState::Unknown => {}
        }
        self.last_run = Some(run_status);
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
