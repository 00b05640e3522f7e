// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loads the single JSON goal-state file this binary accepts as input.
//! `spec.md` §6 is explicit that the core "exposes no CLI, file format, or
//! wire protocol" — a goal-state file is this host binary's own choice of
//! surface, not part of the core.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use svcmgr_core::{InstanceInfo, LayerInfo, ServiceInfo};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GoalStateError {
    #[error("failed to read goal state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse goal state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
pub struct GoalState {
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
    #[serde(default)]
    pub layers: Vec<LayerInfo>,
    #[serde(default)]
    pub instances: Vec<InstanceInfo>,
    #[serde(default)]
    pub force_restart: bool,
}

pub fn load_goal_state(path: &Path) -> Result<GoalState, GoalStateError> {
    let text = std::fs::read_to_string(path).map_err(|source| GoalStateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| GoalStateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "goal_state_tests.rs"]
mod tests;
