// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: a small TOML file layered over fixed defaults,
//! mirroring the teacher's `oj-daemon::lifecycle::Config::load` shape. A
//! missing config file is not an error — every field simply falls back to
//! its default, since this binary has no project root to discover.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use svcmgr_core::Limits;
use thiserror::Error;

const DEFAULT_STATE_DIR: &str = "/var/lib/svcmgr";
const DEFAULT_WORKER_POOL_SIZE: usize = 5;
const DEFAULT_MAX_INSTANCES: usize = 256;
const DEFAULT_MAX_SERVICES: usize = 64;
const DEFAULT_MAX_LAYERS: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    state_dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
    goal_state_path: Option<PathBuf>,
    worker_pool_size: Option<usize>,
    max_instances: Option<usize>,
    max_services: Option<usize>,
    max_layers: Option<usize>,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for file-backed storage (`svcmgr-storage::FileStorage`).
    pub state_dir: PathBuf,
    /// Path to the daemon's log file.
    pub log_path: PathBuf,
    /// Optional JSON goal-state file to apply once at startup — this binary
    /// has no wire protocol (`spec.md` §6), so a file is the only input
    /// surface it offers.
    pub goal_state_path: Option<PathBuf>,
    pub worker_pool_size: usize,
    pub max_instances: usize,
    pub max_services: usize,
    pub max_layers: usize,
}

impl Config {
    /// Load configuration from `path`, falling back to defaults for any
    /// field the file omits, and for the file itself if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str::<RawConfig>(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RawConfig::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let state_dir = raw
            .state_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
        let log_path = raw.log_path.unwrap_or_else(|| state_dir.join("svcmgrd.log"));

        Ok(Self {
            goal_state_path: raw.goal_state_path,
            worker_pool_size: raw.worker_pool_size.unwrap_or(DEFAULT_WORKER_POOL_SIZE),
            max_instances: raw.max_instances.unwrap_or(DEFAULT_MAX_INSTANCES),
            max_services: raw.max_services.unwrap_or(DEFAULT_MAX_SERVICES),
            max_layers: raw.max_layers.unwrap_or(DEFAULT_MAX_LAYERS),
            state_dir,
            log_path,
        })
    }

    pub fn limits(&self) -> Limits {
        Limits::new(
            self.max_instances,
            self.max_services,
            self.max_layers,
            self.worker_pool_size,
        )
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
