// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! File-backed implementation of `svcmgr_core::Storage`.
//!
//! `spec.md` §1 places real storage persistence out of scope — the core
//! only requires atomic single-record writes against an opaque back-end.
//! This crate is the smallest faithful implementation of that contract: one
//! JSON file per instance record under a directory, and single-file blobs
//! for the operation version, override set, and last-online timestamp.
//! Grounded on the teacher's `oj-storage::snapshot::Snapshot::save`
//! "write to temp, fsync, atomic rename" discipline, without the
//! WAL/checkpoint machinery that backs the teacher's own crash-recovery
//! story — this is not a database, just `Storage` made concrete.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use svcmgr_core::{Error, InstanceIdent, InstanceInfo, OverrideEnvVars, Storage};
use thiserror::Error as ThisError;

/// Errors this crate can originate, before being folded into
/// `svcmgr_core::Error` at the `Storage` trait boundary.
#[derive(Debug, ThisError)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error at {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        // Storage failures are infrastructure errors (`spec.md` §7): they
        // abort the whole reconcile cycle rather than being attributed to
        // one instance.
        Error::Internal(err.to_string())
    }
}

/// A directory-backed `Storage` implementation.
///
/// Layout under `root`:
/// - `instances/<service_id>__<subject_id>__<index>.json` — one `InstanceInfo` per file
/// - `operation_version.json` — `{"version": u64}`
/// - `overrides.json` — the serialized `OverrideEnvVars`
/// - `online_time.json` — `{"epoch_ms": u64}` (absent until the first connect)
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (creating if absent) a file-backed store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        let instances_dir = root.join("instances");
        fs::create_dir_all(&instances_dir).map_err(|source| StorageError::Io {
            path: instances_dir,
            source,
        })?;
        tracing::debug!(root = %root.display(), "opened file-backed storage");
        Ok(Self { root })
    }

    fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }

    fn instance_file(&self, ident: &InstanceIdent) -> PathBuf {
        self.instances_dir().join(format!(
            "{}__{}__{}.json",
            sanitize(&ident.service_id),
            sanitize(&ident.subject_id),
            ident.instance_index
        ))
    }

    fn operation_version_file(&self) -> PathBuf {
        self.root.join("operation_version.json")
    }

    fn overrides_file(&self) -> PathBuf {
        self.root.join("overrides.json")
    }

    fn online_time_file(&self) -> PathBuf {
        self.root.join("online_time.json")
    }
}

/// `/` would collide with the path separator used between ident fields in
/// the filename; identities are already rejected at `InstanceInfo::validate`
/// if they contain one, but this is a second line of defense for records
/// written by an older binary.
fn sanitize(component: &str) -> String {
    component.replace('/', "_")
}

/// Write `value` to `path` atomically: serialize to a sibling `.tmp` file,
/// fsync it, then rename over the destination (`oj-storage::snapshot::Snapshot::save`'s
/// discipline, applied per-record instead of per-checkpoint).
fn write_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Serde {
        path: path.to_path_buf(),
        source,
    })?;
    {
        let mut file = File::create(&tmp_path).map_err(|source| StorageError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        file.write_all(&bytes).map_err(|source| StorageError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| StorageError::Io {
            path: tmp_path.clone(),
            source,
        })?;
    }
    fs::rename(&tmp_path, path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|source| StorageError::Serde {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct OperationVersionRecord {
    version: u64,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct OnlineTimeRecord {
    epoch_ms: u64,
}

impl Storage for FileStorage {
    fn add_instance(&self, instance: &InstanceInfo) -> Result<(), Error> {
        write_atomic(&self.instance_file(&instance.ident), instance)?;
        Ok(())
    }

    fn update_instance(&self, instance: &InstanceInfo) -> Result<(), Error> {
        write_atomic(&self.instance_file(&instance.ident), instance)?;
        Ok(())
    }

    fn remove_instance(&self, ident: &InstanceIdent) -> Result<(), Error> {
        let path = self.instance_file(ident);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }.into()),
        }
    }

    fn get_all_instances(&self) -> Result<Vec<InstanceInfo>, Error> {
        let dir = self.instances_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StorageError::Io { path: dir, source }.into()),
        };

        let mut instances = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(info) = read_json::<InstanceInfo>(&path)? {
                instances.push(info);
            }
        }
        instances.sort_by(|a, b| a.ident.cmp(&b.ident));
        Ok(instances)
    }

    fn get_operation_version(&self) -> Result<u64, Error> {
        let record: Option<OperationVersionRecord> = read_json(&self.operation_version_file())?;
        Ok(record.map(|r| r.version).unwrap_or(0))
    }

    fn set_operation_version(&self, version: u64) -> Result<(), Error> {
        write_atomic(&self.operation_version_file(), &OperationVersionRecord { version })?;
        Ok(())
    }

    fn get_override_env_vars(&self) -> Result<OverrideEnvVars, Error> {
        let record: Option<OverrideEnvVars> = read_json(&self.overrides_file())?;
        Ok(record.unwrap_or_default())
    }

    fn set_override_env_vars(&self, overrides: &OverrideEnvVars) -> Result<(), Error> {
        write_atomic(&self.overrides_file(), overrides)?;
        Ok(())
    }

    fn get_online_time(&self) -> Result<Option<u64>, Error> {
        let record: Option<OnlineTimeRecord> = read_json(&self.online_time_file())?;
        Ok(record.map(|r| r.epoch_ms))
    }

    fn set_online_time(&self, epoch_ms: u64) -> Result<(), Error> {
        write_atomic(&self.online_time_file(), &OnlineTimeRecord { epoch_ms })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
