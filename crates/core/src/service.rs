// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service cache: a per-cycle snapshot of the service descriptors
//! referenced by running instances, plus the opaque layer list forwarded
//! to the service-manager on cycle start (`spec.md` §3, §4.1 step 3).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A service descriptor as it arrives in a goal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_id: String,
    pub version: String,
    pub provider_id: String,
}

/// A service cache entry: the desired descriptor plus the local
/// content-addressed path the service-manager resolved it to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceData {
    pub info: ServiceInfo,
    pub local_path: String,
}

/// Layer artifact. Opaque to the core: forwarded to the service-manager
/// verbatim and never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub layer_id: String,
    pub payload: serde_json::Value,
}

/// At most one entry per `service_id`: the version currently in use by at
/// least one instance (`spec.md` §3 invariant).
#[derive(Debug, Clone, Default)]
pub struct ServiceCache {
    entries: HashMap<String, ServiceData>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceData> {
        self.entries.get(service_id)
    }

    pub fn insert(&mut self, data: ServiceData) {
        self.entries.insert(data.info.service_id.clone(), data);
    }

    /// Drop any cache entry whose `service_id` is not in `referenced`
    /// (`spec.md` §4.1 step 3: "After step 6 purge service_ids no longer
    /// referenced").
    pub fn purge_unreferenced(&mut self, referenced: &HashSet<String>) {
        self.entries.retain(|id, _| referenced.contains(id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
