// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A minimal [`OciSpecProducer`] that emits a small JSON document instead of
//! a real OCI runtime spec — the container runtime itself is out of scope
//! (`spec.md` §1, §6).

use std::collections::HashMap;

use serde::Serialize;
use svcmgr_core::{Error, InstanceInfo, OciSpecProducer};

#[derive(Serialize)]
struct SpecDocument<'a> {
    service_path: &'a str,
    ident: String,
    uid: u32,
    priority: i32,
    storage_path: &'a str,
    state_path: &'a str,
    resource_limits: ResourceLimitsDocument,
    env: &'a HashMap<String, String>,
}

#[derive(Serialize)]
struct ResourceLimitsDocument {
    cpu_millis: u32,
    memory_bytes: u64,
    pids: u32,
}

/// Produces a deterministic, pretty-printed JSON document describing the
/// instance to launch: the resolved service path, identity, resource
/// limits, and the resolved environment overlay.
#[derive(Default)]
pub struct JsonOciSpecProducer;

impl JsonOciSpecProducer {
    pub fn new() -> Self {
        Self
    }
}

impl OciSpecProducer for JsonOciSpecProducer {
    fn produce(
        &self,
        service_path: &str,
        instance: &InstanceInfo,
        env_overlay: &HashMap<String, String>,
    ) -> Result<String, Error> {
        let document = SpecDocument {
            service_path,
            ident: instance.ident.to_string(),
            uid: instance.uid,
            priority: instance.priority,
            storage_path: &instance.storage_path,
            state_path: &instance.state_path,
            resource_limits: ResourceLimitsDocument {
                cpu_millis: instance.resource_limits.cpu_millis,
                memory_bytes: instance.resource_limits.memory_bytes,
                pids: instance.resource_limits.pids,
            },
            env: env_overlay,
        };
        serde_json::to_string_pretty(&document)
            .map_err(|err| Error::InvalidSpec(format!("failed to serialize oci spec: {err}")))
    }
}

#[cfg(test)]
#[path = "oci_spec_tests.rs"]
mod tests;
