// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability-set traits the dispatcher is constructed with.
//!
//! `spec.md` §9 replaces interface inheritance with small capability sets:
//! `Runner`, `Storage`, `ServiceManager`, `OciSpecProducer`,
//! `StatusReceiver`. Each is a trait with no cross-references to the
//! others; the dispatcher owns value-semantics handles to concrete impls
//! chosen at construction time (dependency injection, not a registry).
//!
//! The sixth collaborator named in `spec.md` §1/§9, the cloud-connection
//! publisher, is intentionally absent here: its direction is inverted — it
//! *drives* the core via [`crate::Dispatcher::set_cloud_connection`] rather
//! than being called by it, so it has no capability-set trait in this
//! crate. See `svcmgr-adapters::ConnectionPublisher` for the host-side
//! counterpart.

use crate::error::Error;
use crate::ident::InstanceIdent;
use crate::instance::InstanceInfo;
use crate::overrides::OverrideEnvVars;
use crate::service::{LayerInfo, ServiceInfo};
use crate::status::{InstancesRunStatus, InstancesUpdateStatus, RunStatus};

/// The external process/container runner (`spec.md` §6).
pub trait Runner: Send + Sync {
    /// Start an instance from a serialized OCI spec. Returns the initial
    /// observed run status.
    fn start(&self, instance: &InstanceInfo, oci_spec: &str) -> Result<RunStatus, Error>;

    /// Stop a running instance. Must be idempotent: stopping an instance
    /// the runner already considers stopped is success, not an error
    /// (`spec.md` §4.2).
    fn stop(&self, ident: &InstanceIdent) -> Result<(), Error>;
}

/// The external service-manager that materializes service images on disk
/// (`spec.md` §1, §6).
pub trait ServiceManager: Send + Sync {
    fn process_desired_services(
        &self,
        services: &[ServiceInfo],
        layers: &[LayerInfo],
    ) -> Result<(), Error>;

    /// `Ok(None)` when the service has no locally resolved path (broken or
    /// not yet materialized).
    fn get_service_path(&self, service_id: &str) -> Result<Option<String>, Error>;

    fn get_service_version(&self, service_id: &str) -> Result<Option<String>, Error>;
}

/// Produces a serialized OCI spec ready for the runner (`spec.md` §6).
pub trait OciSpecProducer: Send + Sync {
    fn produce(
        &self,
        service_path: &str,
        instance: &InstanceInfo,
        env_overlay: &std::collections::HashMap<String, String>,
    ) -> Result<String, Error>;
}

/// Persisted instance/override/operation-version/online-time records
/// (`spec.md` §6). The core requires only atomic single-record writes; the
/// back-end is opaque.
pub trait Storage: Send + Sync {
    fn add_instance(&self, instance: &InstanceInfo) -> Result<(), Error>;
    fn update_instance(&self, instance: &InstanceInfo) -> Result<(), Error>;
    fn remove_instance(&self, ident: &InstanceIdent) -> Result<(), Error>;
    fn get_all_instances(&self) -> Result<Vec<InstanceInfo>, Error>;

    fn get_operation_version(&self) -> Result<u64, Error>;
    fn set_operation_version(&self, version: u64) -> Result<(), Error>;

    fn get_override_env_vars(&self) -> Result<OverrideEnvVars, Error>;
    fn set_override_env_vars(&self, overrides: &OverrideEnvVars) -> Result<(), Error>;

    fn get_online_time(&self) -> Result<Option<u64>, Error>;
    fn set_online_time(&self, epoch_ms: u64) -> Result<(), Error>;
}

/// Sink the dispatcher publishes status to (`spec.md` §6).
pub trait StatusReceiver: Send + Sync {
    fn instances_run_status(&self, snapshot: &InstancesRunStatus);
    fn instances_update_status(&self, delta: &InstancesUpdateStatus);
}
