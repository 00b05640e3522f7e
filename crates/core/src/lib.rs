// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! svcmgr-core: the launcher core of an edge/automotive service manager.
//!
//! Reconciles a declarative goal state of service instances against what is
//! actually running, driving an external runner through a bounded worker
//! pool and reporting per-instance status upstream. See `SPEC_FULL.md` at
//! the workspace root for the full component design this crate implements.

pub mod clock;
pub mod connection_gate;
pub mod dispatcher;
pub mod error;
pub mod ident;
pub mod instance;
pub mod limits;
pub mod operation_version;
pub mod overrides;
pub mod service;
pub mod status;
pub mod traits;
pub mod worker_pool;

pub use clock::{Clock, FixedClock, SystemClock};
pub use connection_gate::ConnectionGate;
pub use dispatcher::{Dispatcher, DispatcherDeps};
pub use error::{Error, ErrorKind};
pub use ident::InstanceIdent;
pub use instance::{FailureReason, Instance, InstanceInfo, InstanceState, ResourceLimits};
pub use limits::Limits;
pub use operation_version::C_OPERATION_VERSION;
pub use overrides::{EnvVarStatus, InstanceSelector, OverrideEnvVarEntry, OverrideEnvVars};
pub use service::{LayerInfo, ServiceCache, ServiceData, ServiceInfo};
pub use status::{InstanceStatus, InstancesRunStatus, InstancesUpdateStatus, RunState, RunStatus};
pub use traits::{OciSpecProducer, Runner, ServiceManager, Storage, StatusReceiver};
pub use worker_pool::WorkerPool;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
