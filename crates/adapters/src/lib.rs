// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Concrete, demonstration-grade implementations of the capability-set
//! traits `svcmgr-core` is constructed with.
//!
//! None of these talk to a real container runtime, artifact store, or cloud
//! channel — those collaborators are out of scope for this workspace
//! (`spec.md` §1). What lives here is: a `Runner` and `ServiceManager` that
//! simulate the external world deterministically and log every call with
//! `tracing`, an `OciSpecProducer` that emits a small JSON document, a
//! `StatusReceiver` that logs snapshots/deltas, and the host-side
//! `ConnectionPublisher` contract the daemon binary drives. Grounded on the
//! teacher's per-concern adapter layout (`oj-adapters::{agent, notify,
//! session}`, one capability per module) and its `FakeAgentAdapter`
//! call-recording shape for the `test-support`-gated inspection hooks.

pub mod connection;
pub mod oci_spec;
pub mod runner;
pub mod service_manager;
pub mod status_receiver;

pub use connection::{ConnectionPublisher, NoOpConnectionPublisher};
pub use oci_spec::JsonOciSpecProducer;
pub use runner::SimulatedRunner;
pub use service_manager::InMemoryServiceManager;
pub use status_receiver::TracingStatusReceiver;

#[cfg(any(test, feature = "test-support"))]
pub use connection::FakeConnectionPublisher;
#[cfg(any(test, feature = "test-support"))]
pub use runner::RunnerCall;
#[cfg(any(test, feature = "test-support"))]
pub use service_manager::ServiceManagerCall;
#[cfg(any(test, feature = "test-support"))]
pub use status_receiver::RecordingStatusReceiver;
