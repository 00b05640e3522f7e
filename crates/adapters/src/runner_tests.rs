// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use svcmgr_core::ResourceLimits;

fn instance(ident: InstanceIdent) -> InstanceInfo {
    InstanceInfo {
        ident,
        priority: 1,
        storage_path: "/data".into(),
        state_path: "/state".into(),
        uid: 1000,
        resource_limits: ResourceLimits::default(),
    }
}

#[test]
fn start_reports_running_and_records_the_call() {
    let runner = SimulatedRunner::new();
    let ident = InstanceIdent::new("s1", "u", 0);
    let status = runner.start(&instance(ident.clone()), "{}").unwrap();
    assert_eq!(status.state, RunState::Running);
    assert!(runner.is_started(&ident));
    assert_eq!(runner.calls(), vec![RunnerCall::Start(ident)]);
}

#[test]
fn stop_is_idempotent_and_always_succeeds() {
    let runner = SimulatedRunner::new();
    let ident = InstanceIdent::new("s1", "u", 0);
    runner.start(&instance(ident.clone()), "{}").unwrap();
    runner.stop(&ident).unwrap();
    assert!(!runner.is_started(&ident));
    // stopping twice must still succeed ("AlreadyStopped" is success).
    runner.stop(&ident).unwrap();
}

#[test]
fn fail_start_is_consumed_once() {
    let runner = SimulatedRunner::new();
    let ident = InstanceIdent::new("s1", "u", 0);
    runner.fail_start(ident.clone(), Error::Runner("boom".into()));

    assert!(runner.start(&instance(ident.clone()), "{}").is_err());
    assert!(runner.start(&instance(ident.clone()), "{}").is_ok());
}

#[test]
fn fail_stop_is_consumed_once() {
    let runner = SimulatedRunner::new();
    let ident = InstanceIdent::new("s1", "u", 0);
    runner.start(&instance(ident.clone()), "{}").unwrap();
    runner.fail_stop(ident.clone(), Error::Runner("boom".into()));

    assert!(runner.stop(&ident).is_err());
    assert!(runner.stop(&ident).is_ok());
}
