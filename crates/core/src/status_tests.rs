// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::instance::{Instance, InstanceInfo, ResourceLimits};

fn instance(service: &str, index: u32) -> Instance {
    Instance::created(InstanceInfo {
        ident: InstanceIdent::new(service, "subj", index),
        priority: 0,
        storage_path: "/var/lib".into(),
        state_path: "/var/run".into(),
        uid: 1000,
        resource_limits: ResourceLimits::default(),
    })
}

#[test]
fn snapshot_records_baseline_and_echoes_operation_version() {
    let mut aggregator = StatusAggregator::new();
    let statuses = vec![InstanceStatus::from_instance(&instance("s1", 0))];
    let snap = aggregator.snapshot(statuses, 9, 1_000);
    assert_eq!(snap.operation_version, 9);
    assert_eq!(snap.instances.len(), 1);
}

#[test]
fn diff_is_empty_when_nothing_changed_since_snapshot() {
    let mut aggregator = StatusAggregator::new();
    let statuses = vec![InstanceStatus::from_instance(&instance("s1", 0))];
    aggregator.snapshot(statuses.clone(), 9, 1_000);

    let delta = aggregator.diff(statuses, 1_001);
    assert!(delta.is_empty());
}

#[test]
fn diff_reports_changed_instances_only() {
    let mut aggregator = StatusAggregator::new();
    let mut a = instance("s1", 0);
    let mut b = instance("s2", 0);
    aggregator.snapshot(
        vec![
            InstanceStatus::from_instance(&a),
            InstanceStatus::from_instance(&b),
        ],
        9,
        1_000,
    );

    a.transition(InstanceState::Starting);
    let delta = aggregator.diff(
        vec![
            InstanceStatus::from_instance(&a),
            InstanceStatus::from_instance(&b),
        ],
        1_001,
    );
    assert_eq!(delta.changed.len(), 1);
    assert_eq!(delta.changed[0].ident, a.ident);
    assert!(delta.removed.is_empty());
}

#[test]
fn diff_reports_removed_instances() {
    let mut aggregator = StatusAggregator::new();
    let a = instance("s1", 0);
    let b = instance("s2", 0);
    aggregator.snapshot(
        vec![
            InstanceStatus::from_instance(&a),
            InstanceStatus::from_instance(&b),
        ],
        9,
        1_000,
    );

    let delta = aggregator.diff(vec![InstanceStatus::from_instance(&a)], 1_001);
    assert_eq!(delta.removed, vec![b.ident.clone()]);
    assert!(delta.changed.is_empty());
}

#[test]
fn diff_reports_newly_seen_instances_as_changed() {
    let mut aggregator = StatusAggregator::new();
    let a = instance("s1", 0);
    aggregator.snapshot(vec![InstanceStatus::from_instance(&a)], 9, 1_000);

    let b = instance("s2", 0);
    let delta = aggregator.diff(
        vec![
            InstanceStatus::from_instance(&a),
            InstanceStatus::from_instance(&b),
        ],
        1_001,
    );
    assert_eq!(delta.changed.len(), 1);
    assert_eq!(delta.changed[0].ident, b.ident);
}
