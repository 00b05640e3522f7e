// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use super::*;
use svcmgr_core::{InstanceIdent, ResourceLimits};

fn instance() -> InstanceInfo {
    InstanceInfo {
        ident: InstanceIdent::new("s1", "u", 0),
        priority: 7,
        storage_path: "/data/s1".into(),
        state_path: "/state/s1".into(),
        uid: 1000,
        resource_limits: ResourceLimits {
            cpu_millis: 500,
            memory_bytes: 1 << 20,
            pids: 32,
        },
    }
}

#[test]
fn produces_valid_json_containing_the_resolved_path_and_ident() {
    let producer = JsonOciSpecProducer::new();
    let env = HashMap::new();
    let spec = producer.produce("/var/svc/s1/v1", &instance(), &env).unwrap();

    let value: serde_json::Value = serde_json::from_str(&spec).unwrap();
    assert_eq!(value["service_path"], "/var/svc/s1/v1");
    assert_eq!(value["ident"], "s1/u/0");
    assert_eq!(value["uid"], 1000);
    assert_eq!(value["resource_limits"]["cpu_millis"], 500);
}

#[test]
fn env_overlay_is_embedded() {
    let producer = JsonOciSpecProducer::new();
    let mut env = HashMap::new();
    env.insert("FOO".to_string(), "bar".to_string());
    let spec = producer.produce("/var/svc/s1/v1", &instance(), &env).unwrap();

    let value: serde_json::Value = serde_json::from_str(&spec).unwrap();
    assert_eq!(value["env"]["FOO"], "bar");
}

#[yare::parameterized(
    empty       = { 0,    false },
    single_var  = { 1,    true },
    many_vars   = { 8,    true },
)]
fn produce_succeeds_regardless_of_overlay_size(var_count: usize, expect_nonempty_env: bool) {
    let producer = JsonOciSpecProducer::new();
    let env: HashMap<String, String> = (0..var_count).map(|i| (format!("V{i}"), i.to_string())).collect();
    let spec = producer.produce("/var/svc/s1/v1", &instance(), &env).unwrap();
    let value: serde_json::Value = serde_json::from_str(&spec).unwrap();
    assert_eq!(!value["env"].as_object().unwrap().is_empty(), expect_nonempty_env);
}

#[test]
fn distinct_instances_produce_distinct_specs() {
    let producer = JsonOciSpecProducer::new();
    let env = HashMap::new();
    let mut other = instance();
    other.ident = InstanceIdent::new("s1", "u", 1);

    let a = producer.produce("/var/svc/s1/v1", &instance(), &env).unwrap();
    let b = producer.produce("/var/svc/s1/v1", &other, &env).unwrap();
    assert_ne!(a, b);
}
