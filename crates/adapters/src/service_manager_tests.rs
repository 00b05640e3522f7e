// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn service(id: &str, version: &str) -> ServiceInfo {
    ServiceInfo {
        service_id: id.into(),
        version: version.into(),
        provider_id: "provider-1".into(),
    }
}

#[test]
fn resolves_pushed_services_to_a_synthetic_path() {
    let manager = InMemoryServiceManager::new();
    manager.process_desired_services(&[service("s1", "v1")], &[]).unwrap();

    assert_eq!(manager.get_service_path("s1").unwrap(), Some("/var/svc/s1/v1".into()));
    assert_eq!(manager.get_service_version("s1").unwrap(), Some("v1".into()));
}

#[test]
fn unresolved_service_is_none() {
    let manager = InMemoryServiceManager::new();
    assert_eq!(manager.get_service_path("missing").unwrap(), None);
}

#[test]
fn broken_service_never_resolves() {
    let manager = InMemoryServiceManager::new();
    manager.mark_broken("s1");
    manager.process_desired_services(&[service("s1", "v1")], &[]).unwrap();

    assert_eq!(manager.get_service_path("s1").unwrap(), None);
    assert_eq!(manager.get_service_version("s1").unwrap(), None);
}

#[test]
fn re_push_updates_the_resolved_version() {
    let manager = InMemoryServiceManager::new();
    manager.process_desired_services(&[service("s1", "v1")], &[]).unwrap();
    manager.process_desired_services(&[service("s1", "v2")], &[]).unwrap();

    assert_eq!(manager.get_service_version("s1").unwrap(), Some("v2".into()));
}

#[test]
fn fail_next_process_is_consumed_once() {
    let manager = InMemoryServiceManager::new();
    manager.fail_next_process(Error::Internal("boom".into()));

    assert!(manager.process_desired_services(&[service("s1", "v1")], &[]).is_err());
    assert!(manager.process_desired_services(&[service("s1", "v1")], &[]).is_ok());
}

#[test]
fn calls_are_recorded_in_order() {
    let manager = InMemoryServiceManager::new();
    manager.process_desired_services(&[service("s1", "v1")], &[]).unwrap();
    manager.process_desired_services(&[service("s2", "v1")], &[]).unwrap();

    assert_eq!(
        manager.calls(),
        vec![
            ServiceManagerCall::ProcessDesiredServices {
                service_ids: vec!["s1".into()]
            },
            ServiceManagerCall::ProcessDesiredServices {
                service_ids: vec!["s2".into()]
            },
        ]
    );
}
