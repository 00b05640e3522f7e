// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn noop_publisher_reports_the_fixed_state_it_was_built_with() {
    assert!(NoOpConnectionPublisher::always_connected().is_connected());
    assert!(!NoOpConnectionPublisher::always_disconnected().is_connected());
}

#[test]
fn fake_publisher_reflects_set_connected() {
    let publisher = FakeConnectionPublisher::new(false);
    assert!(!publisher.is_connected());

    publisher.set_connected(true);
    assert!(publisher.is_connected());

    publisher.set_connected(false);
    assert!(!publisher.is_connected());
}

#[test]
fn fake_publisher_default_starts_disconnected() {
    let publisher = FakeConnectionPublisher::default();
    assert!(!publisher.is_connected());
}
