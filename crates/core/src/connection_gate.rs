// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud-connectivity gate (`spec.md` §4.5).
//!
//! Only the first connect after daemon start triggers a full status
//! replay; later reconnects are assumed to resume a session the cloud
//! side still has context for. [`ConnectionGate::force_resync`] is the
//! escape hatch for callers (e.g. the cloud side asking for a fresh
//! snapshot) that need the next connect to replay regardless.

/// Tracks current connectivity plus whether the next `on_connect` owes a
/// full resync.
#[derive(Debug, Default)]
pub struct ConnectionGate {
    connected: bool,
    ever_connected: bool,
    resync_requested: bool,
}

impl ConnectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn on_disconnect(&mut self) {
        self.connected = false;
    }

    /// Record a connect event. Returns whether this connect should trigger
    /// a full status replay: true on the very first connect ever, or any
    /// connect following a [`Self::force_resync`] call.
    pub fn on_connect(&mut self) -> bool {
        self.connected = true;
        let should_resync = !self.ever_connected || self.resync_requested;
        self.ever_connected = true;
        self.resync_requested = false;
        should_resync
    }

    /// Force the next `on_connect` to trigger a full resync even if it is
    /// not the first connect.
    pub fn force_resync(&mut self) {
        self.resync_requested = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_connect_always_resyncs() {
        let mut gate = ConnectionGate::new();
        assert!(gate.on_connect());
        assert!(gate.is_connected());
    }

    #[test]
    fn subsequent_reconnect_does_not_resync_by_default() {
        let mut gate = ConnectionGate::new();
        gate.on_connect();
        gate.on_disconnect();
        assert!(!gate.is_connected());
        assert!(!gate.on_connect());
    }

    #[test]
    fn force_resync_applies_to_the_next_connect_only() {
        let mut gate = ConnectionGate::new();
        gate.on_connect();
        gate.on_disconnect();
        gate.force_resync();
        assert!(gate.on_connect());

        gate.on_disconnect();
        assert!(!gate.on_connect());
    }
}
