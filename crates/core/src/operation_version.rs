// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation-version gate (`spec.md` §3, §6).
//!
//! Every persisted record set is stamped with the operation version of the
//! binary that wrote it. If the persisted version predates this binary's
//! `C_OPERATION_VERSION`, the on-disk instance layout may no longer match
//! what this binary expects, so all persisted instance records are purged
//! before the first reconcile rather than risk loading stale or
//! misinterpreted state.

/// Current operation version of this binary. Bump whenever the on-disk
/// layout of dependent state changes in a way older records can't satisfy.
pub const C_OPERATION_VERSION: u64 = 9;

/// Whether stored state written at `stored_version` must be purged before
/// this binary reconciles against it.
pub fn needs_purge(stored_version: u64) -> bool {
    stored_version < C_OPERATION_VERSION
}
