// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Override env-var manager (`spec.md` §4.4).
//!
//! The override set is a mapping from `(selector, variable_name)` to
//! `(value, optional expiry)`. At launch, the overlay for an instance is
//! built by taking every override whose selector matches the instance and
//! whose expiry is in the future (or absent), then resolving collisions on
//! `variable_name` by selector specificity and, for ties, insertion order
//! (`spec.md` §9 Open Questions: "later wins" is implemented as "higher
//! insertion sequence number wins").

use crate::ident::InstanceIdent;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Impl-defined maximum variable-name length (`spec.md` §4.4: "name >
/// impl-defined length").
pub const MAX_VAR_NAME_LEN: usize = 256;

/// Matches on any subset of `InstanceIdent` fields; `None` is a wildcard
/// for that field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSelector {
    pub service_id: Option<String>,
    pub subject_id: Option<String>,
    pub instance_index: Option<u32>,
}

impl InstanceSelector {
    pub fn exact(ident: &InstanceIdent) -> Self {
        Self {
            service_id: Some(ident.service_id.clone()),
            subject_id: Some(ident.subject_id.clone()),
            instance_index: Some(ident.instance_index),
        }
    }

    pub fn wildcard() -> Self {
        Self {
            service_id: None,
            subject_id: None,
            instance_index: None,
        }
    }

    pub fn matches(&self, ident: &InstanceIdent) -> bool {
        self.service_id
            .as_deref()
            .is_none_or(|s| s == ident.service_id)
            && self
                .subject_id
                .as_deref()
                .is_none_or(|s| s == ident.subject_id)
            && self
                .instance_index
                .is_none_or(|i| i == ident.instance_index)
    }

    /// Number of fields pinned (not wildcard). Exact ident > two fields >
    /// one field > wildcard (`spec.md` §4.4).
    pub fn specificity(&self) -> u8 {
        self.service_id.is_some() as u8
            + self.subject_id.is_some() as u8
            + self.instance_index.is_some() as u8
    }
}

/// One input tuple to [`crate::Dispatcher::override_env_vars`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEnvVarEntry {
    pub selector: InstanceSelector,
    pub variable_name: String,
    pub value: String,
    /// Absolute expiry in epoch milliseconds; `None` never expires.
    pub expiry_ms: Option<u64>,
}

/// Per-entry outcome of [`crate::Dispatcher::override_env_vars`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvVarStatus {
    Applied,
    Invalid(String),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct OverrideRecord {
    selector: InstanceSelector,
    variable_name: String,
    value: String,
    expiry_ms: Option<u64>,
    seq: u64,
}

/// Accepted override records, persisted as a whole after every
/// `override_env_vars` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideEnvVars {
    records: Vec<OverrideRecord>,
    next_seq: u64,
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("variable name is empty".to_string());
    }
    if name.contains('\0') {
        return Err("variable name contains a NUL byte".to_string());
    }
    if name.len() > MAX_VAR_NAME_LEN {
        return Err(format!(
            "variable name exceeds {MAX_VAR_NAME_LEN} bytes"
        ));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<(), String> {
    if value.contains('\0') {
        return Err("variable value contains a NUL byte".to_string());
    }
    Ok(())
}

impl OverrideEnvVars {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Validate and apply a batch of entries. Returns one status per input
    /// entry, in order. Only `Applied` entries mutate `self`; callers are
    /// expected to persist `self` afterwards regardless of outcome mix,
    /// since accepted entries must survive even when others in the same
    /// batch are rejected.
    pub fn apply(
        &mut self,
        entries: Vec<OverrideEnvVarEntry>,
        live_idents: &HashSet<InstanceIdent>,
    ) -> Vec<EnvVarStatus> {
        let mut statuses = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Err(reason) = validate_name(&entry.variable_name) {
                statuses.push(EnvVarStatus::Invalid(reason));
                continue;
            }
            if let Err(reason) = validate_value(&entry.value) {
                statuses.push(EnvVarStatus::Invalid(reason));
                continue;
            }
            let matches_any = live_idents.iter().any(|i| entry.selector.matches(i));
            if !matches_any {
                statuses.push(EnvVarStatus::NotFound);
                continue;
            }

            let seq = self.next_seq;
            self.next_seq += 1;
            let record = OverrideRecord {
                selector: entry.selector,
                variable_name: entry.variable_name,
                value: entry.value,
                expiry_ms: entry.expiry_ms,
                seq,
            };
            if let Some(existing) = self.records.iter_mut().find(|r| {
                r.selector == record.selector && r.variable_name == record.variable_name
            }) {
                *existing = record;
            } else {
                self.records.push(record);
            }
            statuses.push(EnvVarStatus::Applied);
        }
        statuses
    }

    /// Drop expired records (`spec.md` §3: "expired variables are silently
    /// dropped at the next reconcile"). Returns the number dropped.
    pub fn purge_expired(&mut self, now_ms: u64) -> usize {
        let before = self.records.len();
        self.records
            .retain(|r| r.expiry_ms.is_none_or(|exp| exp > now_ms));
        before - self.records.len()
    }

    /// Resolve the overlay applicable to `ident` at `now_ms`: every
    /// unexpired matching record, with `variable_name` collisions broken
    /// by `(specificity, seq)` descending.
    pub fn evaluate(&self, ident: &InstanceIdent, now_ms: u64) -> HashMap<String, String> {
        let mut winners: HashMap<&str, &OverrideRecord> = HashMap::new();
        for record in &self.records {
            if record.expiry_ms.is_some_and(|exp| exp <= now_ms) {
                continue;
            }
            if !record.selector.matches(ident) {
                continue;
            }
            let candidate_rank = (record.selector.specificity(), record.seq);
            match winners.get(record.variable_name.as_str()) {
                Some(current) => {
                    let current_rank = (current.selector.specificity(), current.seq);
                    if candidate_rank > current_rank {
                        winners.insert(&record.variable_name, record);
                    }
                }
                None => {
                    winners.insert(&record.variable_name, record);
                }
            }
        }
        winners
            .into_iter()
            .map(|(name, record)| (name.to_string(), record.value.clone()))
            .collect()
    }
}

#[cfg(test)]
#[path = "overrides_tests.rs"]
mod tests;
