// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded-resource discipline (`spec.md` §9 "Static allocation").
//!
//! The source keeps compile-time-bounded, preallocated containers for
//! instances/services/layers. Heap allocation is fine on this target, but
//! the *bound* is a safety guarantee, not a micro-optimization: a runaway
//! goal state must never be accepted. `Limits` is enforced at the edges
//! (`Dispatcher::run_instances`) and nowhere else.

/// Maximum sizes for one goal state, and the worker pool size to run it
/// with. Passed at construction time — there is no global configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_instances: usize,
    pub max_services: usize,
    pub max_layers: usize,
    pub worker_pool_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_instances: 256,
            max_services: 64,
            max_layers: 64,
            worker_pool_size: 5,
        }
    }
}

impl Limits {
    pub fn new(
        max_instances: usize,
        max_services: usize,
        max_layers: usize,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            max_instances,
            max_services,
            max_layers,
            worker_pool_size,
        }
    }

    /// Validate a goal state's cardinalities against these limits.
    pub fn check(
        &self,
        services_len: usize,
        layers_len: usize,
        instances_len: usize,
    ) -> Result<(), String> {
        if services_len > self.max_services {
            return Err(format!(
                "services count {} exceeds max_services {}",
                services_len, self.max_services
            ));
        }
        if layers_len > self.max_layers {
            return Err(format!(
                "layers count {} exceeds max_layers {}",
                layers_len, self.max_layers
            ));
        }
        if instances_len > self.max_instances {
            return Err(format!(
                "instances count {} exceeds max_instances {}",
                instances_len, self.max_instances
            ));
        }
        Ok(())
    }
}
