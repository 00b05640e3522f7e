// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded worker pool the dispatcher issues start/stop operations
//! through (`spec.md` §5).
//!
//! Plain OS threads guarded by a single `Mutex` + three `Condvar`s, not an
//! async runtime: `spec.md` §5 is explicit that no async cooperative
//! scheduling is required, so a runtime would only add a dependency and a
//! second concurrency model with nothing to show for it. A job that
//! panics is caught and logged; it does not take a worker thread down
//! with it.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct State {
    queue: VecDeque<Job>,
    in_flight: usize,
    shutting_down: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when a job is pushed, or on shutdown.
    not_empty: Condvar,
    /// Signalled when a slot frees up in the bounded queue.
    not_full: Condvar,
    /// Signalled when the queue and in-flight count both reach zero.
    drained: Condvar,
}

/// A fixed-size pool of worker threads draining a bounded job queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl WorkerPool {
    /// Spawn `worker_count` threads (at least one) backed by a queue that
    /// holds at most `capacity` pending jobs (at least one) before
    /// `submit` starts blocking.
    pub fn new(worker_count: usize, capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                in_flight: 0,
                shutting_down: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            drained: Condvar::new(),
        });
        let workers = (0..worker_count.max(1))
            .map(|idx| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("svcmgr-worker-{idx}"))
                    .spawn(move || Self::run(&shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self {
            shared,
            workers,
            capacity: capacity.max(1),
        }
    }

    fn run(shared: &Arc<Shared>) {
        loop {
            let job = {
                let mut state = shared.state.lock().unwrap_or_else(|p| p.into_inner());
                let job = loop {
                    if let Some(job) = state.queue.pop_front() {
                        break Some(job);
                    }
                    if state.shutting_down {
                        break None;
                    }
                    state = shared
                        .not_empty
                        .wait(state)
                        .unwrap_or_else(|p| p.into_inner());
                };
                if job.is_some() {
                    state.in_flight += 1;
                    shared.not_full.notify_one();
                }
                job
            };
            let Some(job) = job else { break };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                let message = panic_message(&payload);
                tracing::error!(panic = %message, "worker job panicked");
            }
            let mut state = shared.state.lock().unwrap_or_else(|p| p.into_inner());
            state.in_flight -= 1;
            if state.queue.is_empty() && state.in_flight == 0 {
                shared.drained.notify_all();
            }
        }
    }

    /// Enqueue a job, blocking while the queue is at capacity. Returns
    /// `Err(Error::Shutdown)` if the pool has begun shutting down.
    pub fn submit<F>(&self, job: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if state.shutting_down {
                return Err(Error::Shutdown);
            }
            if state.queue.len() < self.capacity {
                state.queue.push_back(Box::new(job));
                self.shared.not_empty.notify_one();
                return Ok(());
            }
            state = self
                .shared
                .not_full
                .wait(state)
                .unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Block until the queue is empty and no job is in flight.
    pub fn wait_drain(&self) {
        let mut state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
        while !(state.queue.is_empty() && state.in_flight == 0) {
            state = self
                .shared
                .drained
                .wait(state)
                .unwrap_or_else(|p| p.into_inner());
        }
    }

    pub fn queue_len(&self) -> usize {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .queue
            .len()
    }

    /// Stop accepting new work, wake every blocked thread, and join them
    /// all. Idempotent: safe to call more than once, and runs implicitly
    /// on drop if never called explicitly.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
            state.shutting_down = true;
        }
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;
