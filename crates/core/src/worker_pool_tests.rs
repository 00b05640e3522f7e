// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn runs_every_submitted_job() {
    let pool = WorkerPool::new(4, 16);
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..32 {
        let counter = Arc::clone(&counter);
        pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("submit should succeed before shutdown");
    }
    pool.wait_drain();
    assert_eq!(counter.load(Ordering::SeqCst), 32);
}

#[test]
fn panicking_job_does_not_stop_the_pool() {
    let pool = WorkerPool::new(2, 8);
    let counter = Arc::new(AtomicUsize::new(0));

    pool.submit(|| panic!("boom")).unwrap();
    pool.wait_drain();

    let counter_clone = Arc::clone(&counter);
    pool.submit(move || {
        counter_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    pool.wait_drain();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn submit_blocks_until_capacity_frees_up() {
    let pool = WorkerPool::new(1, 1);
    let started = Arc::new(AtomicUsize::new(0));
    let release = Arc::new((Mutex::new(false), Condvar::new()));

    let started_clone = Arc::clone(&started);
    let release_clone = Arc::clone(&release);
    pool.submit(move || {
        started_clone.fetch_add(1, Ordering::SeqCst);
        let (lock, cv) = &*release_clone;
        let mut guard = lock.lock().unwrap();
        while !*guard {
            guard = cv.wait(guard).unwrap();
        }
    })
    .unwrap();

    // Queue capacity is 1 and the one slot is occupied by the blocked job
    // once it is dequeued; a second submit should still fit in the queue.
    pool.submit(|| {}).unwrap();

    // A third submit would block since capacity is 1 and a job is both
    // running and queued; release the first job so the pool can drain.
    let (lock, cv) = &*release;
    *lock.lock().unwrap() = true;
    cv.notify_all();

    pool.wait_drain();
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_rejects_further_submissions() {
    let pool = WorkerPool::new(2, 4);
    pool.submit(|| {}).unwrap();
    pool.wait_drain();
    pool.shutdown();
}

#[test]
fn drop_without_explicit_shutdown_still_joins_workers() {
    let pool = WorkerPool::new(2, 4);
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = Arc::clone(&counter);
    pool.submit(move || {
        counter_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    drop(pool);
    thread::sleep(Duration::from_millis(10));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
