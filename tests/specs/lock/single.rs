// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-path lock specs
//!
//! Verify queue nodes, blocking rules, and release behavior of PathLock.

use crate::prelude::*;
use crate::prelude::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[test]
fn write_lock_node_appears_and_is_removed() {
    let cluster = Cluster::new();
    let session = cluster.session();
    let lock = PathLock::write(&session, "/app/jobs").unwrap();

    lock.acquire().unwrap();
    assert_eq!(cluster.queue("/app/jobs"), vec!["WRITE-0000000000".to_string()]);

    lock.release().unwrap();
    assert_eq!(cluster.queue("/app/jobs"), Vec::<String>::new());
}

#[test]
fn sequential_acquires_reuse_the_path() {
    let cluster = Cluster::new();
    let session = cluster.session();

    for round in 0..3 {
        let lock = PathLock::write(&session, "/app/jobs").unwrap();
        lock.acquire().unwrap();
        assert_eq!(lock.node_id(), Some(format!("WRITE-{round:010}")));
        lock.release().unwrap();
    }
    assert!(cluster.queue("/app/jobs").is_empty());
}

#[test]
fn contended_try_acquire_abandons_then_succeeds_after_release() {
    let cluster = Cluster::new();
    let first = cluster.session();
    let second = cluster.session();

    let holder = PathLock::write(&first, "/app/jobs").unwrap();
    holder.acquire().unwrap();

    let contender = PathLock::write(&second, "/app/jobs").unwrap();
    assert!(!contender.try_acquire().unwrap());
    assert_eq!(contender.state(), LockState::Abandoned);

    holder.release().unwrap();
    let retry = PathLock::write(&second, "/app/jobs").unwrap();
    assert!(retry.try_acquire().unwrap());
    assert_eq!(retry.state(), LockState::Acquired);
}

#[test]
fn readers_overlap_and_writers_wait() {
    let cluster = Cluster::new();
    let session = cluster.session();

    let first = PathLock::read(&session, "/app/config").unwrap();
    let second = PathLock::read(&session, "/app/config").unwrap();
    first.acquire().unwrap();
    second.acquire().unwrap();

    let writer = PathLock::write(&session, "/app/config").unwrap();
    let waiter = {
        let writer = Arc::clone(&writer);
        thread::spawn(move || writer.acquire())
    };
    wait_until(|| writer.blocking_node_id().is_some());
    cluster.settle();
    // Writers wait on the node directly ahead, the second reader
    assert_eq!(writer.blocking_node_id().as_deref(), Some("READ-0000000001"));

    second.release().unwrap();
    wait_until(|| writer.blocking_node_id().as_deref() == Some("READ-0000000000"));
    assert_eq!(writer.state(), LockState::Waiting);

    first.release().unwrap();
    waiter.join().unwrap().unwrap();
    assert_eq!(writer.state(), LockState::Acquired);
}

#[test]
fn writers_are_mutually_exclusive_across_sessions() {
    let cluster = Cluster::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let session = cluster.session();
            let inside = Arc::clone(&inside);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let lock = PathLock::write(&session, "/app/jobs").unwrap();
                lock.acquire().unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                order.lock().unwrap().push(worker);
                thread::sleep(Duration::from_millis(5));
                inside.fetch_sub(1, Ordering::SeqCst);
                lock.release().unwrap();
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(order.lock().unwrap().len(), 4);
    assert!(cluster.queue("/app/jobs").is_empty());
}

#[test]
fn release_before_acquire_touches_nothing() {
    let cluster = Cluster::new();
    let session = cluster.session();
    let lock = PathLock::write(&session, "/app/jobs").unwrap();

    lock.release().unwrap();
    cluster.settle();
    assert!(cluster.service.calls().is_empty());
    assert!(!cluster.service.exists("/app/jobs"));
}

#[test]
fn dropped_lock_releases_its_node() {
    let cluster = Cluster::new();
    let session = cluster.session();
    {
        let lock = PathLock::write(&session, "/app/jobs").unwrap();
        lock.acquire().unwrap();
        cluster.settle();
    }
    assert!(cluster.queue("/app/jobs").is_empty());
}

#[derive(Default)]
struct Outcomes {
    acquired: AtomicUsize,
    failed: AtomicUsize,
    errors: Mutex<Vec<LockError>>,
}

impl LockListener for Outcomes {
    fn on_lock_acquired(&self, _lock: &PathLock) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn on_lock_error(&self, error: &LockError, _lock: &PathLock) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

impl TryLockListener for Outcomes {
    fn on_try_acquire_failed(&self, _lock: &PathLock) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn listeners_hear_each_outcome_once() {
    let cluster = Cluster::new();
    let session = cluster.session();
    let outcomes = Arc::new(Outcomes::default());

    let holder = PathLock::write(&session, "/app/jobs").unwrap();
    holder.acquire_with(outcomes.clone()).unwrap();
    wait_until(|| outcomes.acquired.load(Ordering::SeqCst) == 1);

    let contender = PathLock::write(&session, "/app/jobs").unwrap();
    contender.try_acquire_with(outcomes.clone()).unwrap();
    wait_until(|| outcomes.failed.load(Ordering::SeqCst) == 1);

    cluster
        .service
        .fail_next(OpKind::GetChildren, ResultCode::SystemError, 1);
    let broken = PathLock::write(&session, "/app/other").unwrap();
    broken.acquire_with(outcomes.clone()).unwrap();
    wait_until(|| !outcomes.errors.lock().unwrap().is_empty());

    cluster.settle();
    assert_eq!(outcomes.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(outcomes.failed.load(Ordering::SeqCst), 1);
    assert_eq!(
        *outcomes.errors.lock().unwrap(),
        vec![LockError::Coordination(ResultCode::SystemError)]
    );
}

#[test]
fn traced_connector_is_transparent() {
    let cluster = Cluster::new();
    let connector = treelock_adapters::TracedConnector::new(cluster.service.connector());
    let session = Session::initialize(test_config(), Arc::new(connector)).unwrap();

    let lock = PathLock::read(&session, "/app/config").unwrap();
    assert!(lock.try_acquire().unwrap());
    assert_eq!(cluster.queue("/app/config"), vec!["READ-0000000000".to_string()]);
}
