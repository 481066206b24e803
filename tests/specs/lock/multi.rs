// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-path lock specs
//!
//! Verify all-or-nothing acquisition, ordering, and backoff of MultiPathLock.

use crate::prelude::*;
use crate::prelude::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};

const PATHS: [&str; 4] = ["/res/a", "/res/b", "/res/c", "/res/d"];

#[test]
fn concurrent_shuffled_multi_locks_terminate_exclusively() {
    let cluster = Cluster::new();
    let inside = Arc::new(AtomicBool::new(false));
    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];

    let workers: Vec<_> = orders
        .into_iter()
        .map(|order| {
            let session = cluster.session();
            let inside = Arc::clone(&inside);
            thread::spawn(move || {
                for _ in 0..2 {
                    let mut lock = MultiPathLock::new(&session).with_config(patient());
                    for index in order {
                        lock.add_write_lock(PATHS[index]).unwrap();
                    }
                    lock.acquire().unwrap();
                    assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");
                    thread::sleep(Duration::from_millis(2));
                    inside.store(false, Ordering::SeqCst);
                    lock.release().unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    for path in PATHS {
        assert!(cluster.queue(path).is_empty(), "{path} still queued");
    }
}

#[test]
fn readers_on_shared_paths_do_not_exclude_each_other() {
    let cluster = Cluster::new();
    let first_session = cluster.session();
    let second_session = cluster.session();

    let mut first = MultiPathLock::new(&first_session);
    first.add_read_lock("/res/a").unwrap();
    first.add_write_lock("/res/b").unwrap();
    let mut second = MultiPathLock::new(&second_session);
    second.add_read_lock("/res/a").unwrap();
    second.add_write_lock("/res/c").unwrap();

    first.acquire().unwrap();
    assert!(second.try_acquire().unwrap());
    assert_eq!(cluster.queue("/res/a").len(), 2);
}

#[test]
fn failed_attempt_holds_nothing() {
    let cluster = Cluster::new();
    let session = cluster.session();
    let blocker = PathLock::write(&session, "/res/c").unwrap();
    blocker.acquire().unwrap();

    let mut lock = MultiPathLock::new(&session);
    for path in PATHS {
        lock.add_write_lock(path).unwrap();
    }
    assert!(!lock.try_acquire().unwrap());
    assert_eq!(lock.state(), LockState::Abandoned);

    for path in ["/res/a", "/res/b", "/res/d"] {
        assert!(cluster.queue(path).is_empty(), "{path} still queued");
    }
    assert_eq!(cluster.queue("/res/c"), vec!["WRITE-0000000000".to_string()]);
}

#[test]
fn exhausting_attempts_reports_max_attempts() {
    let cluster = Cluster::new();
    let session = cluster.session();
    let blocker = PathLock::read(&session, "/res/b").unwrap();
    blocker.acquire().unwrap();

    let mut lock = MultiPathLock::new(&session).with_config(
        MultiLockConfig::default()
            .with_retry_delays(Duration::from_millis(1), Duration::from_millis(4))
            .with_max_attempts(4),
    );
    lock.add_write_lock("/res/a").unwrap();
    lock.add_write_lock("/res/b").unwrap();

    let err = lock.acquire().unwrap_err();
    assert_eq!(err, LockError::MaxAttemptsExceeded { attempts: 4 });
    assert_eq!(err.kind(), ErrorKind::MaxAttemptsExceeded);
    assert_eq!(lock.state(), LockState::Error);
    assert!(cluster.queue("/res/a").is_empty());
}

#[test]
fn empty_multi_lock_is_vacuous() {
    let cluster = Cluster::new();
    let session = cluster.session();
    let lock = MultiPathLock::new(&session);

    lock.acquire().unwrap();
    lock.release().unwrap();
    cluster.settle();
    assert!(cluster.service.calls().is_empty());
    assert_eq!(lock.state(), LockState::Released);
}
