// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session recovery specs
//!
//! Verify how sessions and the primitives on them react to connection loss,
//! expiry, and shutdown.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[test]
fn acquire_survives_disconnect_and_reconnect() {
    let cluster = Cluster::new();
    let session = cluster.session();
    cluster.service.disconnect();
    cluster.settle();
    assert_eq!(session.state(), SessionState::Disconnected);

    let lock = PathLock::write(&session, "/app/jobs").unwrap();
    let waiter = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || lock.acquire())
    };
    // The first call fails with connection loss and is parked
    wait_until(|| !cluster.service.calls().is_empty());
    cluster.settle();
    assert_eq!(lock.state(), LockState::Waiting);

    cluster.service.reconnect();
    waiter.join().unwrap().unwrap();
    assert!(session.is_connected());
    assert_eq!(cluster.queue("/app/jobs"), vec!["WRITE-0000000000".to_string()]);
}

#[test]
fn retryable_faults_are_absorbed() {
    let cluster = Cluster::new();
    let session = cluster.session();
    cluster
        .service
        .fail_next(OpKind::Create, ResultCode::OperationTimeout, 2);
    cluster
        .service
        .fail_next(OpKind::Exists, ResultCode::SessionMoved, 1);

    let holder = PathLock::write(&session, "/app/jobs").unwrap();
    holder.acquire().unwrap();

    let waiting = PathLock::write(&session, "/app/jobs").unwrap();
    let waiter = {
        let waiting = Arc::clone(&waiting);
        thread::spawn(move || waiting.acquire())
    };
    wait_until(|| waiting.blocking_node_id().is_some());
    holder.release().unwrap();

    waiter.join().unwrap().unwrap();
    assert_eq!(waiting.state(), LockState::Acquired);
}

#[test]
fn expiry_kills_waiting_lock_and_session_reconnects() {
    let cluster = Cluster::new();
    let holder_session = cluster.session();
    let session = cluster.session();
    let expired_id = session.session_id().unwrap();

    let holder = PathLock::write(&holder_session, "/app/jobs").unwrap();
    holder.acquire().unwrap();

    let waiting = PathLock::write(&session, "/app/jobs").unwrap();
    let waiter = {
        let waiting = Arc::clone(&waiting);
        thread::spawn(move || waiting.acquire())
    };
    wait_until(|| waiting.blocking_node_id().is_some());
    cluster.settle();

    assert!(cluster.service.expire_session(expired_id));
    let err = waiter.join().unwrap().unwrap_err();
    assert_eq!(err, LockError::Coordination(ResultCode::SessionExpired));
    assert_eq!(waiting.state(), LockState::Error);
    assert_eq!(cluster.queue("/app/jobs"), vec!["WRITE-0000000000".to_string()]);

    // The session itself comes back with a new id and is usable again
    assert!(session.wait_connected(WAIT).unwrap());
    assert_ne!(session.session_id(), Some(expired_id));
    holder.release().unwrap();
    let fresh = PathLock::write(&session, "/app/jobs").unwrap();
    fresh.acquire().unwrap();
}

#[test]
fn expiry_removes_held_lock_nodes() {
    let cluster = Cluster::new();
    let session = cluster.session();
    let lock = PathLock::write(&session, "/app/jobs").unwrap();
    lock.acquire().unwrap();

    assert!(cluster.service.expire_session(session.session_id().unwrap()));
    cluster.settle();
    assert!(cluster.queue("/app/jobs").is_empty());
}

#[test]
fn refused_connects_are_retried_until_budget_runs_out() {
    let cluster = Cluster::new();
    cluster.service.refuse_connects(2);
    let session = cluster.session();
    assert!(session.is_connected());

    cluster.service.refuse_connects(10);
    let err = cluster
        .service
        .connect_session_with(test_config().with_max_connect_attempts(3))
        .err()
        .unwrap();
    assert!(matches!(err, LockError::Connect { attempts: 3, .. }));
}

#[test]
fn shutdown_releases_everything() {
    let cluster = Cluster::new();
    let session = cluster.session();
    let lock = PathLock::write(&session, "/app/jobs").unwrap();
    lock.acquire().unwrap();

    session.shutdown();
    assert_eq!(session.state(), SessionState::Shutdown);
    assert!(cluster.queue("/app/jobs").is_empty());
    assert!(cluster.service.live_sessions().is_empty());
    assert_eq!(
        PathLock::write(&session, "/app/jobs").err(),
        Some(LockError::SessionShutdown)
    );
}
