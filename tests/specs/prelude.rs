// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for specs

#![allow(dead_code)]

pub use similar_asserts::assert_eq;
pub use std::sync::Arc;
pub use std::thread;
pub use std::time::Duration;
pub use treelock_core::fake::test_config;
pub use treelock_core::*;

/// Upper bound for anything a spec waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// An in-memory service plus the sessions opened against it
pub struct Cluster {
    pub service: FakeCoordinationService,
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            service: FakeCoordinationService::new(),
        }
    }

    /// Open a session with fast test delays
    pub fn session(&self) -> Arc<Session> {
        self.service.connect_session().unwrap()
    }

    /// Queue node names under `path`, sorted
    pub fn queue(&self, path: &str) -> Vec<String> {
        self.service.children(path)
    }

    /// Block until every queued callback and watch event has run
    pub fn settle(&self) {
        assert!(self.service.flush(), "service did not settle");
    }
}

/// Poll `condition` until it holds or [`WAIT`] elapses
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + WAIT;
    while !condition() {
        assert!(std::time::Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Multi-lock settings that retry quickly and almost indefinitely
pub fn patient() -> MultiLockConfig {
    MultiLockConfig::default()
        .with_retry_delays(Duration::from_millis(1), Duration::from_millis(20))
        .with_max_attempts(1000)
}
