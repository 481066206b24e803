// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! treelock-core: distributed locks on a tree-structured coordination service
//!
//! This crate provides:
//! - A session manager that survives disconnects and session expiry
//! - A retrying base for asynchronous primitives run against the service
//! - Recursive path creation
//! - Single-path read/write locks and ordered multi-path locks
//! - Auto- and manual-reset events for blocking on callback results

pub mod backoff;
pub mod client;
pub mod config;
pub mod coordination;
pub mod error;
pub mod path;
pub mod primitive;
pub mod session;
pub mod signal;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use client::{
    ConnectError, Connector, CoordinationClient, CreateMode, EventType, KeeperState, NodeStat,
    ResultCode, WatchedEvent, Watcher,
};
pub use config::{ConfigError, ConnectBackoff, MultiLockConfig, RetryPolicy, SessionConfig};
pub use coordination::{
    Lock, LockListener, LockNode, LockRequest, LockState, LockType, MultiPathLock, PathLock,
    TryLockListener,
};
pub use error::{ErrorKind, LockError};
pub use path::{validate_path, PathCreator, PathCreatorConfig};
pub use primitive::{PrimitiveCore, SyncPrimitive};
pub use session::{Session, SessionState};
pub use signal::{AutoResetEvent, Interrupted, ManualResetEvent, ResetEvent};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{CoordinationCall, FakeConnector, FakeCoordinationService, OpKind};
