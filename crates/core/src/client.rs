// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interface to the external coordination service
//!
//! Operations are fire-and-forget: each takes a callback that the client
//! invokes later on its single ordered callback channel. Watches are one-shot.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a coordination-service operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    SystemError,
    ConnectionLoss,
    OperationTimeout,
    BadArguments,
    NoNode,
    NodeExists,
    NotEmpty,
    NoChildrenForEphemerals,
    SessionExpired,
    SessionMoved,
}

impl ResultCode {
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "ok",
            ResultCode::SystemError => "system error",
            ResultCode::ConnectionLoss => "connection loss",
            ResultCode::OperationTimeout => "operation timeout",
            ResultCode::BadArguments => "bad arguments",
            ResultCode::NoNode => "no node",
            ResultCode::NodeExists => "node exists",
            ResultCode::NotEmpty => "directory not empty",
            ResultCode::NoChildrenForEphemerals => "ephemeral nodes may not have children",
            ResultCode::SessionExpired => "session expired",
            ResultCode::SessionMoved => "session moved",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node creation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateMode {
    Persistent,
    PersistentSequential,
    Ephemeral,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Kind of change reported by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Connection-state change; no node involved
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// Connection state carried by every watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeeperState {
    Connected,
    Disconnected,
    Expired,
    AuthFailed,
    Closed,
}

/// A watch notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub state: KeeperState,
    pub path: Option<String>,
}

impl WatchedEvent {
    /// Connection-state event with no node attached
    pub fn state(state: KeeperState) -> Self {
        Self {
            event_type: EventType::None,
            state,
            path: None,
        }
    }

    /// Node event on a connected session
    pub fn node(event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            event_type,
            state: KeeperState::Connected,
            path: Some(path.into()),
        }
    }
}

/// Node metadata returned by `exists`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStat {
    pub version: i32,
    pub num_children: usize,
    /// Owning session for ephemeral nodes, 0 otherwise
    pub ephemeral_owner: u64,
}

/// Receiver of watch notifications
pub trait Watcher: Send + Sync {
    fn process(&self, event: WatchedEvent);
}

pub type CreateCallback = Box<dyn FnOnce(ResultCode, Option<String>) + Send>;
pub type VoidCallback = Box<dyn FnOnce(ResultCode) + Send>;
pub type StatCallback = Box<dyn FnOnce(ResultCode, Option<NodeStat>) + Send>;
pub type ChildrenCallback = Box<dyn FnOnce(ResultCode, Vec<String>) + Send>;

/// Asynchronous client bound to one service session
pub trait CoordinationClient: Send + Sync {
    /// Create a node. The callback receives the actual path created, which
    /// differs from `path` for sequential modes.
    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode, callback: CreateCallback);

    /// Delete a node. `None` matches any version.
    fn delete(&self, path: &str, version: Option<i32>, callback: VoidCallback);

    /// Check whether a node exists, optionally leaving a watch for its
    /// creation or deletion.
    fn exists(&self, path: &str, watcher: Option<Arc<dyn Watcher>>, callback: StatCallback);

    /// List child names, optionally leaving a watch for membership changes.
    fn get_children(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
        callback: ChildrenCallback,
    );

    fn session_id(&self) -> u64;

    /// Close the session. Ephemeral nodes it owns disappear.
    fn close(&self);
}

impl<C: CoordinationClient + ?Sized> CoordinationClient for Arc<C> {
    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode, callback: CreateCallback) {
        (**self).create(path, data, mode, callback)
    }

    fn delete(&self, path: &str, version: Option<i32>, callback: VoidCallback) {
        (**self).delete(path, version, callback)
    }

    fn exists(&self, path: &str, watcher: Option<Arc<dyn Watcher>>, callback: StatCallback) {
        (**self).exists(path, watcher, callback)
    }

    fn get_children(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
        callback: ChildrenCallback,
    ) {
        (**self).get_children(path, watcher, callback)
    }

    fn session_id(&self) -> u64 {
        (**self).session_id()
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Failure to start a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connect to {connect_string:?} failed: {reason}")]
pub struct ConnectError {
    pub connect_string: String,
    pub reason: String,
}

/// Factory for new client connections
///
/// `connect` returns as soon as the client exists; the session becomes usable
/// when `watcher` receives [`KeeperState::Connected`].
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        connect_string: &str,
        session_timeout: Duration,
        watcher: Arc<dyn Watcher>,
    ) -> Result<Arc<dyn CoordinationClient>, ConnectError>;
}

/// Last path segment, e.g. the queue-node id inside a full created path
pub fn node_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a parent path and a child name
pub fn child_path(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Parent of an absolute path; the root's parent is itself
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
