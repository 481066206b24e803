// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory coordination service for tests
//!
//! Mutations apply to the tree at call time. Callbacks and watch events are
//! queued, in call order, to a single dispatcher thread, matching the
//! ordering guarantees of a real client's event thread. Faults can be
//! injected per operation kind, and connectivity can be dropped, restored,
//! or expired per session.
#![cfg_attr(coverage_nightly, coverage(off))]

mod tree;

use crate::client::{
    ChildrenCallback, ConnectError, Connector, CoordinationClient, CreateCallback, CreateMode,
    KeeperState, ResultCode, StatCallback, VoidCallback, WatchedEvent, Watcher,
};
use crate::config::{ConnectBackoff, MultiLockConfig, RetryPolicy, SessionConfig};
use crate::error::LockError;
use crate::session::Session;
use crate::signal::{ManualResetEvent, ResetEvent};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};
use tree::{Notification, Tree};

type Delivery = Box<dyn FnOnce() + Send>;

/// Operation kinds that faults can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Create,
    Delete,
    Exists,
    GetChildren,
}

/// Recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationCall {
    Create {
        session: u64,
        path: String,
        mode: CreateMode,
    },
    Delete {
        session: u64,
        path: String,
    },
    Exists {
        session: u64,
        path: String,
        watch: bool,
    },
    GetChildren {
        session: u64,
        path: String,
        watch: bool,
    },
}

impl CoordinationCall {
    pub fn kind(&self) -> OpKind {
        match self {
            CoordinationCall::Create { .. } => OpKind::Create,
            CoordinationCall::Delete { .. } => OpKind::Delete,
            CoordinationCall::Exists { .. } => OpKind::Exists,
            CoordinationCall::GetChildren { .. } => OpKind::GetChildren,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            CoordinationCall::Create { path, .. }
            | CoordinationCall::Delete { path, .. }
            | CoordinationCall::Exists { path, .. }
            | CoordinationCall::GetChildren { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Connected,
    Disconnected,
    Expired,
    Closed,
}

struct SessionEntry {
    watcher: Arc<dyn Watcher>,
    status: SessionStatus,
}

struct Fault {
    op: OpKind,
    code: ResultCode,
    remaining: u32,
}

struct ServiceState {
    tree: Tree,
    sessions: HashMap<u64, SessionEntry>,
    next_session: u64,
    faults: Vec<Fault>,
    refused_connects: u32,
    connects: u32,
    calls: Vec<CoordinationCall>,
}

impl ServiceState {
    fn take_fault(&mut self, op: OpKind) -> Result<(), ResultCode> {
        let Some(fault) = self
            .faults
            .iter_mut()
            .find(|f| f.op == op && f.remaining > 0)
        else {
            return Ok(());
        };
        fault.remaining -= 1;
        let code = fault.code;
        self.faults.retain(|f| f.remaining > 0);
        Err(code)
    }

    fn check_session(&self, session: u64) -> Result<(), ResultCode> {
        match self.sessions.get(&session).map(|s| s.status) {
            Some(SessionStatus::Connected) => Ok(()),
            Some(SessionStatus::Disconnected) => Err(ResultCode::ConnectionLoss),
            _ => Err(ResultCode::SessionExpired),
        }
    }

    fn is_live(&self, session: u64) -> bool {
        matches!(
            self.sessions.get(&session).map(|s| s.status),
            Some(SessionStatus::Connected | SessionStatus::Disconnected)
        )
    }
}

struct Shared {
    state: Mutex<ServiceState>,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue work for the dispatcher. Call with the state lock held so
    /// deliveries keep the order their mutations happened in.
    fn send(&self, delivery: Delivery) {
        if self.deliveries.send(delivery).is_err() {
            warn!("fake service dispatcher is gone, dropping delivery");
        }
    }

    fn deliver_watches(&self, state: &ServiceState, fired: Vec<Notification>) {
        for (session, watcher, event) in fired {
            if state.is_live(session) {
                self.send(Box::new(move || watcher.process(event)));
            }
        }
    }

    fn deliver_state(&self, watcher: &Arc<dyn Watcher>, state: KeeperState) {
        let watcher = Arc::clone(watcher);
        self.send(Box::new(move || watcher.process(WatchedEvent::state(state))));
    }
}

/// Shared handle to the in-memory service; clones see the same tree
#[derive(Clone)]
pub struct FakeCoordinationService {
    shared: Arc<Shared>,
}

impl Default for FakeCoordinationService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCoordinationService {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        let spawned = thread::Builder::new()
            .name("fake-coordination-events".to_string())
            .spawn(move || {
                while let Some(delivery) = rx.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(delivery)).is_err() {
                        error!("event handler panicked");
                    }
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "failed to start fake service dispatcher");
        }

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ServiceState {
                    tree: Tree::new(),
                    sessions: HashMap::new(),
                    next_session: 0,
                    faults: Vec::new(),
                    refused_connects: 0,
                    connects: 0,
                    calls: Vec::new(),
                }),
                deliveries: tx,
            }),
        }
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Open a session against this service with [`test_config`]
    pub fn connect_session(&self) -> Result<Arc<Session>, LockError> {
        self.connect_session_with(test_config())
    }

    pub fn connect_session_with(&self, config: SessionConfig) -> Result<Arc<Session>, LockError> {
        Session::initialize(config, Arc::new(self.connector()))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.shared.lock().tree.contains(path)
    }

    /// Child names of `path`, sorted; empty when `path` is missing
    pub fn children(&self, path: &str) -> Vec<String> {
        self.shared
            .lock()
            .tree
            .children(path)
            .unwrap_or_default()
    }

    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.lock().tree.data(path).map(<[u8]>::to_vec)
    }

    /// Every node path except the root
    pub fn node_paths(&self) -> Vec<String> {
        self.shared.lock().tree.dump()
    }

    /// Create a persistent node outside any session
    pub fn create_node(&self, path: &str) -> Result<(), ResultCode> {
        let mut state = self.shared.lock();
        let mut fired = Vec::new();
        let result = state
            .tree
            .create(path, Vec::new(), CreateMode::Persistent, 0, &mut fired)
            .map(|_| ());
        self.shared.deliver_watches(&state, fired);
        result
    }

    /// Delete a node outside any session
    pub fn delete_node(&self, path: &str) -> Result<(), ResultCode> {
        let mut state = self.shared.lock();
        let mut fired = Vec::new();
        let result = state.tree.delete(path, None, &mut fired);
        self.shared.deliver_watches(&state, fired);
        result
    }

    pub fn calls(&self) -> Vec<CoordinationCall> {
        self.shared.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.shared.lock().calls.clear();
    }

    /// Fail the next `times` operations of kind `op` with `code`
    pub fn fail_next(&self, op: OpKind, code: ResultCode, times: u32) {
        self.shared.lock().faults.push(Fault {
            op,
            code,
            remaining: times,
        });
    }

    /// Refuse the next `times` connection attempts
    pub fn refuse_connects(&self, times: u32) {
        self.shared.lock().refused_connects = times;
    }

    /// Successful connections so far
    pub fn connects(&self) -> u32 {
        self.shared.lock().connects
    }

    /// Ids of sessions that are connected or temporarily disconnected
    pub fn live_sessions(&self) -> Vec<u64> {
        let state = self.shared.lock();
        let mut ids: Vec<u64> = state
            .sessions
            .keys()
            .copied()
            .filter(|id| state.is_live(*id))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drop every connected session's connection; ops fail with `ConnectionLoss`
    pub fn disconnect(&self) {
        let mut state = self.shared.lock();
        for entry in state.sessions.values_mut() {
            if entry.status == SessionStatus::Connected {
                entry.status = SessionStatus::Disconnected;
                self.shared
                    .deliver_state(&entry.watcher, KeeperState::Disconnected);
            }
        }
    }

    /// Restore every disconnected session
    pub fn reconnect(&self) {
        let mut state = self.shared.lock();
        for entry in state.sessions.values_mut() {
            if entry.status == SessionStatus::Disconnected {
                entry.status = SessionStatus::Connected;
                self.shared
                    .deliver_state(&entry.watcher, KeeperState::Connected);
            }
        }
    }

    /// Expire a session: its ephemerals vanish and its watchers see `Expired`
    pub fn expire_session(&self, session: u64) -> bool {
        let mut state = self.shared.lock();
        let Some(entry) = state.sessions.get_mut(&session) else {
            return false;
        };
        if !matches!(
            entry.status,
            SessionStatus::Connected | SessionStatus::Disconnected
        ) {
            return false;
        }
        entry.status = SessionStatus::Expired;
        let session_watcher = Arc::clone(&entry.watcher);

        let mut fired = Vec::new();
        let dropped = state.tree.remove_session(session, &mut fired);
        self.shared.deliver_watches(&state, fired);

        let mut watchers: Vec<Arc<dyn Watcher>> = Vec::new();
        for watcher in dropped {
            if !watchers.iter().any(|w| Arc::ptr_eq(w, &watcher)) {
                watchers.push(watcher);
            }
        }
        for watcher in &watchers {
            self.shared.deliver_state(watcher, KeeperState::Expired);
        }
        self.shared
            .deliver_state(&session_watcher, KeeperState::Expired);
        true
    }

    /// Block until every delivery queued so far has been dispatched.
    ///
    /// Must not be called from a callback or watcher.
    pub fn flush(&self) -> bool {
        let done = Arc::new(ManualResetEvent::new(false));
        {
            let marker = Arc::clone(&done);
            let _state = self.shared.lock();
            self.shared.send(Box::new(move || marker.signal()));
        }
        done.wait_one_timeout(Duration::from_secs(10))
            .unwrap_or(false)
    }
}

/// [`Connector`] that opens sessions on a [`FakeCoordinationService`]
#[derive(Clone)]
pub struct FakeConnector {
    shared: Arc<Shared>,
}

impl Connector for FakeConnector {
    fn connect(
        &self,
        connect_string: &str,
        _session_timeout: Duration,
        watcher: Arc<dyn Watcher>,
    ) -> Result<Arc<dyn CoordinationClient>, ConnectError> {
        let mut state = self.shared.lock();
        if state.refused_connects > 0 {
            state.refused_connects -= 1;
            return Err(ConnectError {
                connect_string: connect_string.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        state.next_session += 1;
        state.connects += 1;
        let session_id = state.next_session;
        state.sessions.insert(
            session_id,
            SessionEntry {
                watcher: Arc::clone(&watcher),
                status: SessionStatus::Connected,
            },
        );
        self.shared.deliver_state(&watcher, KeeperState::Connected);

        Ok(Arc::new(FakeClient {
            shared: Arc::clone(&self.shared),
            session_id,
        }))
    }
}

/// Client bound to one fake session
pub struct FakeClient {
    shared: Arc<Shared>,
    session_id: u64,
}

impl FakeClient {
    /// Record the call, then apply connectivity and injected faults
    fn begin(&self, state: &mut ServiceState, call: CoordinationCall) -> Result<(), ResultCode> {
        let op = call.kind();
        state.calls.push(call);
        state.check_session(self.session_id)?;
        state.take_fault(op)
    }
}

impl CoordinationClient for FakeClient {
    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode, callback: CreateCallback) {
        let mut state = self.shared.lock();
        let mut fired = Vec::new();
        let call = CoordinationCall::Create {
            session: self.session_id,
            path: path.to_string(),
            mode,
        };
        let result = self.begin(&mut state, call).and_then(|()| {
            state
                .tree
                .create(path, data, mode, self.session_id, &mut fired)
        });
        self.shared.deliver_watches(&state, fired);
        self.shared.send(Box::new(move || match result {
            Ok(created) => callback(ResultCode::Ok, Some(created)),
            Err(code) => callback(code, None),
        }));
    }

    fn delete(&self, path: &str, version: Option<i32>, callback: VoidCallback) {
        let mut state = self.shared.lock();
        let mut fired = Vec::new();
        let call = CoordinationCall::Delete {
            session: self.session_id,
            path: path.to_string(),
        };
        let result = self
            .begin(&mut state, call)
            .and_then(|()| state.tree.delete(path, version, &mut fired));
        self.shared.deliver_watches(&state, fired);
        let code = result.err().unwrap_or(ResultCode::Ok);
        self.shared.send(Box::new(move || callback(code)));
    }

    fn exists(&self, path: &str, watcher: Option<Arc<dyn Watcher>>, callback: StatCallback) {
        let mut state = self.shared.lock();
        let call = CoordinationCall::Exists {
            session: self.session_id,
            path: path.to_string(),
            watch: watcher.is_some(),
        };
        let result = self.begin(&mut state, call).and_then(|()| {
            if let Some(watcher) = watcher {
                state.tree.watch_exists(path, self.session_id, watcher);
            }
            state.tree.stat(path).ok_or(ResultCode::NoNode)
        });
        self.shared.send(Box::new(move || match result {
            Ok(stat) => callback(ResultCode::Ok, Some(stat)),
            Err(code) => callback(code, None),
        }));
    }

    fn get_children(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
        callback: ChildrenCallback,
    ) {
        let mut state = self.shared.lock();
        let call = CoordinationCall::GetChildren {
            session: self.session_id,
            path: path.to_string(),
            watch: watcher.is_some(),
        };
        let result = self.begin(&mut state, call).and_then(|()| {
            let children = state.tree.children(path).ok_or(ResultCode::NoNode)?;
            if let Some(watcher) = watcher {
                state.tree.watch_children(path, self.session_id, watcher);
            }
            Ok(children)
        });
        self.shared.send(Box::new(move || match result {
            Ok(children) => callback(ResultCode::Ok, children),
            Err(code) => callback(code, Vec::new()),
        }));
    }

    fn session_id(&self) -> u64 {
        self.session_id
    }

    fn close(&self) {
        let mut state = self.shared.lock();
        let Some(entry) = state.sessions.get_mut(&self.session_id) else {
            return;
        };
        if entry.status == SessionStatus::Closed {
            return;
        }
        entry.status = SessionStatus::Closed;
        let mut fired = Vec::new();
        state.tree.remove_session(self.session_id, &mut fired);
        self.shared.deliver_watches(&state, fired);
    }
}

/// Session config with millisecond-scale delays for fast tests
pub fn test_config() -> SessionConfig {
    SessionConfig::new("fake:2181")
        .with_connect_backoff(ConnectBackoff {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        })
        .with_retry(RetryPolicy {
            base_delay: Duration::from_millis(5),
            step: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
        })
        .with_multi_lock(
            MultiLockConfig::default()
                .with_retry_delays(Duration::from_millis(1), Duration::from_millis(20)),
        )
        .with_retry_workers(2)
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
