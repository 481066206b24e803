// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle shared by every asynchronous algorithm run against the service
//!
//! A primitive is pending until it either synchronizes (success, via
//! [`PrimitiveCore::on_state_updated`]) or dies (failure, via
//! [`PrimitiveCore::die`]). Both raise the internal manual-reset signal that
//! [`PrimitiveCore::wait_synchronized`] blocks on. Every service callback is
//! funnelled through [`PrimitiveCore::pass_or_try_repeat`], which decides
//! whether to proceed, retry later, wait for reconnection, or die.

use crate::client::{CoordinationClient, EventType, KeeperState, ResultCode, WatchedEvent, Watcher};
use crate::error::LockError;
use crate::session::Session;
use crate::signal::{ManualResetEvent, ResetEvent};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Deferred re-execution of one algorithm step
pub type Operation = Box<dyn FnOnce() + Send + 'static>;

type Listener = Arc<dyn Fn() + Send + Sync>;

static NEXT_PRIMITIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Hooks a concrete primitive supplies to the shared lifecycle
///
/// Every hook has a no-op default. Connectivity and watch hooks take
/// `Arc<Self>` so they can restart the primitive's step chain.
pub trait SyncPrimitive: Send + Sync + 'static {
    fn core(&self) -> &PrimitiveCore;

    /// Re-run the algorithm on a new session after resurrection
    fn resynchronize(self: Arc<Self>) {}

    /// Called once the kill cause is recorded, before death listeners run
    fn on_die(&self, _cause: &LockError) {}

    fn on_connected(self: Arc<Self>) {}
    fn on_disconnected(self: Arc<Self>) {}
    fn on_session_expired(&self) {}

    fn on_node_created(self: Arc<Self>, _path: &str) {}
    fn on_node_deleted(self: Arc<Self>, _path: &str) {}
    fn on_node_data_changed(self: Arc<Self>, _path: &str) {}
    fn on_node_children_changed(self: Arc<Self>, _path: &str) {}

    /// Retry unclassified failures with backoff instead of dying
    fn should_retry_on_error(&self) -> bool {
        false
    }

    /// Retry `OperationTimeout` / `SessionMoved` with backoff
    fn should_retry_on_timeout(&self) -> bool {
        true
    }

    /// Survive session expiry by re-running on the next session.
    ///
    /// Off by default: resurrection can hide updates lost with the old session.
    fn should_resurrect_after_session_expiry(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct Listeners {
    killed_by: Option<LockError>,
    /// Set once `on_state_updated` has snapshotted the update listeners
    updated: bool,
    on_update: Vec<Listener>,
    on_death: Vec<Listener>,
}

/// State every primitive embeds; drives the shared lifecycle
pub struct PrimitiveCore {
    id: u64,
    session: Arc<Session>,
    client: Mutex<Arc<dyn CoordinationClient>>,
    owner: Weak<dyn SyncPrimitive>,
    watcher: Arc<dyn Watcher>,
    synchronized: ManualResetEvent,
    retries: AtomicU32,
    retry_on_connect: Mutex<Option<Operation>>,
    listeners: Mutex<Listeners>,
}

impl PrimitiveCore {
    /// `owner` is the primitive embedding this core, typically obtained
    /// through `Arc::new_cyclic`.
    pub fn new(
        session: Arc<Session>,
        client: Arc<dyn CoordinationClient>,
        owner: Weak<dyn SyncPrimitive>,
    ) -> Self {
        let watcher: Arc<dyn Watcher> = Arc::new(PrimitiveWatcher {
            target: owner.clone(),
        });
        Self {
            id: NEXT_PRIMITIVE_ID.fetch_add(1, Ordering::Relaxed),
            session,
            client: Mutex::new(client),
            owner,
            watcher,
            synchronized: ManualResetEvent::new(false),
            retries: AtomicU32::new(0),
            retry_on_connect: Mutex::new(None),
            listeners: Mutex::new(Listeners::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Client of the session this primitive is currently bound to
    pub fn client(&self) -> Arc<dyn CoordinationClient> {
        Arc::clone(&self.client.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Watcher that routes events back into this primitive's hooks
    pub fn watcher(&self) -> Arc<dyn Watcher> {
        Arc::clone(&self.watcher)
    }

    pub(crate) fn rebind(&self, client: Arc<dyn CoordinationClient>) {
        *self.client.lock().unwrap_or_else(|e| e.into_inner()) = client;
    }

    pub(crate) fn take_retry_on_connect(&self) -> Option<Operation> {
        self.retry_on_connect
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until synchronized or dead; dead primitives return their cause
    pub fn wait_synchronized(&self) -> Result<(), LockError> {
        self.synchronized.wait_one()?;
        match self.killed_by() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    /// Like [`Self::wait_synchronized`], giving up after `timeout`
    pub fn wait_synchronized_timeout(&self, timeout: Duration) -> Result<bool, LockError> {
        if !self.synchronized.wait_one_timeout(timeout)? {
            return Ok(false);
        }
        match self.killed_by() {
            Some(cause) => Err(cause),
            None => Ok(true),
        }
    }

    /// Wake threads blocked in `wait_synchronized` with `Interrupted`
    pub fn interrupt_waiters(&self) {
        self.synchronized.interrupt();
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized.is_signaled()
    }

    pub fn is_alive(&self) -> bool {
        self.listeners().killed_by.is_none()
    }

    pub fn killed_by(&self) -> Option<LockError> {
        self.listeners().killed_by.clone()
    }

    /// Register a handler for every successful state update.
    ///
    /// With `run_if_synchronized`, a primitive that already synchronized (and
    /// is alive) runs the handler right away on the calling thread.
    pub fn add_update_listener<F>(&self, handler: F, run_if_synchronized: bool)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handler: Listener = Arc::new(handler);
        let run_now = {
            let mut listeners = self.listeners();
            listeners.on_update.push(Arc::clone(&handler));
            run_if_synchronized && listeners.updated && listeners.killed_by.is_none()
        };
        if run_now {
            handler();
        }
    }

    /// Register a handler for death; runs right away if already dead
    pub fn add_death_listener<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handler: Listener = Arc::new(handler);
        let run_now = {
            let mut listeners = self.listeners();
            listeners.on_death.push(Arc::clone(&handler));
            listeners.killed_by.is_some()
        };
        if run_now {
            handler();
        }
    }

    /// Report success: listeners first, then the synchronized signal
    pub fn on_state_updated(&self) {
        let handlers = {
            let mut listeners = self.listeners();
            listeners.killed_by = None;
            listeners.updated = true;
            listeners.on_update.clone()
        };
        for handler in handlers {
            handler();
        }
        self.synchronized.signal();
    }

    /// Kill the primitive. Later calls keep the first cause.
    pub fn die(&self, cause: LockError) {
        let handlers = {
            let mut listeners = self.listeners();
            if listeners.killed_by.is_some() {
                debug!(primitive = self.id, error = %cause, "already dead, ignoring");
                return;
            }
            listeners.killed_by = Some(cause.clone());
            listeners.on_death.clone()
        };

        warn!(primitive = self.id, error = %cause, "primitive died");
        if let Some(owner) = self.owner.upgrade() {
            owner.on_die(&cause);
        }
        for handler in handlers {
            handler();
        }
        self.synchronized.signal();
    }

    /// Decide what to do with the result of a service call.
    ///
    /// Returns `true` when `code` is acceptable and the caller should move on
    /// to its next step. Otherwise `operation` is parked until reconnection,
    /// scheduled for a delayed retry, or the primitive dies; the return is
    /// `false` in every such case.
    pub fn pass_or_try_repeat<F>(&self, code: ResultCode, acceptable: &[ResultCode], operation: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if acceptable.contains(&code) {
            self.retries.store(0, Ordering::Relaxed);
            return true;
        }

        let Some(owner) = self.owner.upgrade() else {
            return false;
        };

        match code {
            ResultCode::ConnectionLoss => {
                debug!(primitive = self.id, "connection lost, parking operation until reconnect");
                *self
                    .retry_on_connect
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(operation));
                self.session.restart_primitive_when_connected(&owner);
            }
            ResultCode::SessionMoved | ResultCode::OperationTimeout => {
                if owner.should_retry_on_timeout() {
                    self.schedule_retry(code, Box::new(operation));
                } else {
                    self.die(LockError::Coordination(code));
                }
            }
            ResultCode::SessionExpired => self.handle_session_expiry(&owner),
            _ => {
                if owner.should_retry_on_error() {
                    self.schedule_retry(code, Box::new(operation));
                } else {
                    self.die(LockError::Coordination(code));
                }
            }
        }
        false
    }

    fn schedule_retry(&self, code: ResultCode, operation: Operation) {
        let attempt = self.retries.fetch_add(1, Ordering::Relaxed);
        debug!(primitive = self.id, %code, attempt, "scheduling retry");
        self.session.retry_primitive_operation(operation, attempt);
    }

    /// Resurrect on the next session if the primitive opts in, else die
    pub(crate) fn handle_session_expiry(&self, owner: &Arc<dyn SyncPrimitive>) {
        owner.on_session_expired();
        if owner.should_resurrect_after_session_expiry() {
            debug!(primitive = self.id, "session expired, awaiting resurrection");
            self.session.resurrect_primitive_when_new_session(owner);
        } else {
            self.die(LockError::Coordination(ResultCode::SessionExpired));
        }
    }
}

/// Route a watch notification to the matching primitive hook
pub fn dispatch_event(primitive: Arc<dyn SyncPrimitive>, event: WatchedEvent) {
    if event.state == KeeperState::Expired {
        let core = primitive.core();
        core.handle_session_expiry(&primitive);
        return;
    }

    let path = event.path.unwrap_or_default();
    match event.event_type {
        EventType::NodeCreated => primitive.on_node_created(&path),
        EventType::NodeDeleted => primitive.on_node_deleted(&path),
        EventType::NodeDataChanged => primitive.on_node_data_changed(&path),
        EventType::NodeChildrenChanged => primitive.on_node_children_changed(&path),
        EventType::None => match event.state {
            KeeperState::Connected => primitive.on_connected(),
            KeeperState::Disconnected => primitive.on_disconnected(),
            state => {
                warn!(primitive = primitive.core().id(), ?state, "unexpected watch event");
                primitive
                    .core()
                    .die(LockError::Coordination(ResultCode::SystemError));
            }
        },
    }
}

/// Watcher registered with the service on a primitive's behalf.
///
/// Holds the primitive weakly so an outstanding watch does not keep an
/// abandoned primitive alive.
struct PrimitiveWatcher {
    target: Weak<dyn SyncPrimitive>,
}

impl Watcher for PrimitiveWatcher {
    fn process(&self, event: WatchedEvent) {
        if let Some(primitive) = self.target.upgrade() {
            dispatch_event(primitive, event);
        }
    }
}

#[cfg(test)]
#[path = "primitive_tests.rs"]
mod tests;
