// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-path read/write lock
//!
//! Acquisition runs as a chain of service calls:
//!
//! 1. ensure the lock path exists ([`PathCreator`])
//! 2. create an ephemeral sequential `READ-`/`WRITE-` queue node
//! 3. list the queue and find the node blocking this one
//! 4. no blocker: acquired; try-only: abandoned; otherwise watch the blocker
//!    and go back to 3 once it is deleted
//!
//! Each step's callback funnels through
//! [`PrimitiveCore::pass_or_try_repeat`], so connection loss, timeouts and
//! expiry are handled uniformly.

use super::listener::{LockListener, TryLockListener};
use super::node::{find_blocking, lock_queue, LockType};
use super::state::{transition, LockEffect, LockState};
use super::Lock;
use crate::client::{child_path, node_name, CreateMode, ResultCode};
use crate::error::LockError;
use crate::path::{validate_path, PathCreator, PathCreatorConfig};
use crate::primitive::{PrimitiveCore, SyncPrimitive};
use crate::session::Session;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CreateNode,
    ListQueue,
    WatchBlocking,
    DeleteNode,
}

#[derive(Clone)]
enum Subscriber {
    Blocking(Arc<dyn LockListener>),
    Try(Arc<dyn TryLockListener>),
}

#[derive(Default)]
struct LockInner {
    state: LockState,
    /// Name of this lock's queue node once created
    node_id: Option<String>,
    blocking_node_id: Option<String>,
    try_only: bool,
    subscriber: Option<Subscriber>,
    parent: Option<Arc<PathCreator>>,
}

/// Read or write lock on one path
///
/// Dropping a lock that still owns a queue node deletes the node, so a held
/// lock is released when its last handle goes away.
pub struct PathLock {
    core: PrimitiveCore,
    path: String,
    lock_type: LockType,
    inner: Mutex<LockInner>,
    this: Weak<PathLock>,
}

impl PathLock {
    pub fn new(
        session: &Arc<Session>,
        path: &str,
        lock_type: LockType,
    ) -> Result<Arc<Self>, LockError> {
        validate_path(path)?;
        let client = session.live_client()?;
        Ok(Arc::new_cyclic(|this: &Weak<PathLock>| {
            let owner: Weak<dyn SyncPrimitive> = this.clone();
            PathLock {
                core: PrimitiveCore::new(Arc::clone(session), client, owner),
                path: path.to_string(),
                lock_type,
                inner: Mutex::new(LockInner::default()),
                this: this.clone(),
            }
        }))
    }

    pub fn read(session: &Arc<Session>, path: &str) -> Result<Arc<Self>, LockError> {
        Self::new(session, path, LockType::Read)
    }

    pub fn write(session: &Arc<Session>, path: &str) -> Result<Arc<Self>, LockError> {
        Self::new(session, path, LockType::Write)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    /// Name of this lock's queue node, once created
    pub fn node_id(&self) -> Option<String> {
        self.inner().node_id.clone()
    }

    /// Name of the node this lock last found ahead of it
    pub fn blocking_node_id(&self) -> Option<String> {
        self.inner().blocking_node_id.clone()
    }

    /// Start a blocking acquire; `listener` hears the outcome
    pub fn acquire_with(&self, listener: Arc<dyn LockListener>) -> Result<(), LockError> {
        self.start(false, Some(Subscriber::Blocking(listener)))
    }

    /// Start a try-acquire; `listener` hears acquired, failed, or error
    pub fn try_acquire_with(&self, listener: Arc<dyn TryLockListener>) -> Result<(), LockError> {
        self.start(true, Some(Subscriber::Try(listener)))
    }

    fn inner(&self) -> MutexGuard<'_, LockInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start(&self, try_only: bool, subscriber: Option<Subscriber>) -> Result<(), LockError> {
        self.apply(LockState::Waiting)?;
        debug!(path = %self.path, lock_type = %self.lock_type, try_only, "acquiring lock");

        let listening = subscriber.is_some();
        {
            let mut inner = self.inner();
            inner.try_only = try_only;
            inner.subscriber = subscriber;
        }
        if listening {
            let this = self.this.clone();
            self.core.add_update_listener(
                move || {
                    if let Some(lock) = this.upgrade() {
                        lock.report_update();
                    }
                },
                false,
            );
            let this = self.this.clone();
            self.core.add_death_listener(move || {
                if let Some(lock) = this.upgrade() {
                    lock.report_death();
                }
            });
        }

        self.ensure_parent();
        Ok(())
    }

    /// Create the lock path, then start queueing once it exists
    fn ensure_parent(&self) {
        let creator = match PathCreator::start(
            self.core.session(),
            &self.path,
            PathCreatorConfig::default(),
        ) {
            Ok(creator) => creator,
            Err(err) => {
                self.core.die(err);
                return;
            }
        };
        self.inner().parent = Some(Arc::clone(&creator));

        let this = self.this.clone();
        creator.core().add_update_listener(
            move || {
                if let Some(lock) = this.upgrade() {
                    lock.run(Step::CreateNode);
                }
            },
            true,
        );

        let this = self.this.clone();
        let parent = Arc::downgrade(&creator);
        creator.core().add_death_listener(move || {
            let cause = parent
                .upgrade()
                .and_then(|p| p.core().killed_by())
                .unwrap_or_else(|| LockError::Unknown("path creation failed".to_string()));
            if let Some(lock) = this.upgrade() {
                lock.core.die(cause);
            }
        });
    }

    /// Issue the service call for `step`. The callback keeps the lock alive
    /// until the result arrives.
    fn run(&self, step: Step) {
        let Some(lock) = self.this.upgrade() else {
            return;
        };
        let client = self.core.client();

        match step {
            Step::CreateNode => {
                let prefix = child_path(&self.path, &self.lock_type.node_prefix());
                client.create(
                    &prefix,
                    Vec::new(),
                    CreateMode::EphemeralSequential,
                    Box::new(move |code, created| lock.handle_create(code, created)),
                );
            }
            Step::ListQueue => {
                client.get_children(
                    &self.path,
                    None,
                    Box::new(move |code, children| lock.handle_children(code, children)),
                );
            }
            Step::WatchBlocking => {
                let Some(blocking) = self.blocking_node_id() else {
                    return;
                };
                client.exists(
                    &child_path(&self.path, &blocking),
                    Some(self.core.watcher()),
                    Box::new(move |code, _| lock.handle_exists(code)),
                );
            }
            Step::DeleteNode => {
                let Some(node) = self.node_id() else {
                    return;
                };
                client.delete(
                    &child_path(&self.path, &node),
                    None,
                    Box::new(move |code| lock.handle_delete(code)),
                );
            }
        }
    }

    /// Re-run `step` later without keeping a dropped lock alive
    fn retry(&self, step: Step) -> impl FnOnce() + Send + 'static {
        let this = self.this.clone();
        move || {
            if let Some(lock) = this.upgrade() {
                lock.run(step);
            }
        }
    }

    fn handle_create(&self, code: ResultCode, created: Option<String>) {
        if let Some(created) = created.filter(|_| code.is_ok()) {
            self.inner().node_id = Some(node_name(&created).to_string());
        }
        if !self
            .core
            .pass_or_try_repeat(code, &[ResultCode::Ok], self.retry(Step::CreateNode))
        {
            return;
        }
        if self.current_state().is_terminal() {
            self.run(Step::DeleteNode);
            return;
        }
        debug!(path = %self.path, node = ?self.node_id(), "queue node created");
        self.run(Step::ListQueue);
    }

    fn handle_children(&self, code: ResultCode, children: Vec<String>) {
        if !self
            .core
            .pass_or_try_repeat(code, &[ResultCode::Ok], self.retry(Step::ListQueue))
        {
            return;
        }
        if self.current_state().is_terminal() {
            self.run(Step::DeleteNode);
            return;
        }

        let (self_id, try_only) = {
            let inner = self.inner();
            (inner.node_id.clone(), inner.try_only)
        };
        let queue = lock_queue(&children, self_id.as_deref());
        if !queue.iter().any(|node| node.is_self) {
            warn!(path = %self.path, node = ?self_id, "own queue node is missing");
            self.core.die(LockError::Coordination(ResultCode::NoNode));
            return;
        }

        let blocking = find_blocking(&queue).map(|node| node.name.clone());
        self.inner().blocking_node_id = blocking.clone();
        match blocking {
            None => self.apply_internal(LockState::Acquired),
            Some(_) if try_only => self.apply_internal(LockState::Abandoned),
            Some(blocking) => {
                debug!(path = %self.path, %blocking, "waiting on blocking node");
                self.run(Step::WatchBlocking);
            }
        }
    }

    fn handle_exists(&self, code: ResultCode) {
        if code == ResultCode::NoNode {
            // Deleted before the watch was set
            self.run(Step::ListQueue);
            return;
        }
        self.core
            .pass_or_try_repeat(code, &[ResultCode::Ok], self.retry(Step::WatchBlocking));
    }

    fn handle_delete(&self, code: ResultCode) {
        if self.core.pass_or_try_repeat(
            code,
            &[ResultCode::Ok, ResultCode::NoNode],
            self.retry(Step::DeleteNode),
        ) {
            debug!(path = %self.path, "queue node removed");
        }
    }

    fn current_state(&self) -> LockState {
        self.inner().state
    }

    /// Apply a transition, then run its effects outside the lock
    fn apply(&self, target: LockState) -> Result<(), LockError> {
        let effects = {
            let mut inner = self.inner();
            let from = inner.state;
            let (next, effects) = transition(from, target)?;
            if next != from {
                debug!(path = %self.path, ?from, to = ?next, "lock state changed");
            }
            inner.state = next;
            effects
        };

        for effect in effects {
            match effect {
                LockEffect::DeleteNode => self.run(Step::DeleteNode),
                LockEffect::NotifyUpdated => self.core.on_state_updated(),
                LockEffect::Die(cause) => {
                    self.core.die(cause.clone());
                    return Err(cause);
                }
            }
        }
        Ok(())
    }

    fn apply_internal(&self, target: LockState) {
        if let Err(e) = self.apply(target) {
            debug!(path = %self.path, error = %e, "transition rejected");
        }
    }

    fn report_update(&self) {
        let (state, subscriber) = {
            let inner = self.inner();
            (inner.state, inner.subscriber.clone())
        };
        match subscriber {
            Some(Subscriber::Try(listener)) if state == LockState::Abandoned => {
                listener.on_try_acquire_failed(self)
            }
            Some(Subscriber::Try(listener)) => listener.on_lock_acquired(self),
            Some(Subscriber::Blocking(listener)) => listener.on_lock_acquired(self),
            None => {}
        }
    }

    /// Delete the queue node of a lock that died, in case the delete issued
    /// at death was lost
    pub(crate) fn discard_node(&self) {
        if self.current_state() == LockState::Error {
            self.run(Step::DeleteNode);
        }
    }

    fn report_death(&self) {
        let cause = self
            .core
            .killed_by()
            .unwrap_or_else(|| LockError::Unknown("lock died without a cause".to_string()));
        match self.inner().subscriber.clone() {
            Some(Subscriber::Try(listener)) => listener.on_lock_error(&cause, self),
            Some(Subscriber::Blocking(listener)) => listener.on_lock_error(&cause, self),
            None => {}
        }
    }
}

impl Lock for PathLock {
    fn acquire(&self) -> Result<(), LockError> {
        self.start(false, None)?;
        self.core.wait_synchronized()
    }

    fn try_acquire(&self) -> Result<bool, LockError> {
        self.start(true, None)?;
        self.core.wait_synchronized()?;
        Ok(self.current_state() == LockState::Acquired)
    }

    fn release(&self) -> Result<(), LockError> {
        debug!(path = %self.path, lock_type = %self.lock_type, "releasing lock");
        self.apply(LockState::Released)
    }

    fn state(&self) -> LockState {
        self.current_state()
    }
}

impl SyncPrimitive for PathLock {
    fn core(&self) -> &PrimitiveCore {
        &self.core
    }

    fn on_die(&self, _cause: &LockError) {
        self.apply_internal(LockState::Error);
    }

    fn on_node_deleted(self: Arc<Self>, path: &str) {
        debug!(path, "blocking node deleted");
        self.run(Step::ListQueue);
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        let owns_node = matches!(
            inner.state,
            LockState::Waiting | LockState::Acquired | LockState::Error
        );
        if let (true, Some(node)) = (owns_node, inner.node_id.as_ref()) {
            let node_path = child_path(&self.path, node);
            debug!(path = %node_path, "deleting queue node of dropped lock");
            self.core.client().delete(&node_path, None, Box::new(|_| {}));
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
