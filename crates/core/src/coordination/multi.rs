// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-path lock
//!
//! Acquires several single-path locks as one. Requests are sorted into a
//! canonical order (path, then type) shared by every caller, so two
//! multi-locks over overlapping paths never wait on each other in a cycle.
//! Each attempt try-acquires every lock in order; on the first failure the
//! attempt rolls back, sleeps a randomized exponential backoff, and retries
//! with fresh lock instances.

use super::lock::PathLock;
use super::node::LockType;
use super::state::{transition_aggregate, LockState};
use super::Lock;
use crate::backoff::binary_backoff;
use crate::config::MultiLockConfig;
use crate::error::LockError;
use crate::path::validate_path;
use crate::session::Session;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, info, warn};

/// One requested path and the access it needs
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockRequest {
    pub path: String,
    pub lock_type: LockType,
}

#[derive(Default)]
struct MultiInner {
    state: LockState,
    /// Lock instances of the current attempt, in canonical order
    locks: Vec<Arc<PathLock>>,
}

/// Lock over a set of paths, each read or write
pub struct MultiPathLock {
    session: Arc<Session>,
    config: MultiLockConfig,
    requests: Vec<LockRequest>,
    inner: Mutex<MultiInner>,
}

impl MultiPathLock {
    /// Empty multi-lock using the session's multi-lock settings
    pub fn new(session: &Arc<Session>) -> Self {
        Self {
            session: Arc::clone(session),
            config: session.config().multi_lock.clone(),
            requests: Vec::new(),
            inner: Mutex::new(MultiInner::default()),
        }
    }

    pub fn with_config(mut self, config: MultiLockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_read_lock(&mut self, path: &str) -> Result<(), LockError> {
        self.add(path, LockType::Read)
    }

    pub fn add_write_lock(&mut self, path: &str) -> Result<(), LockError> {
        self.add(path, LockType::Write)
    }

    fn add(&mut self, path: &str, lock_type: LockType) -> Result<(), LockError> {
        validate_path(path)?;
        self.requests.push(LockRequest {
            path: path.to_string(),
            lock_type,
        });
        Ok(())
    }

    /// Requests in the order they were added
    pub fn requests(&self) -> &[LockRequest] {
        &self.requests
    }

    /// Requests in acquisition order
    pub fn canonical_order(&self) -> Vec<LockRequest> {
        let mut order = self.requests.clone();
        order.sort();
        order
    }

    pub fn read_lock_paths(&self) -> Vec<String> {
        self.paths_of(LockType::Read)
    }

    pub fn write_lock_paths(&self) -> Vec<String> {
        self.paths_of(LockType::Write)
    }

    fn paths_of(&self, lock_type: LockType) -> Vec<String> {
        self.requests
            .iter()
            .filter(|r| r.lock_type == lock_type)
            .map(|r| r.path.clone())
            .collect()
    }

    /// Access requested for `path`; a read request wins over a write on the
    /// same path since it is acquired first
    pub fn contains(&self, path: &str) -> Option<LockType> {
        self.requests
            .iter()
            .filter(|r| r.path == path)
            .map(|r| r.lock_type)
            .min()
    }

    /// Lock instances of the current or last attempt
    pub fn locks(&self) -> Vec<Arc<PathLock>> {
        self.inner().locks.clone()
    }

    fn inner(&self) -> MutexGuard<'_, MultiInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, target: LockState) -> Result<(), LockError> {
        let mut inner = self.inner();
        let next = transition_aggregate(inner.state, target)?;
        if next != inner.state {
            debug!(from = ?inner.state, to = ?next, "multi-lock state changed");
        }
        inner.state = next;
        Ok(())
    }

    /// Record a failure and hand it back
    fn fail(&self, err: LockError) -> LockError {
        if let Err(e) = self.set_state(LockState::Error) {
            debug!(error = %e, "multi-lock error transition rejected");
        }
        err
    }

    /// Replace the lock instances with fresh ones for `order`
    fn rebuild(&self, order: &[LockRequest]) -> Result<Vec<Arc<PathLock>>, LockError> {
        let locks = order
            .iter()
            .map(|r| PathLock::new(&self.session, &r.path, r.lock_type))
            .collect::<Result<Vec<_>, _>>()?;
        self.inner().locks = locks.clone();
        Ok(locks)
    }

    /// One pass over every lock. All or nothing: a failed pass holds nothing.
    fn try_all(&self, locks: &[Arc<PathLock>]) -> Result<bool, LockError> {
        for lock in locks {
            match lock.try_acquire() {
                Ok(true) => {}
                Ok(false) => {
                    debug!(path = lock.path(), "multi-lock attempt blocked");
                    roll_back(locks);
                    return Ok(false);
                }
                Err(err) => {
                    roll_back(locks);
                    return Err(err);
                }
            }
        }
        Ok(true)
    }
}

/// Give up every queue node of an attempt: release held locks, fail
/// waiting ones, and re-delete the nodes of locks that died
fn roll_back(locks: &[Arc<PathLock>]) {
    for lock in locks {
        match lock.state() {
            LockState::Acquired => {
                if let Err(e) = lock.release() {
                    warn!(path = lock.path(), error = %e, "failed to release during rollback");
                }
            }
            // Releasing a waiting lock kills it, which deletes its node
            LockState::Waiting => {
                let _ = lock.release();
            }
            LockState::Error => lock.discard_node(),
            LockState::Idle | LockState::Abandoned | LockState::Released => {}
        }
    }
}

impl Lock for MultiPathLock {
    fn acquire(&self) -> Result<(), LockError> {
        self.set_state(LockState::Waiting)?;
        let order = self.canonical_order();

        match order.as_slice() {
            [] => return self.set_state(LockState::Acquired),
            [single] => {
                let lock = PathLock::new(&self.session, &single.path, single.lock_type)
                    .map_err(|e| self.fail(e))?;
                self.inner().locks = vec![Arc::clone(&lock)];
                lock.acquire().map_err(|e| self.fail(e))?;
                return self.set_state(LockState::Acquired);
            }
            _ => {}
        }

        let mut rng = rand::thread_rng();
        let mut attempts = 0;
        loop {
            let locks = self.rebuild(&order).map_err(|e| self.fail(e))?;
            if self.try_all(&locks).map_err(|e| self.fail(e))? {
                info!(paths = order.len(), attempts = attempts + 1, "multi-lock acquired");
                return self.set_state(LockState::Acquired);
            }

            attempts += 1;
            if attempts >= self.config.max_attempts {
                warn!(attempts, "multi-lock giving up");
                return Err(self.fail(LockError::MaxAttemptsExceeded { attempts }));
            }
            let delay = binary_backoff(
                attempts,
                self.config.min_retry_delay,
                self.config.max_retry_delay,
                &mut rng,
            );
            debug!(attempts, delay_ms = delay.as_millis() as u64, "multi-lock backing off");
            thread::sleep(delay);
        }
    }

    fn try_acquire(&self) -> Result<bool, LockError> {
        self.set_state(LockState::Waiting)?;
        let order = self.canonical_order();
        if order.is_empty() {
            self.set_state(LockState::Acquired)?;
            return Ok(true);
        }

        let locks = self.rebuild(&order).map_err(|e| self.fail(e))?;
        if self.try_all(&locks).map_err(|e| self.fail(e))? {
            self.set_state(LockState::Acquired)?;
            Ok(true)
        } else {
            self.set_state(LockState::Abandoned)?;
            Ok(false)
        }
    }

    fn release(&self) -> Result<(), LockError> {
        self.set_state(LockState::Released)?;
        roll_back(&self.locks());
        Ok(())
    }

    fn state(&self) -> LockState {
        self.inner().state
    }
}

#[cfg(test)]
#[path = "multi_tests.rs"]
mod tests;
