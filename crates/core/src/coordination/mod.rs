// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distributed locks built on queue nodes
//!
//! This module provides:
//! - **PathLock** - read/write lock on a single path
//! - **MultiPathLock** - all-or-nothing lock over several paths
//! - **LockNode** - parsing and ordering of queue node names
//! - **LockState** - transition tables shared by both locks

pub mod listener;
pub mod lock;
pub mod multi;
pub mod node;
pub mod state;

use crate::error::LockError;

pub use listener::{LockListener, TryLockListener};
pub use lock::PathLock;
pub use multi::{LockRequest, MultiPathLock};
pub use node::{find_blocking, lock_queue, LockNode, LockType};
pub use state::{LockEffect, LockState};

/// Blocking lock operations shared by single- and multi-path locks
pub trait Lock {
    /// Block until the lock is held
    fn acquire(&self) -> Result<(), LockError>;

    /// Take the lock only if nothing is ahead; `false` when abandoned
    fn try_acquire(&self) -> Result<bool, LockError>;

    /// Give the lock up. Releasing a lock that never started acquiring
    /// retires it without touching the service.
    fn release(&self) -> Result<(), LockError>;

    fn state(&self) -> LockState;
}
