// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callbacks for non-blocking acquisition

use super::lock::PathLock;
use crate::error::LockError;

/// Notified when a listener-based acquire finishes.
///
/// Callbacks run on the service's callback thread and must not block on
/// the same lock.
pub trait LockListener: Send + Sync {
    fn on_lock_acquired(&self, lock: &PathLock);
    fn on_lock_error(&self, error: &LockError, lock: &PathLock);
}

/// Notified when a try-acquire finishes; an abandoned attempt is not an error
pub trait TryLockListener: LockListener {
    fn on_try_acquire_failed(&self, lock: &PathLock);
}
