// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock state tables
//!
//! Pure transition functions shared by the single-path and multi-path locks.
//! Transitions return the next state plus the effects the lock must run
//! once its internal mutex is released.

use crate::error::LockError;

/// Lifecycle of a lock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockState {
    #[default]
    Idle,
    Waiting,
    Abandoned,
    Acquired,
    Released,
    Error,
}

impl LockState {
    /// No further transitions change the lock's holdings
    pub fn is_terminal(self) -> bool {
        matches!(self, LockState::Released | LockState::Error)
    }
}

/// Side effects requested by a single-path transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEffect {
    /// Delete this lock's queue node
    DeleteNode,
    /// Report synchronization to listeners and waiters
    NotifyUpdated,
    /// Kill the primitive with the given cause
    Die(LockError),
}

/// The only legal start of an attempt is `Idle`
fn enter_waiting(from: LockState) -> Result<LockState, LockError> {
    match from {
        LockState::Idle => Ok(LockState::Waiting),
        LockState::Waiting => Err(LockError::AlreadyWaiting),
        LockState::Abandoned => Err(LockError::AlreadyAbandoned),
        LockState::Acquired => Err(LockError::AlreadyAcquired),
        LockState::Released => Err(LockError::AlreadyReleased),
        LockState::Error => Err(LockError::Unknown(
            "lock failed earlier and cannot be reused".to_string(),
        )),
    }
}

/// Single-path lock transition
///
/// # Panics
///
/// On combinations the lock's step chain can never produce, such as
/// acquiring a lock that never started waiting.
pub fn transition(
    from: LockState,
    to: LockState,
) -> Result<(LockState, Vec<LockEffect>), LockError> {
    use LockState::*;

    let outcome = match (to, from) {
        (Waiting, _) => (enter_waiting(from)?, vec![]),

        (Abandoned, Waiting) => (Abandoned, vec![LockEffect::DeleteNode, LockEffect::NotifyUpdated]),
        (Abandoned, Error) => (Error, vec![LockEffect::DeleteNode]),
        // Duplicate or late queue result
        (Abandoned, Abandoned | Acquired | Released) => (from, vec![]),

        (Acquired, Waiting) => (Acquired, vec![LockEffect::NotifyUpdated]),
        // Released or failed while the queue was still being inspected
        (Acquired, Released | Error) => (from, vec![LockEffect::DeleteNode]),
        (Acquired, Acquired | Abandoned) => (from, vec![]),

        (Released, Idle) => (Released, vec![]),
        (Released, Waiting) => (
            Waiting,
            vec![LockEffect::Die(LockError::ReleasedWhileWaiting)],
        ),
        (Released, Acquired) => (Released, vec![LockEffect::DeleteNode]),
        (Released, Abandoned | Released | Error) => (from, vec![]),

        (Error, Released) => (Released, vec![]),
        // A dead lock gives up its queue node right away
        (Error, Waiting | Acquired) => (Error, vec![LockEffect::DeleteNode]),
        (Error, _) => (Error, vec![]),

        (Idle, _) | (Abandoned, Idle) | (Acquired, Idle) => {
            unreachable!("illegal lock transition {from:?} -> {to:?}")
        }
    };
    Ok(outcome)
}

/// Multi-path lock transition; the aggregate owns no node of its own
///
/// # Panics
///
/// On combinations the acquire loop can never produce.
pub fn transition_aggregate(from: LockState, to: LockState) -> Result<LockState, LockError> {
    use LockState::*;

    let next = match (to, from) {
        (Waiting, _) => enter_waiting(from)?,

        (Abandoned, Waiting) => Abandoned,
        (Abandoned, Abandoned | Released | Error) => from,

        (Acquired, Waiting) => Acquired,
        (Acquired, Acquired | Released | Error) => from,

        (Released, Idle | Acquired | Abandoned) => Released,
        (Released, Waiting) => return Err(LockError::ReleasedWhileWaiting),
        (Released, Released | Error) => from,

        (Error, Released) => Released,
        (Error, _) => Error,

        (Idle, _) | (Abandoned, Idle | Acquired) | (Acquired, Idle | Abandoned) => {
            unreachable!("illegal multi-lock transition {from:?} -> {to:?}")
        }
    };
    Ok(next)
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
