// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-thread events bridging callback delivery and blocked callers
//!
//! - **AutoResetEvent** - each successful wait consumes the signal
//! - **ManualResetEvent** - signal stays set until explicitly reset

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// A blocking wait was cut short by [`ResetEvent::interrupt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait interrupted")]
pub struct Interrupted;

/// Event that threads can block on until another thread signals it
pub trait ResetEvent: Send + Sync {
    fn signal(&self);
    fn reset(&self);
    /// Block until signalled
    fn wait_one(&self) -> Result<(), Interrupted>;
    /// Block until signalled or `timeout` elapses; returns whether signalled
    fn wait_one_timeout(&self, timeout: Duration) -> Result<bool, Interrupted>;
    fn is_signaled(&self) -> bool;
    /// Wake every thread currently waiting with `Err(Interrupted)`
    fn interrupt(&self);
}

#[derive(Debug, Default)]
struct EventState {
    signaled: bool,
    /// Bumped by `interrupt`; waiters compare against the value they entered with
    interrupts: u64,
}

#[derive(Debug, Default)]
struct EventCore {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl EventCore {
    fn new(signaled: bool) -> Self {
        Self {
            state: Mutex::new(EventState {
                signaled,
                interrupts: 0,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until signalled. `consume` clears the signal on the way out.
    fn wait(&self, deadline: Option<Instant>, consume: bool) -> Result<bool, Interrupted> {
        let mut state = self.lock();
        let entered = state.interrupts;

        loop {
            if state.interrupts != entered {
                return Err(Interrupted);
            }
            if state.signaled {
                if consume {
                    state.signaled = false;
                }
                return Ok(true);
            }

            state = match deadline {
                None => self.cond.wait(state).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    self.cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
    }

    fn interrupt(&self) {
        let mut state = self.lock();
        state.interrupts = state.interrupts.wrapping_add(1);
        self.cond.notify_all();
    }
}

/// Event that releases exactly one waiter per signal
///
/// Signalling an already-signalled event is a no-op, so signals do not
/// accumulate while nobody waits.
#[derive(Debug, Default)]
pub struct AutoResetEvent {
    core: EventCore,
}

impl AutoResetEvent {
    pub fn new(signaled: bool) -> Self {
        Self {
            core: EventCore::new(signaled),
        }
    }
}

impl ResetEvent for AutoResetEvent {
    fn signal(&self) {
        let mut state = self.core.lock();
        if !state.signaled {
            state.signaled = true;
            self.core.cond.notify_one();
        }
    }

    fn reset(&self) {
        self.core.lock().signaled = false;
    }

    fn wait_one(&self) -> Result<(), Interrupted> {
        self.core.wait(None, true).map(|_| ())
    }

    fn wait_one_timeout(&self, timeout: Duration) -> Result<bool, Interrupted> {
        self.core.wait(Some(Instant::now() + timeout), true)
    }

    fn is_signaled(&self) -> bool {
        self.core.lock().signaled
    }

    fn interrupt(&self) {
        self.core.interrupt();
    }
}

/// Sticky event: once signalled every wait returns until `reset`
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    core: EventCore,
}

impl ManualResetEvent {
    pub fn new(signaled: bool) -> Self {
        Self {
            core: EventCore::new(signaled),
        }
    }
}

impl ResetEvent for ManualResetEvent {
    fn signal(&self) {
        let mut state = self.core.lock();
        state.signaled = true;
        self.core.cond.notify_all();
    }

    fn reset(&self) {
        let mut state = self.core.lock();
        if state.signaled {
            state.signaled = false;
        }
    }

    fn wait_one(&self) -> Result<(), Interrupted> {
        self.core.wait(None, false).map(|_| ())
    }

    fn wait_one_timeout(&self, timeout: Duration) -> Result<bool, Interrupted> {
        self.core.wait(Some(Instant::now() + timeout), false)
    }

    fn is_signaled(&self) -> bool {
        self.core.lock().signaled
    }

    fn interrupt(&self) {
        self.core.interrupt();
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
