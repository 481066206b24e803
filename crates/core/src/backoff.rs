// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delay arithmetic for connection, retry and multi-lock backoff

use crate::config::{ConnectBackoff, RetryPolicy};
use rand::Rng;
use std::time::Duration;

/// Doubling delay between connection attempts
#[derive(Debug, Clone)]
pub struct ConnectDelays {
    next: Duration,
    max: Duration,
}

impl ConnectDelays {
    pub fn new(config: &ConnectBackoff) -> Self {
        Self {
            next: config.initial_delay,
            max: config.max_delay,
        }
    }
}

impl Iterator for ConnectDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        Some(delay)
    }
}

/// Delay before retry number `attempt` (zero-based) of a primitive operation
pub fn retry_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy
        .base_delay
        .saturating_add(policy.step.saturating_mul(attempt))
        .min(policy.max_delay)
}

/// Randomized binary exponential backoff
///
/// Picks uniformly from `[min, min * 2^attempt]`, with the upper bound capped
/// at `max`.
pub fn binary_backoff(attempt: u32, min: Duration, max: Duration, rng: &mut impl Rng) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
    let ceiling = min.saturating_mul(factor).min(max);
    if ceiling <= min {
        return ceiling;
    }
    let span = (ceiling - min).as_millis() as u64;
    min + Duration::from_millis(rng.gen_range(0..=span))
}
