// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reset event specs
//!
//! Verify hand-off between signalling and waiting threads.

use crate::prelude::*;
use crate::prelude::assert_eq;
use std::sync::mpsc;

#[test]
fn auto_reset_releases_one_waiter_per_signal() {
    let event = Arc::new(AutoResetEvent::new(false));
    let (tx, rx) = mpsc::channel();

    let waiters: Vec<_> = (0..3)
        .map(|id| {
            let event = Arc::clone(&event);
            let tx = tx.clone();
            thread::spawn(move || {
                event.wait_one().unwrap();
                tx.send(id).unwrap();
            })
        })
        .collect();

    for released in 1..=3 {
        // Wait for the previous hand-off before signalling again
        while event.is_signaled() {
            thread::sleep(Duration::from_millis(1));
        }
        event.signal();
        rx.recv_timeout(WAIT).unwrap();
        assert!(rx.try_recv().is_err(), "more than {released} released");
    }
    for waiter in waiters {
        waiter.join().unwrap();
    }
}

#[test]
fn auto_reset_signals_do_not_accumulate() {
    let event = AutoResetEvent::new(false);
    event.signal();
    event.signal();

    assert!(event.wait_one_timeout(Duration::ZERO).unwrap());
    assert!(!event.wait_one_timeout(Duration::from_millis(10)).unwrap());
}

#[test]
fn manual_reset_releases_every_waiter_until_reset() {
    let event = Arc::new(ManualResetEvent::new(false));

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait_one_timeout(WAIT))
        })
        .collect();
    event.signal();
    for waiter in waiters {
        assert!(waiter.join().unwrap().unwrap());
    }

    assert!(event.wait_one_timeout(Duration::ZERO).unwrap());
    event.reset();
    assert!(!event.wait_one_timeout(Duration::from_millis(10)).unwrap());
}

#[test]
fn interrupt_wakes_blocked_waiter() {
    let event = Arc::new(ManualResetEvent::new(false));
    let waiter = {
        let event = Arc::clone(&event);
        thread::spawn(move || event.wait_one())
    };

    while !waiter.is_finished() {
        event.interrupt();
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(waiter.join().unwrap(), Err(Interrupted));
}
