// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock queue nodes
//!
//! Each waiter on a lock path owns one ephemeral sequential child named
//! `READ-<seq>` or `WRITE-<seq>`. The queue is the children sorted by
//! sequence number.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Shared (read) or exclusive (write) access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    Read,
    Write,
}

impl LockType {
    pub fn as_str(self) -> &'static str {
        match self {
            LockType::Read => "READ",
            LockType::Write => "WRITE",
        }
    }

    /// Name prefix for queue nodes of this type, e.g. `WRITE-`
    pub fn node_prefix(self) -> String {
        format!("{}-", self.as_str())
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed queue node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockNode {
    pub name: String,
    pub lock_type: LockType,
    pub sequence: u64,
    pub is_self: bool,
}

impl LockNode {
    /// Parse a child name; `None` for names that are not queue nodes.
    ///
    /// `self_id` is the name of the caller's own node, if created.
    pub fn parse(name: &str, self_id: Option<&str>) -> Option<Self> {
        let lock_type = if name.starts_with("READ-") {
            LockType::Read
        } else if name.starts_with("WRITE-") {
            LockType::Write
        } else {
            return None;
        };

        let (_, digits) = name.rsplit_once('-')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let sequence = digits.parse().ok()?;

        Some(Self {
            name: name.to_string(),
            lock_type,
            sequence,
            is_self: self_id == Some(name),
        })
    }
}

impl Ord for LockNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for LockNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parse and sort a child listing into the lock queue; foreign names are skipped
pub fn lock_queue(children: &[String], self_id: Option<&str>) -> Vec<LockNode> {
    let mut queue: Vec<LockNode> = children
        .iter()
        .filter_map(|name| LockNode::parse(name, self_id))
        .collect();
    queue.sort();
    queue
}

/// The node the caller must wait on, if any.
///
/// A reader waits on the closest writer ahead of it. A writer waits on the
/// node immediately ahead of it, whatever its type.
pub fn find_blocking(queue: &[LockNode]) -> Option<&LockNode> {
    let mut previous = None;
    let mut previous_write = None;

    for node in queue {
        if node.is_self {
            return match node.lock_type {
                LockType::Read => previous_write,
                LockType::Write => previous,
            };
        }
        previous = Some(node);
        if node.lock_type == LockType::Write {
            previous_write = Some(node);
        }
    }
    previous
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
