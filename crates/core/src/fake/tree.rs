// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node tree and watch bookkeeping behind the fake service

use crate::client::{
    parent_path, CreateMode, EventType, NodeStat, ResultCode, WatchedEvent, Watcher,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A watch that fired: owning session, watcher, event
pub(crate) type Notification = (u64, Arc<dyn Watcher>, WatchedEvent);

struct Node {
    data: Vec<u8>,
    version: i32,
    /// Zero for persistent nodes
    ephemeral_owner: u64,
    next_sequence: u64,
}

impl Node {
    fn new(data: Vec<u8>, ephemeral_owner: u64) -> Self {
        Self {
            data,
            version: 0,
            ephemeral_owner,
            next_sequence: 0,
        }
    }
}

struct Watch {
    session: u64,
    watcher: Arc<dyn Watcher>,
}

/// One-shot watches keyed by path
#[derive(Default)]
struct WatchTable(HashMap<String, Vec<Watch>>);

impl WatchTable {
    fn add(&mut self, path: &str, session: u64, watcher: Arc<dyn Watcher>) {
        let watches = self.0.entry(path.to_string()).or_default();
        if !watches.iter().any(|w| Arc::ptr_eq(&w.watcher, &watcher)) {
            watches.push(Watch { session, watcher });
        }
    }

    fn fire(&mut self, path: &str, event_type: EventType, fired: &mut Vec<Notification>) {
        for watch in self.0.remove(path).unwrap_or_default() {
            fired.push((watch.session, watch.watcher, WatchedEvent::node(event_type, path)));
        }
    }

    fn drain_session(&mut self, session: u64, dropped: &mut Vec<Arc<dyn Watcher>>) {
        for watches in self.0.values_mut() {
            watches.retain(|w| {
                if w.session == session {
                    dropped.push(Arc::clone(&w.watcher));
                    false
                } else {
                    true
                }
            });
        }
        self.0.retain(|_, watches| !watches.is_empty());
    }
}

pub(crate) struct Tree {
    nodes: BTreeMap<String, Node>,
    exist_watches: WatchTable,
    child_watches: WatchTable,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), 0));
        Self {
            nodes,
            exist_watches: WatchTable::default(),
            child_watches: WatchTable::default(),
        }
    }

    fn child_names(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .map(|(p, _)| &p[prefix.len()..])
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub(crate) fn stat(&self, path: &str) -> Option<NodeStat> {
        let node = self.nodes.get(path)?;
        Some(NodeStat {
            version: node.version,
            num_children: self.child_names(path).len(),
            ephemeral_owner: node.ephemeral_owner,
        })
    }

    pub(crate) fn data(&self, path: &str) -> Option<&[u8]> {
        self.nodes.get(path).map(|n| n.data.as_slice())
    }

    /// Child names in lexicographic order
    pub(crate) fn children(&self, path: &str) -> Option<Vec<String>> {
        self.nodes.contains_key(path).then(|| self.child_names(path))
    }

    /// Create a node, returning the actual path (with sequence suffix)
    pub(crate) fn create(
        &mut self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        owner: u64,
        fired: &mut Vec<Notification>,
    ) -> Result<String, ResultCode> {
        if !path.starts_with('/') || path == "/" {
            return Err(ResultCode::BadArguments);
        }
        let parent = parent_path(path).to_string();
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return Err(ResultCode::NoNode);
        };
        if parent_node.ephemeral_owner != 0 {
            return Err(ResultCode::NoChildrenForEphemerals);
        }

        let actual = if mode.is_sequential() {
            let sequence = parent_node.next_sequence;
            parent_node.next_sequence += 1;
            format!("{path}{sequence:010}")
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(ResultCode::NodeExists);
        }

        let ephemeral_owner = if mode.is_ephemeral() { owner } else { 0 };
        self.nodes
            .insert(actual.clone(), Node::new(data, ephemeral_owner));
        self.exist_watches
            .fire(&actual, EventType::NodeCreated, fired);
        self.child_watches
            .fire(&parent, EventType::NodeChildrenChanged, fired);
        Ok(actual)
    }

    pub(crate) fn delete(
        &mut self,
        path: &str,
        version: Option<i32>,
        fired: &mut Vec<Notification>,
    ) -> Result<(), ResultCode> {
        if path == "/" {
            return Err(ResultCode::BadArguments);
        }
        let Some(node) = self.nodes.get(path) else {
            return Err(ResultCode::NoNode);
        };
        if version.is_some_and(|v| v != node.version) {
            return Err(ResultCode::BadArguments);
        }
        if !self.child_names(path).is_empty() {
            return Err(ResultCode::NotEmpty);
        }

        self.nodes.remove(path);
        self.exist_watches.fire(path, EventType::NodeDeleted, fired);
        self.child_watches.fire(path, EventType::NodeDeleted, fired);
        self.child_watches
            .fire(parent_path(path), EventType::NodeChildrenChanged, fired);
        Ok(())
    }

    pub(crate) fn watch_exists(&mut self, path: &str, session: u64, watcher: Arc<dyn Watcher>) {
        self.exist_watches.add(path, session, watcher);
    }

    pub(crate) fn watch_children(&mut self, path: &str, session: u64, watcher: Arc<dyn Watcher>) {
        self.child_watches.add(path, session, watcher);
    }

    /// Drop everything a session owns: its ephemeral nodes and its watches.
    ///
    /// Returns the session's own outstanding watchers.
    pub(crate) fn remove_session(
        &mut self,
        session: u64,
        fired: &mut Vec<Notification>,
    ) -> Vec<Arc<dyn Watcher>> {
        let mut dropped = Vec::new();
        self.exist_watches.drain_session(session, &mut dropped);
        self.child_watches.drain_session(session, &mut dropped);

        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == session)
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            // Ephemerals are leaves, so this only fails if already gone
            let _ = self.delete(&path, None, fired);
        }
        dropped
    }

    /// Paths of every node below the root, for debugging failed tests
    pub(crate) fn dump(&self) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|p| p.as_str() != "/")
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
