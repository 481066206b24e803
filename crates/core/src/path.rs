// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ensures a node path exists, creating missing ancestors as needed
//!
//! The creator walks an index over the path's segments. It tries to create
//! the prefix at the current depth: an existing or freshly created prefix
//! moves the index forward, a missing parent moves it back. The primitive
//! synchronizes once the full path exists.

use crate::client::{CreateMode, ResultCode};
use crate::error::LockError;
use crate::primitive::{PrimitiveCore, SyncPrimitive};
use crate::session::Session;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

const ACCEPTABLE: [ResultCode; 3] = [ResultCode::Ok, ResultCode::NodeExists, ResultCode::NoNode];

/// Check that `path` is an absolute, normalized node path
pub fn validate_path(path: &str) -> Result<(), LockError> {
    if path.is_empty() {
        return Err(LockError::invalid_path(path, "path must not be empty"));
    }
    if !path.starts_with('/') {
        return Err(LockError::invalid_path(path, "path must start with '/'"));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(LockError::invalid_path(path, "path must not end with '/'"));
    }
    if path.chars().any(|c| c == '\0' || c.is_control()) {
        return Err(LockError::invalid_path(path, "path contains control characters"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(LockError::invalid_path(path, "empty path segment")),
            "." | ".." => {
                return Err(LockError::invalid_path(path, "relative path segment"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Options for [`PathCreator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCreatorConfig {
    /// Mode for the final node; ancestors are always persistent
    pub mode: CreateMode,
    pub resurrect_after_expiry: bool,
}

impl Default for PathCreatorConfig {
    fn default() -> Self {
        Self {
            mode: CreateMode::Persistent,
            resurrect_after_expiry: false,
        }
    }
}

impl PathCreatorConfig {
    pub fn with_mode(mut self, mode: CreateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_resurrection(mut self, resurrect: bool) -> Self {
        self.resurrect_after_expiry = resurrect;
        self
    }
}

/// Primitive that synchronizes once a path exists
pub struct PathCreator {
    core: PrimitiveCore,
    target: String,
    segments: Vec<String>,
    config: PathCreatorConfig,
    /// Number of leading segments currently being created
    depth: Mutex<usize>,
    this: Weak<PathCreator>,
}

impl PathCreator {
    /// Validate `path` and start creating it
    pub fn start(
        session: &Arc<Session>,
        path: &str,
        config: PathCreatorConfig,
    ) -> Result<Arc<Self>, LockError> {
        validate_path(path)?;
        let client = session.live_client()?;
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let creator = Arc::new_cyclic(|this: &Weak<PathCreator>| {
            let owner: Weak<dyn SyncPrimitive> = this.clone();
            PathCreator {
                core: PrimitiveCore::new(Arc::clone(session), client, owner),
                target: path.to_string(),
                depth: Mutex::new(segments.len()),
                segments,
                config,
                this: this.clone(),
            }
        });

        debug!(path, "ensuring path exists");
        creator.attempt();
        Ok(creator)
    }

    pub fn target_path(&self) -> &str {
        &self.target
    }

    pub fn wait_synchronized(&self) -> Result<(), LockError> {
        self.core.wait_synchronized()
    }

    fn prefix(&self, depth: usize) -> String {
        format!("/{}", self.segments[..depth].join("/"))
    }

    fn depth(&self) -> usize {
        *self.depth.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_depth(&self, depth: usize) {
        *self.depth.lock().unwrap_or_else(|e| e.into_inner()) = depth;
    }

    /// Try to create the prefix at the current depth
    fn attempt(&self) {
        let depth = self.depth();
        if depth == 0 {
            // The root always exists
            self.advance(depth);
            return;
        }
        let Some(creator) = self.this.upgrade() else {
            return;
        };

        let path = self.prefix(depth);
        let mode = if depth == self.segments.len() {
            self.config.mode
        } else {
            CreateMode::Persistent
        };
        self.core.client().create(
            &path,
            Vec::new(),
            mode,
            Box::new(move |code, _| creator.on_created(depth, code)),
        );
    }

    fn on_created(&self, depth: usize, code: ResultCode) {
        let this = self.this.clone();
        let retry = move || {
            if let Some(creator) = this.upgrade() {
                creator.attempt();
            }
        };
        if !self.core.pass_or_try_repeat(code, &ACCEPTABLE, retry) {
            return;
        }

        if code == ResultCode::NoNode {
            if depth <= 1 {
                // Only the root can be missing above a first-level node
                self.core.die(LockError::Coordination(code));
                return;
            }
            self.set_depth(depth - 1);
            self.attempt();
        } else {
            self.advance(depth);
        }
    }

    fn advance(&self, depth: usize) {
        if depth >= self.segments.len() {
            debug!(path = %self.target, "path exists");
            self.core.on_state_updated();
            return;
        }
        self.set_depth(depth + 1);
        self.attempt();
    }
}

impl SyncPrimitive for PathCreator {
    fn core(&self) -> &PrimitiveCore {
        &self.core
    }

    fn resynchronize(self: Arc<Self>) {
        debug!(path = %self.target, "re-creating path on new session");
        self.set_depth(self.segments.len());
        self.attempt();
    }

    fn should_resurrect_after_session_expiry(&self) -> bool {
        self.config.resurrect_after_expiry
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
