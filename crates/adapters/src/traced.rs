// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced coordination wrappers for consistent observability

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Span;
use treelock_core::client::{ChildrenCallback, CreateCallback, StatCallback, VoidCallback};
use treelock_core::{
    ConnectError, Connector, CoordinationClient, CreateMode, ResultCode, WatchedEvent, Watcher,
};

/// Log the outcome of one operation inside its span
fn log_outcome(span: &Span, code: ResultCode, elapsed: Duration) {
    let _guard = span.enter();
    let elapsed_ms = elapsed.as_millis() as u64;
    match code {
        ResultCode::Ok => tracing::debug!(elapsed_ms, "completed"),
        // Routine answers the primitives branch on
        ResultCode::NoNode | ResultCode::NodeExists | ResultCode::NotEmpty => {
            tracing::debug!(elapsed_ms, %code, "completed")
        }
        ResultCode::ConnectionLoss | ResultCode::OperationTimeout | ResultCode::SessionMoved => {
            tracing::warn!(elapsed_ms, %code, "failed (will retry)")
        }
        _ => tracing::error!(elapsed_ms, %code, "failed"),
    }
}

/// Wrapper that adds tracing to any CoordinationClient
#[derive(Clone)]
pub struct TracedClient<C> {
    inner: C,
}

impl<C> TracedClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: CoordinationClient> CoordinationClient for TracedClient<C> {
    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode, callback: CreateCallback) {
        let span = tracing::info_span!(
            "coordination.create",
            session_id = self.inner.session_id(),
            path,
            ?mode
        );
        {
            let _guard = span.enter();
            tracing::debug!(data_len = data.len(), "starting");
        }

        let start = Instant::now();
        self.inner.create(
            path,
            data,
            mode,
            Box::new(move |code, created| {
                log_outcome(&span, code, start.elapsed());
                if let Some(created) = &created {
                    let _guard = span.enter();
                    tracing::info!(created, "node created");
                }
                callback(code, created)
            }),
        );
    }

    fn delete(&self, path: &str, version: Option<i32>, callback: VoidCallback) {
        let span = tracing::info_span!(
            "coordination.delete",
            session_id = self.inner.session_id(),
            path,
            ?version
        );

        let start = Instant::now();
        self.inner.delete(
            path,
            version,
            Box::new(move |code| {
                log_outcome(&span, code, start.elapsed());
                callback(code)
            }),
        );
    }

    fn exists(&self, path: &str, watcher: Option<Arc<dyn Watcher>>, callback: StatCallback) {
        let span = tracing::info_span!(
            "coordination.exists",
            session_id = self.inner.session_id(),
            path,
            watch = watcher.is_some()
        );

        let start = Instant::now();
        self.inner.exists(
            path,
            watcher,
            Box::new(move |code, stat| {
                log_outcome(&span, code, start.elapsed());
                callback(code, stat)
            }),
        );
    }

    fn get_children(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
        callback: ChildrenCallback,
    ) {
        let span = tracing::info_span!(
            "coordination.get_children",
            session_id = self.inner.session_id(),
            path,
            watch = watcher.is_some()
        );

        let start = Instant::now();
        self.inner.get_children(
            path,
            watcher,
            Box::new(move |code, children| {
                log_outcome(&span, code, start.elapsed());
                {
                    let _guard = span.enter();
                    tracing::trace!(count = children.len(), "listed");
                }
                callback(code, children)
            }),
        );
    }

    fn session_id(&self) -> u64 {
        self.inner.session_id()
    }

    fn close(&self) {
        let span = tracing::info_span!("coordination.close", session_id = self.inner.session_id());
        let _guard = span.enter();
        self.inner.close();
        tracing::info!("closed");
    }
}

/// Watcher that logs every event before forwarding it
pub struct TracedWatcher {
    inner: Arc<dyn Watcher>,
}

impl TracedWatcher {
    pub fn new(inner: Arc<dyn Watcher>) -> Self {
        Self { inner }
    }
}

impl Watcher for TracedWatcher {
    fn process(&self, event: WatchedEvent) {
        tracing::debug!(
            event_type = ?event.event_type,
            state = ?event.state,
            path = event.path.as_deref(),
            "watch event"
        );
        self.inner.process(event);
    }
}

/// Wrapper that adds tracing to any Connector.
///
/// Clients it opens are wrapped in [`TracedClient`] and the session watcher
/// in [`TracedWatcher`].
#[derive(Clone)]
pub struct TracedConnector<C> {
    inner: C,
}

impl<C> TracedConnector<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Connector> Connector for TracedConnector<C> {
    fn connect(
        &self,
        connect_string: &str,
        session_timeout: Duration,
        watcher: Arc<dyn Watcher>,
    ) -> Result<Arc<dyn CoordinationClient>, ConnectError> {
        let span = tracing::info_span!("coordination.connect", connect_string);
        let _guard = span.enter();

        tracing::info!(
            session_timeout_ms = session_timeout.as_millis() as u64,
            "connecting"
        );
        let start = Instant::now();
        let result = self.inner.connect(
            connect_string,
            session_timeout,
            Arc::new(TracedWatcher::new(watcher)),
        );
        let elapsed = start.elapsed();

        match result {
            Ok(client) => {
                tracing::info!(
                    session_id = client.session_id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "client opened"
                );
                Ok(Arc::new(TracedClient::new(client)))
            }
            Err(e) => {
                tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "connect failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
