// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager
//!
//! Owns the connection to the coordination service and tracks primitives
//! whose work must be restarted after a reconnect or resurrected on a new
//! session. Connection-state transitions are serialized through one lock
//! over the pending sets.
//!
//! ## Retry scheduling
//!
//! Delayed retries run on a dedicated tokio runtime owned by the session.
//! Shutting the session down stops the runtime, so pending retries never
//! fire against a closed client.

use crate::backoff::{retry_delay, ConnectDelays};
use crate::client::{
    Connector, CoordinationClient, EventType, KeeperState, ResultCode, WatchedEvent, Watcher,
};
use crate::config::SessionConfig;
use crate::error::LockError;
use crate::primitive::{Operation, SyncPrimitive};
use crate::signal::{ManualResetEvent, ResetEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, error, info, warn};

/// Connection state as last reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
    Expired,
    Shutdown,
}

#[derive(Default)]
struct PendingPrimitives {
    /// Parked an operation on connection loss; replayed on reconnect
    restart: HashMap<u64, Weak<dyn SyncPrimitive>>,
    /// Survived an expiry; resynchronized once a new session connects
    resurrect: HashMap<u64, Weak<dyn SyncPrimitive>>,
}

/// A connection to the coordination service shared by all primitives
pub struct Session {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    this: Weak<Session>,
    /// Held across `connect` so a Connected event sees the new client
    client: Mutex<Option<Arc<dyn CoordinationClient>>>,
    state: Mutex<SessionState>,
    connected: ManualResetEvent,
    shutdown: Arc<AtomicBool>,
    pending: Mutex<PendingPrimitives>,
    retry_runtime: Mutex<Option<Runtime>>,
    retry_handle: Handle,
}

impl Session {
    /// Connect and block until the service reports the session connected
    pub fn initialize(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Arc<Self>, LockError> {
        config.validate()?;

        let workers = config.retry_workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("treelock-retry")
            .enable_time()
            .build()
            .map_err(|e| LockError::Unknown(format!("failed to start retry workers: {e}")))?;
        let retry_handle = runtime.handle().clone();

        let session = Arc::new_cyclic(|this| Session {
            config,
            connector,
            this: this.clone(),
            client: Mutex::new(None),
            state: Mutex::new(SessionState::Connecting),
            connected: ManualResetEvent::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            pending: Mutex::new(PendingPrimitives::default()),
            retry_runtime: Mutex::new(Some(runtime)),
            retry_handle,
        });

        info!(
            connect_string = %session.config.connect_string,
            retry_workers = workers,
            "initializing session"
        );
        session.connect()?;
        session.connected.wait_one()?;
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *current != SessionState::Shutdown {
            *current = state;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Block until connected; `false` if `timeout` elapsed first
    pub fn wait_connected(&self, timeout: Duration) -> Result<bool, LockError> {
        Ok(self.connected.wait_one_timeout(timeout)?)
    }

    /// Current client handle
    pub fn client(&self) -> Option<Arc<dyn CoordinationClient>> {
        self.client.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Client for a new primitive; fails once the session is shut down
    pub(crate) fn live_client(&self) -> Result<Arc<dyn CoordinationClient>, LockError> {
        if self.is_shutdown() {
            return Err(LockError::SessionShutdown);
        }
        self.client().ok_or(LockError::SessionShutdown)
    }

    pub fn session_id(&self) -> Option<u64> {
        self.client().map(|c| c.session_id())
    }

    fn pending(&self) -> MutexGuard<'_, PendingPrimitives> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a new connection, backing off between failed attempts
    fn connect(&self) -> Result<(), LockError> {
        let mut delays = ConnectDelays::new(&self.config.connect_backoff);
        let mut attempts = 0;

        loop {
            if self.is_shutdown() {
                return Err(LockError::SessionShutdown);
            }
            self.set_state(SessionState::Connecting);

            let watcher: Arc<dyn Watcher> = Arc::new(SessionWatcher {
                session: self.this.clone(),
            });
            let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
            match self.connector.connect(
                &self.config.connect_string,
                self.config.session_timeout,
                watcher,
            ) {
                Ok(client) => {
                    debug!(session_id = client.session_id(), attempts = attempts + 1, "connection opened");
                    *slot = Some(client);
                    return Ok(());
                }
                Err(err) => {
                    drop(slot);
                    attempts += 1;
                    warn!(attempt = attempts, error = %err, "connection attempt failed");
                    if attempts >= self.config.max_connect_attempts {
                        return Err(LockError::Connect {
                            attempts,
                            reason: err.reason,
                        });
                    }
                    let delay = delays
                        .next()
                        .unwrap_or(self.config.connect_backoff.max_delay);
                    thread::sleep(delay);
                }
            }
        }
    }

    /// Handle a connection-state notification from the service
    pub fn notify(&self, event: WatchedEvent) {
        if event.event_type != EventType::None {
            return;
        }
        if self.is_shutdown() {
            debug!(state = ?event.state, "session shut down, ignoring event");
            return;
        }
        match event.state {
            KeeperState::Connected => self.on_connected(),
            KeeperState::Disconnected => self.on_disconnected(),
            KeeperState::Expired => self.on_expired(),
            state => debug!(?state, "ignoring connection state"),
        }
    }

    fn on_connected(&self) {
        let (resurrect, restart) = {
            let mut pending = self.pending();
            (
                std::mem::take(&mut pending.resurrect),
                std::mem::take(&mut pending.restart),
            )
        };
        let client = self.client();
        info!(
            session_id = client.as_ref().map(|c| c.session_id()),
            resurrect = resurrect.len(),
            restart = restart.len(),
            "session connected"
        );

        for primitive in resurrect.into_values().filter_map(|w| w.upgrade()) {
            if let Some(client) = &client {
                primitive.core().rebind(Arc::clone(client));
            }
            primitive.resynchronize();
        }
        for primitive in restart.into_values().filter_map(|w| w.upgrade()) {
            if let Some(operation) = primitive.core().take_retry_on_connect() {
                operation();
            }
        }

        self.set_state(SessionState::Connected);
        self.connected.signal();
    }

    fn on_disconnected(&self) {
        info!("session disconnected");
        self.connected.reset();
        self.set_state(SessionState::Disconnected);
    }

    fn on_expired(&self) {
        let doomed: Vec<Arc<dyn SyncPrimitive>> = {
            let mut pending = self.pending();
            let restart = std::mem::take(&mut pending.restart);
            let mut doomed = Vec::new();
            for (id, weak) in restart {
                let Some(primitive) = weak.upgrade() else {
                    continue;
                };
                if primitive.should_resurrect_after_session_expiry() {
                    pending.resurrect.insert(id, weak);
                } else {
                    doomed.push(primitive);
                }
            }
            doomed
        };

        warn!(killed = doomed.len(), "session expired, reconnecting");
        self.connected.reset();
        self.set_state(SessionState::Expired);

        for primitive in doomed {
            let core = primitive.core();
            core.take_retry_on_connect();
            core.die(LockError::Coordination(ResultCode::SessionExpired));
        }

        let Some(session) = self.this.upgrade() else {
            return;
        };
        self.retry_handle.spawn_blocking(move || {
            if let Err(e) = session.connect() {
                error!(error = %e, "failed to re-establish expired session");
            }
        });
    }

    /// Replay the primitive's parked operation on the next Connected event
    pub fn restart_primitive_when_connected(&self, primitive: &Arc<dyn SyncPrimitive>) {
        let id = primitive.core().id();
        self.pending().restart.insert(id, Arc::downgrade(primitive));
    }

    /// Resynchronize the primitive once a new session is established
    pub fn resurrect_primitive_when_new_session(&self, primitive: &Arc<dyn SyncPrimitive>) {
        let id = primitive.core().id();
        self.pending().resurrect.insert(id, Arc::downgrade(primitive));
    }

    /// Run `operation` after the delay for retry number `attempt`
    pub fn retry_primitive_operation(&self, operation: Operation, attempt: u32) {
        if self.is_shutdown() {
            debug!("session shut down, dropping retry");
            return;
        }
        let delay = retry_delay(&self.config.retry, attempt);
        let shutdown = Arc::clone(&self.shutdown);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
        self.retry_handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !shutdown.load(Ordering::SeqCst) {
                operation();
            }
        });
    }

    /// Close the connection and stop the retry workers. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down session");
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SessionState::Shutdown;

        if let Some(client) = self.client() {
            client.close();
        }
        {
            let mut pending = self.pending();
            pending.restart.clear();
            pending.resurrect.clear();
        }
        if let Some(runtime) = self
            .retry_runtime
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            runtime.shutdown_background();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forwards connection-state events to the session
struct SessionWatcher {
    session: Weak<Session>,
}

impl Watcher for SessionWatcher {
    fn process(&self, event: WatchedEvent) {
        if let Some(session) = self.session.upgrade() {
            session.notify(event);
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
