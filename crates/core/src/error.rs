// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared by every primitive

use crate::client::ResultCode;
use crate::config::ConfigError;
use crate::signal::Interrupted;
use thiserror::Error;

/// Failure raised by sessions, primitives and locks.
///
/// Cloneable because a primitive's kill cause is handed to every waiter and
/// every death listener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("coordination service error: {0}")]
    Coordination(ResultCode),
    #[error("blocking wait was interrupted")]
    Interrupted,
    #[error("lock is already waiting to be acquired")]
    AlreadyWaiting,
    #[error("lock was already abandoned")]
    AlreadyAbandoned,
    #[error("lock is already acquired")]
    AlreadyAcquired,
    #[error("lock was already released")]
    AlreadyReleased,
    #[error("lock released while waiting to be acquired")]
    ReleasedWhileWaiting,
    #[error("gave up after {attempts} acquire attempts")]
    MaxAttemptsExceeded { attempts: u32 },
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("could not connect after {attempts} attempts: {reason}")]
    Connect { attempts: u32, reason: String },
    #[error("session is shut down")]
    SessionShutdown,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Flat error taxonomy, one entry per failure family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Coordination,
    Interrupted,
    LockAlreadyWaiting,
    LockAlreadyAbandoned,
    LockAlreadyAcquired,
    LockAlreadyReleased,
    LockReleasedWhileWaiting,
    MaxAttemptsExceeded,
    Unknown,
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::Coordination(_) | LockError::Connect { .. } => ErrorKind::Coordination,
            LockError::Interrupted => ErrorKind::Interrupted,
            LockError::AlreadyWaiting => ErrorKind::LockAlreadyWaiting,
            LockError::AlreadyAbandoned => ErrorKind::LockAlreadyAbandoned,
            LockError::AlreadyAcquired => ErrorKind::LockAlreadyAcquired,
            LockError::AlreadyReleased => ErrorKind::LockAlreadyReleased,
            LockError::ReleasedWhileWaiting => ErrorKind::LockReleasedWhileWaiting,
            LockError::MaxAttemptsExceeded { .. } => ErrorKind::MaxAttemptsExceeded,
            LockError::InvalidPath { .. }
            | LockError::SessionShutdown
            | LockError::Config(_)
            | LockError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Result code carried by a coordination failure
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            LockError::Coordination(code) => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        LockError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ResultCode> for LockError {
    fn from(code: ResultCode) -> Self {
        LockError::Coordination(code)
    }
}

impl From<Interrupted> for LockError {
    fn from(_: Interrupted) -> Self {
        LockError::Interrupted
    }
}

impl From<ConfigError> for LockError {
    fn from(err: ConfigError) -> Self {
        LockError::Config(err.to_string())
    }
}
