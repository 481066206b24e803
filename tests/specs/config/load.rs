// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration specs
//!
//! Verify that a session can be configured from a TOML file.

use crate::prelude::*;
use crate::prelude::assert_eq;
use std::fs;

#[test]
fn session_runs_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("treelock.toml");
    fs::write(
        &path,
        r#"
connect_string = "fake:2181"
max_connect_attempts = 2
retry_workers = 1

[connect_backoff]
initial_delay = "1ms"
max_delay = "5ms"

[multi_lock]
min_retry_delay = "1ms"
max_retry_delay = "10ms"
max_attempts = 3
"#,
    )
    .unwrap();

    let config = SessionConfig::load(&path).unwrap();
    assert_eq!(config.multi_lock.max_attempts, 3);

    let cluster = Cluster::new();
    cluster.service.refuse_connects(1);
    let session = cluster.service.connect_session_with(config).unwrap();

    let mut lock = MultiPathLock::new(&session);
    lock.add_write_lock("/cfg/a").unwrap();
    lock.add_write_lock("/cfg/b").unwrap();
    lock.acquire().unwrap();
    assert_eq!(lock.state(), LockState::Acquired);
}

#[test]
fn invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("treelock.toml");
    fs::write(&path, "connect_string = \"\"\n").unwrap();

    assert!(matches!(
        SessionConfig::load(&path),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        SessionConfig::load(&dir.path().join("missing.toml")),
        Err(ConfigError::Io { .. })
    ));
}
