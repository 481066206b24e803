// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

struct Noop;

impl Watcher for Noop {
    fn process(&self, _event: WatchedEvent) {}
}

fn watcher() -> Arc<dyn Watcher> {
    Arc::new(Noop)
}

fn create(tree: &mut Tree, path: &str, mode: CreateMode, owner: u64) -> Result<String, ResultCode> {
    tree.create(path, Vec::new(), mode, owner, &mut Vec::new())
}

fn events(fired: &[Notification]) -> Vec<(u64, EventType, String)> {
    fired
        .iter()
        .map(|(session, _, event)| {
            (
                *session,
                event.event_type,
                event.path.clone().unwrap_or_default(),
            )
        })
        .collect()
}

#[test]
fn root_exists_and_is_hidden_from_dump() {
    let tree = Tree::new();
    assert!(tree.contains("/"));
    assert!(tree.dump().is_empty());
    assert_eq!(tree.children("/"), Some(vec![]));
}

#[parameterized(
    root = { "/", ResultCode::BadArguments },
    relative = { "a", ResultCode::BadArguments },
    missing_parent = { "/a/b", ResultCode::NoNode },
)]
fn create_rejects(path: &str, expected: ResultCode) {
    let mut tree = Tree::new();
    assert_eq!(create(&mut tree, path, CreateMode::Persistent, 0), Err(expected));
}

#[test]
fn create_rejects_duplicates_and_ephemeral_parents() {
    let mut tree = Tree::new();
    create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();
    create(&mut tree, "/e", CreateMode::Ephemeral, 7).unwrap();

    assert_eq!(
        create(&mut tree, "/a", CreateMode::Persistent, 0),
        Err(ResultCode::NodeExists)
    );
    assert_eq!(
        create(&mut tree, "/e/child", CreateMode::Persistent, 0),
        Err(ResultCode::NoChildrenForEphemerals)
    );
}

#[test]
fn sequential_names_count_per_parent() {
    let mut tree = Tree::new();
    create(&mut tree, "/l", CreateMode::Persistent, 0).unwrap();
    create(&mut tree, "/m", CreateMode::Persistent, 0).unwrap();

    let first = create(&mut tree, "/l/WRITE-", CreateMode::EphemeralSequential, 1).unwrap();
    let second = create(&mut tree, "/l/READ-", CreateMode::EphemeralSequential, 1).unwrap();
    let other = create(&mut tree, "/m/READ-", CreateMode::PersistentSequential, 0).unwrap();

    assert_eq!(first, "/l/WRITE-0000000000");
    assert_eq!(second, "/l/READ-0000000001");
    assert_eq!(other, "/m/READ-0000000000");
    assert_eq!(
        tree.children("/l"),
        Some(vec![
            "READ-0000000001".to_string(),
            "WRITE-0000000000".to_string()
        ])
    );
}

#[test]
fn stat_reports_children_and_owner() {
    let mut tree = Tree::new();
    create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();
    create(&mut tree, "/a/x", CreateMode::Ephemeral, 3).unwrap();
    create(&mut tree, "/ab", CreateMode::Persistent, 0).unwrap();

    let stat = tree.stat("/a").unwrap();
    assert_eq!(stat.num_children, 1);
    assert_eq!(stat.ephemeral_owner, 0);
    assert_eq!(tree.stat("/a/x").unwrap().ephemeral_owner, 3);
    assert_eq!(tree.stat("/missing"), None);
}

#[test]
fn create_fires_exists_and_child_watches_once() {
    let mut tree = Tree::new();
    create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();
    tree.watch_exists("/a/b", 1, watcher());
    tree.watch_children("/a", 2, watcher());

    let mut fired = Vec::new();
    tree.create("/a/b", Vec::new(), CreateMode::Persistent, 0, &mut fired)
        .unwrap();
    assert_eq!(
        events(&fired),
        vec![
            (1, EventType::NodeCreated, "/a/b".to_string()),
            (2, EventType::NodeChildrenChanged, "/a".to_string()),
        ]
    );

    // One-shot: nothing left to fire
    let mut fired = Vec::new();
    tree.create("/a/c", Vec::new(), CreateMode::Persistent, 0, &mut fired)
        .unwrap();
    assert!(fired.is_empty());
}

#[test]
fn same_watcher_registers_once_per_path() {
    let mut tree = Tree::new();
    let shared = watcher();
    tree.watch_exists("/a", 1, Arc::clone(&shared));
    tree.watch_exists("/a", 1, Arc::clone(&shared));

    let mut fired = Vec::new();
    tree.create("/a", Vec::new(), CreateMode::Persistent, 0, &mut fired)
        .unwrap();
    assert_eq!(fired.len(), 1);
}

#[test]
fn delete_fires_deleted_and_parent_child_watches() {
    let mut tree = Tree::new();
    create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();
    create(&mut tree, "/a/b", CreateMode::Persistent, 0).unwrap();
    tree.watch_exists("/a/b", 1, watcher());
    tree.watch_children("/a", 2, watcher());

    let mut fired = Vec::new();
    tree.delete("/a/b", None, &mut fired).unwrap();
    assert!(!tree.contains("/a/b"));
    assert_eq!(
        events(&fired),
        vec![
            (1, EventType::NodeDeleted, "/a/b".to_string()),
            (2, EventType::NodeChildrenChanged, "/a".to_string()),
        ]
    );
}

#[test]
fn delete_errors() {
    let mut tree = Tree::new();
    create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();
    create(&mut tree, "/a/b", CreateMode::Persistent, 0).unwrap();
    let mut fired = Vec::new();

    assert_eq!(tree.delete("/", None, &mut fired), Err(ResultCode::BadArguments));
    assert_eq!(tree.delete("/x", None, &mut fired), Err(ResultCode::NoNode));
    assert_eq!(tree.delete("/a", None, &mut fired), Err(ResultCode::NotEmpty));
    assert_eq!(
        tree.delete("/a/b", Some(4), &mut fired),
        Err(ResultCode::BadArguments)
    );
    assert_eq!(tree.delete("/a/b", Some(0), &mut fired), Ok(()));
    assert!(fired.is_empty());
}

#[test]
fn remove_session_drops_ephemerals_and_watches() {
    let mut tree = Tree::new();
    create(&mut tree, "/l", CreateMode::Persistent, 0).unwrap();
    create(&mut tree, "/l/WRITE-", CreateMode::EphemeralSequential, 1).unwrap();
    create(&mut tree, "/l/READ-", CreateMode::EphemeralSequential, 2).unwrap();
    tree.watch_exists("/l/READ-0000000001", 1, watcher());
    tree.watch_children("/l", 2, watcher());

    let mut fired = Vec::new();
    let dropped = tree.remove_session(1, &mut fired);

    assert_eq!(dropped.len(), 1);
    assert_eq!(tree.dump(), vec!["/l", "/l/READ-0000000001"]);
    assert_eq!(
        events(&fired),
        vec![(2, EventType::NodeChildrenChanged, "/l".to_string())]
    );
}

#[test]
fn data_is_stored() {
    let mut tree = Tree::new();
    tree.create("/a", b"hello".to_vec(), CreateMode::Persistent, 0, &mut Vec::new())
        .unwrap();
    assert_eq!(tree.data("/a"), Some(&b"hello"[..]));
    assert_eq!(tree.data("/b"), None);
}
