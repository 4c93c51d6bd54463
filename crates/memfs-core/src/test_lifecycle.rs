// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{FsError, MemFsConfig, MemMount, NodeId, NodeState, TreeChange};

fn mount_with_detached_file(name: &str) -> (MemMount, NodeId, NodeId) {
    let mut mount = MemMount::new(MemFsConfig::default()).unwrap();
    let root = mount.root();
    let file = mount.create_file(root, name).unwrap();
    mount.remove_child(root, file).unwrap();
    (mount, root, file)
}

#[test]
fn test_link_size_and_unlink_file_under_root() {
    let (mut mount, root, file) = mount_with_detached_file("a.txt");
    assert_eq!(mount.node(root).unwrap().use_count(), 0);
    assert_eq!(mount.node(root).unwrap().children(), None);

    assert_eq!(mount.add_child(root, file).unwrap(), TreeChange::Applied);
    mount.node_mut(file).unwrap().set_parent(Some(root));
    assert_eq!(mount.node(root).unwrap().children(), Some(&[file][..]));

    mount.realloc_data(file, 10).unwrap();
    assert_eq!(mount.node(file).unwrap().capacity(), 10);

    mount.node_mut(file).unwrap().set_len(10).unwrap();
    let stat = mount.stat(file).unwrap();
    assert_eq!(stat.st_size, 10);

    assert_eq!(mount.remove_child(root, file).unwrap(), TreeChange::Applied);
    assert_eq!(mount.node(root).unwrap().children(), None);
    assert_eq!(mount.node(file).unwrap().parent(), None);
}

#[test]
fn test_rmdir_succeeds_once_child_removed() {
    let mut mount = MemMount::new(MemFsConfig::default()).unwrap();
    let root = mount.root();
    let dir = mount.mkdir(root, "d").unwrap();
    let child = mount.create_file(dir, "c").unwrap();

    assert!(matches!(mount.node_mut(dir).unwrap().rmdir(), Err(FsError::DirectoryNotEmpty)));

    mount.remove_child(dir, child).unwrap();
    assert!(mount.node_mut(dir).unwrap().rmdir().is_ok());
    assert_eq!(mount.node(dir).unwrap().state(), NodeState::Unlinked);
}

#[test]
fn test_realloc_preserves_prefix_for_any_size() {
    let (mut mount, _root, file) = mount_with_detached_file("f");
    let content: Vec<u8> = (0..64u8).collect();
    for new_capacity in [0usize, 1, 17, 63, 64, 65, 200] {
        mount.ftruncate(file, 0).unwrap();
        mount.write(file, 0, &content).unwrap();

        mount.realloc_data(file, new_capacity).unwrap();
        let node = mount.node(file).unwrap();
        let kept = content.len().min(new_capacity);
        assert_eq!(node.capacity(), new_capacity);
        assert_eq!(node.data(), &content[..kept]);
        assert!(node.capacity() >= node.len());
    }
}

#[test]
fn test_add_then_remove_restores_directory() {
    let mut mount = MemMount::new(MemFsConfig::default()).unwrap();
    let root = mount.root();
    let dir = mount.mkdir(root, "d").unwrap();
    let existing = mount.create_file(dir, "keep").unwrap();

    for name in ["x", "y", "z"] {
        let child = mount.create_file(root, name).unwrap();
        mount.remove_child(root, child).unwrap();
        assert!(mount.add_child(dir, child).unwrap().applied());
        assert!(mount.remove_child(dir, child).unwrap().applied());

        let children = mount.node(dir).unwrap().children().unwrap();
        assert!(!children.contains(&child));
        assert_eq!(children, &[existing]);
        assert_ne!(mount.node(child).unwrap().parent(), Some(dir));
    }
}

#[test]
fn test_delete_while_open_keeps_content_until_last_close() {
    let mut mount = MemMount::new(MemFsConfig::default()).unwrap();
    let root = mount.root();
    let dir = mount.mkdir(root, "d").unwrap();
    let file = mount.create_file(dir, "log").unwrap();
    mount.open(file).unwrap();
    mount.write(file, 0, b"tail").unwrap();

    mount.unlink(file).unwrap();
    assert!(matches!(mount.lookup(dir, "log"), Err(FsError::NotFound)));
    // The directory is empty even though the file lives on
    mount.rmdir(dir).unwrap();
    assert!(!mount.contains(dir));

    mount.write(file, 4, b"!").unwrap();
    let mut buf = [0u8; 5];
    mount.read(file, 0, &mut buf).unwrap();
    assert_eq!(&buf, b"tail!");

    mount.close(file).unwrap();
    assert!(!mount.contains(file));
    assert_eq!(mount.stats().nodes, 1);
    assert_eq!(mount.stats().bytes_in_memory, 0);
}

#[test]
fn test_open_directory_survives_rmdir() {
    let mut mount = MemMount::new(MemFsConfig::default()).unwrap();
    let root = mount.root();
    let dir = mount.mkdir(root, "d").unwrap();
    mount.open(dir).unwrap();

    mount.rmdir(dir).unwrap();
    assert_eq!(mount.node(dir).unwrap().state(), NodeState::Unlinked);
    assert!(matches!(mount.create_file(dir, "late"), Err(FsError::NotFound)));

    mount.close(dir).unwrap();
    assert!(!mount.contains(dir));
}
