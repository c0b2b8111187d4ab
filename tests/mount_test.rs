//! Integration tests for mount environment acquisition
//!
//! Creating real mounts needs privileges; acquisition against a mount
//! table where everything is already mounted, and the fail-fast path for
//! invalid trees, are fully testable without them.

mod common;

use chimg::error::MountError;
use chimg::infra::mount::{MountManager, CHROOT_MOUNTS};
use common::TestChroot;

#[test]
fn acquire_detects_caller_established_mounts() {
    let chroot = TestChroot::new();
    let table = chroot.fake_full_mount_table();
    let manager = MountManager::with_table_path(table);

    let mounts = manager.acquire(&chroot.path()).unwrap();
    assert_eq!(mounts.len(), CHROOT_MOUNTS.len());
    assert!(mounts.iter().all(|m| m.pre_existing));
}

#[test]
fn acquire_release_leaves_caller_mounts_untouched() {
    // With every mount pre-existing, acquire+release must not run a
    // single mount/umount command; the mount set is exactly what the
    // caller left.
    let chroot = TestChroot::new();
    let table = chroot.fake_full_mount_table();
    let manager = MountManager::with_table_path(table);

    let mut mounts = manager.acquire(&chroot.path()).unwrap();
    manager.release(&mut mounts).unwrap();
    assert!(mounts.is_empty());
}

#[test]
fn acquire_fails_fast_when_a_target_is_missing() {
    // An empty mount table plus a tree without /dev: the very first spec
    // already fails, before any mount is attempted.
    let chroot = TestChroot::new();
    chroot.create_file("empty-table", "");
    let manager = MountManager::with_table_path(chroot.path().join("empty-table"));

    let err = manager.acquire(&chroot.path()).unwrap_err();
    match err {
        MountError::TargetMissing { target } => {
            assert_eq!(target, chroot.path().join("dev"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn acquire_reports_unreadable_mount_table() {
    let chroot = TestChroot::new();
    let manager = MountManager::with_table_path("/nonexistent/mount-table");
    let err = manager.acquire(&chroot.path()).unwrap_err();
    assert!(matches!(err, MountError::TableRead { .. }));
}

#[test]
fn partially_present_mounts_are_detected_individually() {
    // Only /dev and /proc are caller-mounted; the next absent target
    // (/dev/pts) has no directory, so acquisition fails fast rather than
    // touching the caller's mounts.
    let chroot = TestChroot::new();
    let root = chroot.path();
    let table = format!(
        "dev-live {} devtmpfs rw 0 0\nproc-live {} proc rw 0 0\n",
        root.join("dev").display(),
        root.join("proc").display()
    );
    chroot.create_file("partial-table", &table);
    let manager = MountManager::with_table_path(root.join("partial-table"));

    let err = manager.acquire(&root).unwrap_err();
    match err {
        MountError::TargetMissing { target } => {
            assert_eq!(target, root.join("dev/pts"));
        }
        other => panic!("unexpected error {other}"),
    }
}
