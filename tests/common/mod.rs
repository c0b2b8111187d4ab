//! Common test utilities and helpers
//!
//! Shared fixtures for integration tests: throwaway chroot-like trees and
//! fake mount tables.

// Each integration test binary compiles its own copy; not all of them use
// every helper.
#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

/// Targets of the fixed mount set, relative to the chroot root.
pub const MOUNT_TARGETS: &[&str] = &[
    "dev",
    "dev/pts",
    "proc",
    "sys",
    "sys/kernel/security",
    "sys/fs/cgroup",
    "run",
    "tmp",
    "var/lib/apt/lists",
    "var/cache/apt",
];

/// A throwaway chroot-like directory tree.
pub struct TestChroot {
    /// Temporary directory backing the tree
    pub dir: TempDir,
}

impl TestChroot {
    /// Create an empty test chroot.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Canonical path of the tree (what the engine resolves to).
    pub fn path(&self) -> PathBuf {
        self.dir
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp directory")
    }

    /// Create a file in the tree.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the tree.
    pub fn create_dir(&self, name: &str) {
        std::fs::create_dir_all(self.dir.path().join(name)).expect("Failed to create directory");
    }

    /// Check if a path exists in the tree.
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the tree.
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write a fake mount table that lists every required mount target of
    /// this tree as already mounted, and return its path.
    ///
    /// An engine reading this table treats the whole mount set as
    /// pre-existing and neither mounts nor unmounts anything.
    pub fn fake_full_mount_table(&self) -> PathBuf {
        let root = self.path();
        let table: String = MOUNT_TARGETS
            .iter()
            .map(|target| {
                format!(
                    "none {} somefs rw,relatime 0 0\n",
                    root.join(target).display()
                )
            })
            .collect();
        let table_path = self.dir.path().join("fake-mount-table");
        std::fs::write(&table_path, table).expect("Failed to write fake mount table");
        table_path
    }
}

impl Default for TestChroot {
    fn default() -> Self {
        Self::new()
    }
}
