//! Execution context for a single run
//!
//! Holds the resolved chroot root and the live mount set. The context is
//! owned by the engine for the duration of one run, handed to handlers by
//! reference, and never persisted across runs.

use std::path::{Path, PathBuf};

use crate::error::MountError;
use crate::infra::mount::MountPoint;

/// The resolved chroot root plus the live mount set of one run.
#[derive(Debug)]
pub struct ExecutionContext {
    chroot_path: PathBuf,
    mounts: Vec<MountPoint>,
}

impl ExecutionContext {
    /// Resolve a chroot directory to its canonical absolute path.
    ///
    /// The directory must already exist: chimg never creates the chroot
    /// tree itself.
    pub fn resolve(chroot_path: &Path) -> Result<PathBuf, MountError> {
        let resolved = chroot_path
            .canonicalize()
            .map_err(|_| MountError::RootMissing {
                path: chroot_path.to_path_buf(),
            })?;
        if !resolved.is_dir() {
            return Err(MountError::RootMissing { path: resolved });
        }
        Ok(resolved)
    }

    /// Build a context from a resolved root and an acquired mount set.
    pub fn new(chroot_path: PathBuf, mounts: Vec<MountPoint>) -> Self {
        Self {
            chroot_path,
            mounts,
        }
    }

    /// The canonical chroot root.
    pub fn chroot_path(&self) -> &Path {
        &self.chroot_path
    }

    /// The live mount set, in creation order.
    pub fn mounts(&self) -> &[MountPoint] {
        &self.mounts
    }

    pub(crate) fn mounts_mut(&mut self) -> &mut Vec<MountPoint> {
        &mut self.mounts
    }
}
