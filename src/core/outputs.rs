//! Run output files
//!
//! Optional post-run reporting for the surrounding image pipeline: the
//! chroot's installed-package manifest and a sorted file list of the tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::core::context::ExecutionContext;
use crate::error::OutputError;
use crate::infra::chroot::ChrootExecutor;
use crate::infra::mount::CHROOT_MOUNTS;

/// Writes `<base>.manifest` and `<base>.filelist` after a successful run.
#[derive(Debug)]
pub struct OutputFiles {
    base: PathBuf,
    overwrite: bool,
}

impl OutputFiles {
    pub fn new(base: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            base: base.into(),
            overwrite,
        }
    }

    pub fn write(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<(), OutputError> {
        let manifest_path = self.base.with_extension("manifest");
        let filelist_path = self.base.with_extension("filelist");

        for path in [&manifest_path, &filelist_path] {
            if path.exists() && !self.overwrite {
                return Err(OutputError::Exists { path: path.clone() });
            }
        }

        self.write_manifest(ctx, executor, &manifest_path)?;
        self.write_filelist(ctx, &filelist_path)?;
        Ok(())
    }

    fn write_manifest(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
        path: &Path,
    ) -> Result<(), OutputError> {
        let out = executor.run(ctx, "dpkg-query", &["-W"])?;
        if !out.success() {
            return Err(OutputError::ManifestQuery {
                stderr: out.stderr_tail(),
            });
        }
        std::fs::write(path, &out.stdout).map_err(|e| OutputError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        tracing::info!("Manifest written to {}", path.display());
        Ok(())
    }

    fn write_filelist(&self, ctx: &ExecutionContext, path: &Path) -> Result<(), OutputError> {
        let entries = collect_filelist(ctx.chroot_path());
        let mut content = entries.join("\n");
        content.push('\n');
        std::fs::write(path, content).map_err(|e| OutputError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        tracing::info!("File list written to {}", path.display());
        Ok(())
    }
}

/// Sorted chroot-relative paths of the tree, excluding the virtual mount
/// targets (their content belongs to the host, not the image).
pub(crate) fn collect_filelist(root: &Path) -> Vec<String> {
    let skip: HashSet<PathBuf> = CHROOT_MOUNTS
        .iter()
        .map(|spec| root.join(spec.target.trim_start_matches('/')))
        .collect();

    let mut entries: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !skip.contains(e.path()))
        .filter_map(Result::ok)
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|rel| format!("/{}", rel.display()))
        })
        .collect();
    entries.sort();
    entries
}
