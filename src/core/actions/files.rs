//! File creation handler
//!
//! Writes a file into the chroot tree. Destinations are confined to the
//! chroot root by lexical normalization, and writes go through a temporary
//! file in the destination directory so the final path is replaced
//! atomically.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use super::ActionHandler;
use crate::config::defaults;
use crate::core::action;
use crate::core::context::ExecutionContext;
use crate::error::{ActionError, FileError};
use crate::infra::chroot::ChrootExecutor;

/// Creates one file inside the chroot.
#[derive(Debug)]
pub struct FileWriter<'a> {
    destination: &'a str,
    content: Option<&'a str>,
    source: Option<&'a Path>,
    mode: Option<&'a str>,
    owner: Option<u32>,
    group: Option<u32>,
}

impl<'a> FileWriter<'a> {
    pub fn new(
        destination: &'a str,
        content: Option<&'a str>,
        source: Option<&'a Path>,
        mode: Option<&'a str>,
        owner: Option<u32>,
        group: Option<u32>,
    ) -> Self {
        Self {
            destination,
            content,
            source,
            mode,
            owner,
            group,
        }
    }

    fn content_bytes(&self) -> Result<Vec<u8>, FileError> {
        if let Some(content) = self.content {
            return Ok(content.as_bytes().to_vec());
        }
        let source = self.source.unwrap_or_else(|| Path::new(""));
        if !source.is_file() {
            return Err(FileError::MissingSource {
                path: source.to_path_buf(),
            });
        }
        std::fs::read(source).map_err(|e| FileError::Io {
            path: source.to_path_buf(),
            error: e.to_string(),
        })
    }
}

impl ActionHandler for FileWriter<'_> {
    fn apply(
        &self,
        ctx: &ExecutionContext,
        _executor: &ChrootExecutor,
    ) -> Result<String, ActionError> {
        let resolved = resolve_destination(ctx.chroot_path(), self.destination)?;
        let bytes = self.content_bytes()?;

        let parent = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.chroot_path().to_path_buf());
        std::fs::create_dir_all(&parent).map_err(|e| FileError::Io {
            path: parent.clone(),
            error: e.to_string(),
        })?;

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |e: std::io::Error| FileError::Io {
                path,
                error: e.to_string(),
            }
        };

        let mut staged = tempfile::Builder::new()
            .prefix(defaults::CHROOT_TMP_PREFIX)
            .tempfile_in(&parent)
            .map_err(io_err(&parent))?;
        staged.write_all(&bytes).map_err(io_err(staged.path()))?;

        let mode = match self.mode {
            Some(mode) => action::parse_mode(mode).map_err(|error| FileError::Io {
                path: resolved.clone(),
                error,
            })?,
            None => defaults::DEFAULT_FILE_MODE,
        };
        staged
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))
            .map_err(io_err(staged.path()))?;

        if self.owner.is_some() || self.group.is_some() {
            std::os::unix::fs::chown(staged.path(), self.owner, self.group)
                .map_err(io_err(staged.path()))?;
        }

        staged.persist(&resolved).map_err(|e| FileError::Io {
            path: resolved.clone(),
            error: e.error.to_string(),
        })?;

        tracing::info!("Wrote {} ({} bytes)", self.destination, bytes.len());
        Ok(format!("wrote {} ({} bytes)", self.destination, bytes.len()))
    }
}

/// Resolve a destination path to its absolute location under the chroot.
///
/// Normalization is lexical: `.` components are dropped, `..` pops one
/// level, and popping above the chroot root rejects the path. The path is
/// never clamped silently.
pub fn resolve_destination(chroot_root: &Path, destination: &str) -> Result<PathBuf, FileError> {
    let mut resolved = chroot_root.to_path_buf();
    let mut depth: usize = 0;
    for component in Path::new(destination).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return Err(FileError::EscapesChroot {
                        destination: destination.to_string(),
                    });
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    Ok(resolved)
}
