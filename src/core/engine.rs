//! Run orchestration
//!
//! The engine owns the whole lifecycle of one run: validation, host
//! preflight, scoped mount acquisition, environment guards, dispatch, and
//! teardown on every exit path. Once the mount environment is acquired,
//! release is guaranteed exactly once before control returns to the
//! caller, whether the run succeeds, an action fails, or setup aborts.

use std::path::PathBuf;

use crate::config::defaults;
use crate::core::config::Config;
use crate::core::context::ExecutionContext;
use crate::core::dispatcher::{ActionDispatcher, RunReport};
use crate::error::{ChimgError, EnvError, ExecError, MountError};
use crate::infra::chroot::ChrootExecutor;
use crate::infra::guards::{GrubDivertGuard, PolicyRcGuard};
use crate::infra::mount::MountManager;

/// Applies one configuration to one chroot tree.
#[derive(Debug)]
pub struct Engine {
    chroot_path: PathBuf,
    mounter: MountManager,
    executor: ChrootExecutor,
}

impl Engine {
    pub fn new(chroot_path: impl Into<PathBuf>) -> Self {
        Self {
            chroot_path: chroot_path.into(),
            mounter: MountManager::new(),
            executor: ChrootExecutor::new(),
        }
    }

    /// Replace the mount manager (alternate mount table source).
    pub fn with_mount_manager(mut self, mounter: MountManager) -> Self {
        self.mounter = mounter;
        self
    }

    /// Apply the configuration's actions in declaration order.
    ///
    /// Configuration and environment failures return `Err` before any
    /// action runs. A handler failure returns `Ok` with the partial,
    /// ordered report and its triggering error — mounts are torn down
    /// either way.
    pub fn apply(&self, config: &Config) -> Result<RunReport, ChimgError> {
        config.validate()?;
        self.preflight()?;

        let root = ExecutionContext::resolve(&self.chroot_path)?;
        tracing::info!("Applying {} actions to {}", config.actions.len(), root.display());

        let mounts = self.mounter.acquire(&root)?;
        let scope = MountScope {
            manager: &self.mounter,
            ctx: ExecutionContext::new(root, mounts),
        };

        // An error inside (guard setup, index refresh) drops `scope`, whose
        // Drop releases the mounts before the error propagates.
        let report = self.run_actions(scope.ctx(), config)?;

        if report.succeeded() {
            scope.release()?;
            tracing::info!("Chroot changes applied, environment cleaned up");
        } else if let Err(e) = scope.release() {
            // The action error stays the primary failure.
            tracing::error!("Mount teardown after failed run: {e}");
        }
        Ok(report)
    }

    fn run_actions(
        &self,
        ctx: &ExecutionContext,
        config: &Config,
    ) -> Result<RunReport, ChimgError> {
        let needs_pm = config.needs_package_manager();

        let _policy = if needs_pm {
            Some(PolicyRcGuard::install(ctx)?)
        } else {
            None
        };
        let _grub = if needs_pm {
            Some(GrubDivertGuard::install(&self.executor, ctx)?)
        } else {
            None
        };
        if needs_pm {
            self.refresh_index(ctx)?;
        }

        let dispatcher = ActionDispatcher::new(&self.executor);
        Ok(dispatcher.run(ctx, &config.actions))
        // Guards drop here, in reverse setup order, before mount release.
    }

    fn refresh_index(&self, ctx: &ExecutionContext) -> Result<(), EnvError> {
        tracing::info!("Refreshing package index");
        let out = self
            .executor
            .run(ctx, "apt-get", &["update", "--assume-yes", "--error-on=any"])?;
        if !out.success() {
            return Err(EnvError::IndexRefresh {
                stderr: out.stderr_tail(),
            });
        }
        Ok(())
    }

    fn preflight(&self) -> Result<(), EnvError> {
        for tool in defaults::REQUIRED_HOST_TOOLS {
            if which::which(tool).is_err() && !sbin_fallback_exists(tool) {
                return Err(EnvError::Exec(ExecError::ToolMissing {
                    tool: (*tool).to_string(),
                }));
            }
        }
        Ok(())
    }
}

/// The sbin directories are not on PATH for unprivileged shells, but the
/// tools there still run fine once the engine is invoked with privileges.
fn sbin_fallback_exists(tool: &str) -> bool {
    ["/usr/sbin", "/usr/bin", "/sbin", "/bin"]
        .iter()
        .any(|dir| std::path::Path::new(dir).join(tool).is_file())
}

/// Scoped ownership of the acquired mount environment.
///
/// The explicit `release` surfaces teardown errors; the Drop impl is the
/// fallback that keeps every abnormal exit path mount-clean.
struct MountScope<'a> {
    manager: &'a MountManager,
    ctx: ExecutionContext,
}

impl MountScope<'_> {
    fn ctx(&self) -> &ExecutionContext {
        &self.ctx
    }

    fn release(mut self) -> Result<(), MountError> {
        self.manager.release(self.ctx.mounts_mut())
    }
}

impl Drop for MountScope<'_> {
    fn drop(&mut self) {
        if self.ctx.mounts().is_empty() {
            return;
        }
        if let Err(e) = self.manager.release(self.ctx.mounts_mut()) {
            tracing::error!("Mount teardown failed: {e}");
        }
    }
}
