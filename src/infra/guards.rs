//! Scoped chroot environment guards
//!
//! Temporary changes that keep package tooling well-behaved inside the
//! chroot while actions run: runlevel operations are denied, and the grub
//! helpers that misfire inside a chroot are diverted. Each guard undoes
//! exactly what it set up when it is dropped, in reverse setup order.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::core::context::ExecutionContext;
use crate::error::EnvError;
use crate::infra::chroot::ChrootExecutor;

const POLICY_RC_REL: &str = "usr/sbin/policy-rc.d";
const POLICY_RC_SCRIPT: &str =
    "#!/bin/sh\necho \"All runlevel operations denied by policy\" >&2\nexit 101\n";

const DETECT_VIRT_REL: &str = "usr/bin/systemd-detect-virt";
// Kernel postinst no-ops when it believes it runs in a container; the stub
// always answers "not a container".
const DETECT_VIRT_STUB: &str = "#!/bin/sh\nexit 1\n";

/// Denies runlevel operations for the duration of a run.
///
/// Writes `usr/sbin/policy-rc.d` only when the chroot does not already
/// carry one, and removes it again only in that case.
#[derive(Debug)]
pub struct PolicyRcGuard {
    path: PathBuf,
    written: bool,
}

impl PolicyRcGuard {
    pub fn install(ctx: &ExecutionContext) -> Result<Self, EnvError> {
        let path = ctx.chroot_path().join(POLICY_RC_REL);
        if path.exists() {
            tracing::debug!("policy-rc.d already present, leaving it in place");
            return Ok(Self {
                path,
                written: false,
            });
        }

        tracing::info!("Disabling runlevel operations in the chroot");
        write_executable(&path, POLICY_RC_SCRIPT).map_err(|e| EnvError::Guard {
            step: "policy-rc.d".to_string(),
            message: e,
        })?;
        Ok(Self {
            path,
            written: true,
        })
    }
}

impl Drop for PolicyRcGuard {
    fn drop(&mut self) {
        if !self.written {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!("Runlevel operations reenabled"),
            Err(e) => tracing::error!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// Diverts the grub machinery that must not run during kernel replacement.
///
/// `/etc/grub.d/30_os-prober` is renamed out of the way and
/// `/usr/bin/systemd-detect-virt` is replaced by a stub, both via
/// dpkg-divert inside the chroot. Teardown removes the diversions in
/// reverse order.
pub struct GrubDivertGuard<'a> {
    executor: &'a ChrootExecutor,
    ctx: &'a ExecutionContext,
    os_prober_diverted: bool,
    detect_virt_diverted: bool,
    stub_written: bool,
}

impl<'a> GrubDivertGuard<'a> {
    pub fn install(
        executor: &'a ChrootExecutor,
        ctx: &'a ExecutionContext,
    ) -> Result<Self, EnvError> {
        tracing::info!("Adding grub diversions");
        let mut guard = Self {
            executor,
            ctx,
            os_prober_diverted: false,
            detect_virt_diverted: false,
            stub_written: false,
        };

        // A failure mid-setup drops the guard, which undoes the steps that
        // already succeeded.
        guard.divert(&[
            "--local",
            "--divert",
            "/etc/grub.d/30_os-prober.dpkg-divert",
            "--rename",
            "/etc/grub.d/30_os-prober",
        ])?;
        guard.os_prober_diverted = true;

        guard.divert(&["--local", "--rename", "/usr/bin/systemd-detect-virt"])?;
        guard.detect_virt_diverted = true;

        let stub_path = ctx.chroot_path().join(DETECT_VIRT_REL);
        write_executable(&stub_path, DETECT_VIRT_STUB).map_err(|e| EnvError::Guard {
            step: "systemd-detect-virt stub".to_string(),
            message: e,
        })?;
        guard.stub_written = true;

        tracing::info!("Grub diversions added");
        Ok(guard)
    }

    fn divert(&self, args: &[&str]) -> Result<(), EnvError> {
        let out = self.executor.run(self.ctx, "dpkg-divert", args)?;
        if !out.success() {
            return Err(EnvError::Guard {
                step: "dpkg-divert".to_string(),
                message: out.stderr_tail(),
            });
        }
        Ok(())
    }

    fn undivert(&self, args: &[&str]) {
        match self.executor.run(self.ctx, "dpkg-divert", args) {
            Ok(out) if out.success() => {}
            Ok(out) => tracing::error!("dpkg-divert --remove failed: {}", out.stderr.trim_end()),
            Err(e) => tracing::error!("dpkg-divert --remove failed: {e}"),
        }
    }
}

impl Drop for GrubDivertGuard<'_> {
    fn drop(&mut self) {
        tracing::info!("Removing grub diversions");

        if self.os_prober_diverted {
            self.undivert(&[
                "--remove",
                "--local",
                "--divert",
                "/etc/grub.d/30_os-prober.dpkg-divert",
                "--rename",
                "/etc/grub.d/30_os-prober",
            ]);
        }

        if self.stub_written {
            let stub_path = self.ctx.chroot_path().join(DETECT_VIRT_REL);
            if let Err(e) = std::fs::remove_file(&stub_path) {
                tracing::error!("Failed to remove {}: {e}", stub_path.display());
            }
        }

        if self.detect_virt_diverted {
            self.undivert(&["--remove", "--local", "--rename", "/usr/bin/systemd-detect-virt"]);
        }
    }
}

fn write_executable(path: &std::path::Path, content: &str) -> Result<(), String> {
    std::fs::write(path, content).map_err(|e| e.to_string())?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| e.to_string())
}
