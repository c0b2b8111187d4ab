//! Package installation handler
//!
//! Drives apt-get inside the chroot, non-interactively. Re-running with an
//! already-installed package list is a no-op by apt's own idempotence.

use super::ActionHandler;
use crate::core::context::ExecutionContext;
use crate::error::{ActionError, PackageError};
use crate::infra::chroot::ChrootExecutor;

/// Installs an ordered package list inside the chroot.
#[derive(Debug)]
pub struct PackageInstaller<'a> {
    packages: &'a [String],
    hold: &'a [String],
}

impl<'a> PackageInstaller<'a> {
    pub fn new(packages: &'a [String], hold: &'a [String]) -> Self {
        Self { packages, hold }
    }
}

impl ActionHandler for PackageInstaller<'_> {
    fn apply(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<String, ActionError> {
        let packages = dedup_preserving_order(self.packages);
        tracing::info!("Installing {} packages", packages.len());

        for &package in &packages {
            let out = executor
                .run(
                    ctx,
                    "apt-get",
                    &["install", "--assume-yes", "--allow-downgrades", package],
                )
                .map_err(PackageError::from)?;
            if !out.success() {
                return Err(PackageError::InstallFailed {
                    package: package.to_string(),
                    stderr: out.stderr_tail(),
                }
                .into());
            }

            if self.hold.iter().any(|h| h == package) {
                let out = executor
                    .run(ctx, "apt-mark", &["hold", package])
                    .map_err(PackageError::from)?;
                if !out.success() {
                    return Err(PackageError::HoldFailed {
                        package: package.to_string(),
                        stderr: out.stderr_tail(),
                    }
                    .into());
                }
                tracing::debug!("Held package {package}");
            }
        }

        tracing::info!("Packages installed");
        Ok(format!("installed {} packages", packages.len()))
    }
}

/// Drop duplicate package names, keeping the first occurrence's position.
pub(crate) fn dedup_preserving_order(packages: &[String]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    packages
        .iter()
        .map(String::as_str)
        .filter(|p| seen.insert(*p))
        .collect()
}
