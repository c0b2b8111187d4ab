//! Kernel replacement handler
//!
//! Purges the kernel packages currently installed in the chroot, installs
//! the requested one, and regenerates the boot configuration. A chroot
//! with no kernel at all is fine: the requested kernel is installed fresh.

use regex::Regex;

use super::ActionHandler;
use crate::config::defaults;
use crate::core::context::ExecutionContext;
use crate::error::{ActionError, KernelError};
use crate::infra::chroot::{self, ChrootExecutor};

const FORCE_PARTUUID_REL: &str = "etc/default/grub.d/40-force-partuuid.cfg";

/// Replaces the chroot's installed kernel with the requested package.
#[derive(Debug)]
pub struct KernelReplacer<'a> {
    package: &'a str,
    flavor: Option<&'a str>,
}

impl<'a> KernelReplacer<'a> {
    pub fn new(package: &'a str, flavor: Option<&'a str>) -> Self {
        Self { package, flavor }
    }

    fn installed_kernel_packages(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<Vec<String>, KernelError> {
        let out = executor.run(ctx, "dpkg-query", &["-W", "-f", "${Package}\\n"])?;
        if !out.success() {
            return Err(KernelError::QueryFailed {
                stderr: out.stderr_tail(),
            });
        }
        Ok(select_kernel_packages(out.stdout.lines(), self.flavor))
    }

    fn remove_kernel_packages(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
        kernels: &[String],
    ) -> Result<(), KernelError> {
        tracing::info!("Removing kernel packages: {}", kernels.join(", "));
        let mut args = vec![
            "remove",
            "--purge",
            "--assume-yes",
            "--allow-change-held-packages",
        ];
        args.extend(kernels.iter().map(String::as_str));
        let out = executor.run(ctx, "apt-get", &args)?;
        if !out.success() {
            return Err(KernelError::RemoveFailed {
                packages: kernels.join(", "),
                stderr: out.stderr_tail(),
            });
        }
        Ok(())
    }

    fn refresh_index(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<(), KernelError> {
        let out = executor.run(ctx, "apt-get", &["update", "--assume-yes", "--error-on=any"])?;
        if !out.success() {
            return Err(KernelError::IndexRefresh {
                stderr: out.stderr_tail(),
            });
        }
        Ok(())
    }

    fn install_kernel(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<(), KernelError> {
        tracing::info!("Installing kernel '{}'", self.package);
        let out = executor.run(
            ctx,
            "apt-get",
            &["install", "--assume-yes", self.package],
        )?;
        if !out.success() {
            return Err(KernelError::InstallFailed {
                package: self.package.to_string(),
                stderr: out.stderr_tail(),
            });
        }
        Ok(())
    }

    /// Pin grub to the chroot's backing partition so the image boots
    /// without an initramfs.
    ///
    /// When the chroot is not backed by its own partition (plain directory
    /// chroots, build containers) there is nothing to pin and the step is
    /// skipped.
    fn force_partuuid_boot(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<bool, KernelError> {
        let root = ctx.chroot_path().to_string_lossy().into_owned();
        let device = match chroot::run_host("findmnt", &["-n", "-o", "SOURCE", "--target", &root]) {
            Ok(out) if out.success() && !out.stdout_trimmed().is_empty() => {
                out.stdout_trimmed().to_string()
            }
            _ => {
                tracing::debug!("Chroot has no dedicated backing device, skipping grub pin");
                return Ok(false);
            }
        };

        let partuuid = match chroot::run_host("blkid", &["-s", "PARTUUID", "-o", "value", &device])
        {
            Ok(out) if out.success() && !out.stdout_trimmed().is_empty() => {
                out.stdout_trimmed().to_string()
            }
            _ => {
                tracing::debug!("No PARTUUID for {device}, skipping grub pin");
                return Ok(false);
            }
        };

        tracing::info!("Forcing boot without initramfs (PARTUUID={partuuid})");
        let cfg_path = ctx.chroot_path().join(FORCE_PARTUUID_REL);
        let cfg = format!(
            "# Force boot without an initramfs by setting GRUB_FORCE_PARTUUID\n\
             # Remove this line to enable boot with an initramfs\n\
             GRUB_FORCE_PARTUUID={partuuid}\n"
        );
        if let Some(parent) = cfg_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KernelError::BootSetup {
                step: "grub.d".to_string(),
                stderr: e.to_string(),
            })?;
        }
        std::fs::write(&cfg_path, cfg).map_err(|e| KernelError::BootSetup {
            step: "grub.d".to_string(),
            stderr: e.to_string(),
        })?;

        let out = executor.run(ctx, "update-grub", &[])?;
        if !out.success() {
            return Err(KernelError::BootSetup {
                step: "update-grub".to_string(),
                stderr: out.stderr_tail(),
            });
        }
        Ok(true)
    }
}

impl ActionHandler for KernelReplacer<'_> {
    fn apply(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<String, ActionError> {
        let existing = self.installed_kernel_packages(ctx, executor)?;

        if existing.is_empty() {
            tracing::info!("No existing kernel packages found, installing fresh");
        } else {
            self.remove_kernel_packages(ctx, executor, &existing)?;
        }

        self.refresh_index(ctx, executor)?;
        self.install_kernel(ctx, executor)?;
        let pinned = self.force_partuuid_boot(ctx, executor)?;

        tracing::info!("Kernel installed");
        Ok(format!(
            "replaced {} kernel packages with '{}'{}",
            existing.len(),
            self.package,
            if pinned { " (grub pinned)" } else { "" }
        ))
    }
}

/// Pick the removable kernel packages out of an installed-package listing.
///
/// Without a flavor every `linux-*` package matches; with one, only
/// packages carrying that flavor suffix (or the bare metapackage) do.
pub(crate) fn select_kernel_packages<'i>(
    installed: impl Iterator<Item = &'i str>,
    flavor: Option<&str>,
) -> Vec<String> {
    let pattern = match flavor {
        Some(flavor) => format!(
            "^{}(?:.+-)?{}$",
            defaults::KERNEL_PACKAGE_PREFIX,
            regex::escape(flavor)
        ),
        None => format!("^{}", defaults::KERNEL_PACKAGE_PREFIX),
    };
    let re = Regex::new(&pattern).expect("kernel package pattern is valid");
    installed
        .map(str::trim)
        .filter(|name| !name.is_empty() && re.is_match(name))
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTALLED: &str = "bash\ncoreutils\nlinux-base\nlinux-image-6.8.0-41-generic\n\
                             linux-headers-6.8.0-41-generic\nlinux-image-6.8.0-41-oracle\n\
                             linuxdoc-tools\nlibc6\n";

    #[test]
    fn test_select_all_kernel_packages() {
        let kernels = select_kernel_packages(INSTALLED.lines(), None);
        assert_eq!(
            kernels,
            vec![
                "linux-base",
                "linux-image-6.8.0-41-generic",
                "linux-headers-6.8.0-41-generic",
                "linux-image-6.8.0-41-oracle",
            ]
        );
    }

    #[test]
    fn test_select_is_anchored_to_prefix() {
        // "linuxdoc-tools" must not count as a kernel package.
        let kernels = select_kernel_packages(INSTALLED.lines(), None);
        assert!(!kernels.iter().any(|k| k == "linuxdoc-tools"));
    }

    #[test]
    fn test_select_with_flavor_narrows() {
        let kernels = select_kernel_packages(INSTALLED.lines(), Some("generic"));
        assert_eq!(
            kernels,
            vec![
                "linux-image-6.8.0-41-generic",
                "linux-headers-6.8.0-41-generic",
            ]
        );
    }

    #[test]
    fn test_select_flavor_matches_bare_metapackage() {
        let kernels = select_kernel_packages("linux-generic\nlinux-oracle\n".lines(), Some("generic"));
        assert_eq!(kernels, vec!["linux-generic"]);
    }

    #[test]
    fn test_select_empty_listing() {
        assert!(select_kernel_packages("".lines(), None).is_empty());
    }

}
