//! Chroot mount environment
//!
//! Establishes the virtual filesystems action execution needs inside the
//! chroot. Mounts the caller already holds are detected from the live mount
//! table and left untouched; only mounts created here are released, in
//! reverse creation order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::error::{ExecError, MountError};
use crate::infra::chroot;

/// Virtual filesystem kinds mounted under the chroot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    DevTmpfs,
    DevPts,
    Proc,
    Sysfs,
    SecurityFs,
    Cgroup2,
    Tmpfs,
    Bind,
}

impl MountKind {
    /// The filesystem type passed to mount(8).
    pub fn fstype(&self) -> &'static str {
        match self {
            MountKind::DevTmpfs => "devtmpfs",
            MountKind::DevPts => "devpts",
            MountKind::Proc => "proc",
            MountKind::Sysfs => "sysfs",
            MountKind::SecurityFs => "securityfs",
            MountKind::Cgroup2 => "cgroup2",
            MountKind::Tmpfs => "tmpfs",
            MountKind::Bind => "bind",
        }
    }
}

/// One required mount, targeted relative to the chroot root.
#[derive(Debug, Clone, Copy)]
pub struct MountSpec {
    /// Mount source device or pseudo-source
    pub source: &'static str,
    /// Target path inside the chroot
    pub target: &'static str,
    /// Filesystem kind
    pub kind: MountKind,
    /// mount(8) -o options
    pub options: Option<&'static str>,
}

/// The fixed set of virtual mounts required for action execution, in
/// creation order. Reverse order respects nesting at teardown.
pub const CHROOT_MOUNTS: &[MountSpec] = &[
    MountSpec {
        source: "dev-live",
        target: "/dev",
        kind: MountKind::DevTmpfs,
        options: None,
    },
    MountSpec {
        source: "devpts-live",
        target: "/dev/pts",
        kind: MountKind::DevPts,
        options: Some("nodev,nosuid"),
    },
    MountSpec {
        source: "proc-live",
        target: "/proc",
        kind: MountKind::Proc,
        options: None,
    },
    MountSpec {
        source: "sysfs-live",
        target: "/sys",
        kind: MountKind::Sysfs,
        options: None,
    },
    MountSpec {
        source: "securityfs",
        target: "/sys/kernel/security",
        kind: MountKind::SecurityFs,
        options: None,
    },
    MountSpec {
        source: "none",
        target: "/sys/fs/cgroup",
        kind: MountKind::Cgroup2,
        options: None,
    },
    MountSpec {
        source: "none",
        target: "/run",
        kind: MountKind::Tmpfs,
        options: None,
    },
    MountSpec {
        source: "none",
        target: "/tmp",
        kind: MountKind::Tmpfs,
        options: None,
    },
    MountSpec {
        source: "none",
        target: "/var/lib/apt/lists",
        kind: MountKind::Tmpfs,
        options: None,
    },
    MountSpec {
        source: "none",
        target: "/var/cache/apt",
        kind: MountKind::Tmpfs,
        options: None,
    },
];

/// A mount under the chroot, tagged with whether this run created it.
#[derive(Debug, Clone)]
pub struct MountPoint {
    /// Mount source device or pseudo-source
    pub source: String,
    /// Absolute target path on the host
    pub target: PathBuf,
    /// Filesystem kind
    pub kind: MountKind,
    /// mount(8) -o options
    pub options: Option<&'static str>,
    /// True when the caller established this mount before the run
    pub pre_existing: bool,
}

/// Owns acquisition and release of the chroot mount environment.
///
/// State is derived fresh from the live mount table at every acquire, never
/// cached across runs.
#[derive(Debug)]
pub struct MountManager {
    table_path: PathBuf,
}

impl MountManager {
    /// Manager reading the process's own mount table.
    pub fn new() -> Self {
        Self {
            table_path: PathBuf::from(defaults::MOUNT_TABLE_PATH),
        }
    }

    /// Manager reading an alternate mount table file.
    pub fn with_table_path(table_path: impl Into<PathBuf>) -> Self {
        Self {
            table_path: table_path.into(),
        }
    }

    /// Establish the required mount set under the chroot root.
    ///
    /// Targets already present in the mount table are tagged pre-existing
    /// and not touched. On any failure the mounts this call created are
    /// unwound before the error is returned, so a failed acquire never
    /// leaves a half-mounted chroot.
    pub fn acquire(&self, chroot_root: &Path) -> Result<Vec<MountPoint>, MountError> {
        tracing::info!("Setting up mount points under {}", chroot_root.display());
        let mounted = self.mounted_targets()?;
        let mut acquired: Vec<MountPoint> = Vec::with_capacity(CHROOT_MOUNTS.len());

        for spec in CHROOT_MOUNTS {
            let target = chroot_root.join(spec.target.trim_start_matches('/'));

            if mounted.contains(&target) {
                tracing::debug!("{} already mounted, leaving in place", target.display());
                acquired.push(MountPoint {
                    source: spec.source.to_string(),
                    target,
                    kind: spec.kind,
                    options: spec.options,
                    pre_existing: true,
                });
                continue;
            }

            if !target.is_dir() {
                self.unwind(&mut acquired);
                return Err(MountError::TargetMissing { target });
            }

            let mount_point = MountPoint {
                source: spec.source.to_string(),
                target: target.clone(),
                kind: spec.kind,
                options: spec.options,
                pre_existing: false,
            };

            let args = mount_args(&mount_point);
            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            match chroot::run_host("mount", &arg_refs) {
                Ok(out) if out.success() => {
                    tracing::debug!("Mounted {}", target.display());
                    acquired.push(mount_point);
                }
                Ok(out) => {
                    self.unwind(&mut acquired);
                    return Err(MountError::MountFailed {
                        target,
                        stderr: out.stderr_tail(),
                    });
                }
                Err(e) => {
                    self.unwind(&mut acquired);
                    return Err(spawn_error(e));
                }
            }
        }

        tracing::info!("Mount points ready");
        Ok(acquired)
    }

    /// Release the mounts this run created, in reverse creation order.
    ///
    /// Pre-existing mounts are never touched. All entries are attempted
    /// even after a failure; the first error is returned. The vector is
    /// drained, so a second call is a no-op.
    pub fn release(&self, mounts: &mut Vec<MountPoint>) -> Result<(), MountError> {
        let mut first_error: Option<MountError> = None;

        for mount_point in mounts.drain(..).rev() {
            if mount_point.pre_existing {
                continue;
            }
            let target = mount_point.target.to_string_lossy().into_owned();
            match chroot::run_host("umount", &[&target]) {
                Ok(out) if out.success() => {
                    tracing::debug!("Unmounted {}", mount_point.target.display());
                }
                Ok(out) => {
                    tracing::error!(
                        "Failed to unmount {}: {}",
                        mount_point.target.display(),
                        out.stderr.trim_end()
                    );
                    first_error.get_or_insert(MountError::UnmountFailed {
                        target: mount_point.target,
                        stderr: out.stderr_tail(),
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to run umount: {e}");
                    first_error.get_or_insert(spawn_error(e));
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn unwind(&self, mounts: &mut Vec<MountPoint>) {
        if let Err(e) = self.release(mounts) {
            tracing::error!("Unwinding partially acquired mounts failed: {e}");
        }
    }

    fn mounted_targets(&self) -> Result<HashSet<PathBuf>, MountError> {
        let content =
            std::fs::read_to_string(&self.table_path).map_err(|e| MountError::TableRead {
                path: self.table_path.clone(),
                error: e.to_string(),
            })?;
        Ok(parse_mount_table(&content))
    }
}

impl Default for MountManager {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_error(e: ExecError) -> MountError {
    match e {
        ExecError::Spawn { program, error } => MountError::Spawn { program, error },
        other => MountError::Spawn {
            program: "mount".to_string(),
            error: other.to_string(),
        },
    }
}

/// Mount-point targets of a mount table in fstab/mountinfo text form.
pub fn parse_mount_table(content: &str) -> HashSet<PathBuf> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(unescape_mount_path)
        .collect()
}

/// Decode the octal escapes mount tables use for whitespace in paths.
fn unescape_mount_path(field: &str) -> PathBuf {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escape: String = chars.by_ref().take(3).collect();
        match escape.as_str() {
            "040" => out.push(' '),
            "011" => out.push('\t'),
            "012" => out.push('\n'),
            "134" => out.push('\\'),
            other => {
                out.push('\\');
                out.push_str(other);
            }
        }
    }
    PathBuf::from(out)
}

fn mount_args(mount_point: &MountPoint) -> Vec<String> {
    let target = mount_point.target.to_string_lossy().into_owned();
    let mut args = match mount_point.kind {
        MountKind::Bind => vec!["--bind".to_string(), mount_point.source.clone(), target],
        kind => vec![
            mount_point.source.clone(),
            target,
            "-t".to_string(),
            kind.fstype().to_string(),
        ],
    };
    if let Some(options) = mount_point.options {
        args.push("-o".to_string());
        args.push(options.to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(kind: MountKind, source: &str, target: &str, options: Option<&'static str>) -> MountPoint {
        MountPoint {
            source: source.to_string(),
            target: PathBuf::from(target),
            kind,
            options,
            pre_existing: false,
        }
    }

    #[test]
    fn test_parse_mount_table_extracts_targets() {
        let table = "proc-live /srv/chroot/proc proc rw,relatime 0 0\n\
                     sysfs-live /srv/chroot/sys sysfs rw 0 0\n";
        let targets = parse_mount_table(table);
        assert!(targets.contains(Path::new("/srv/chroot/proc")));
        assert!(targets.contains(Path::new("/srv/chroot/sys")));
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_parse_mount_table_decodes_octal_escapes() {
        let table = "none /srv/my\\040chroot/tmp tmpfs rw 0 0\n";
        let targets = parse_mount_table(table);
        assert!(targets.contains(Path::new("/srv/my chroot/tmp")));
    }

    #[test]
    fn test_parse_mount_table_ignores_malformed_lines() {
        let targets = parse_mount_table("garbage\n\n");
        assert!(targets.is_empty());
    }

    #[test]
    fn test_mount_args_virtual_fs() {
        let mp = point(MountKind::Proc, "proc-live", "/srv/chroot/proc", None);
        assert_eq!(
            mount_args(&mp),
            vec!["proc-live", "/srv/chroot/proc", "-t", "proc"]
        );
    }

    #[test]
    fn test_mount_args_with_options() {
        let mp = point(
            MountKind::DevPts,
            "devpts-live",
            "/srv/chroot/dev/pts",
            Some("nodev,nosuid"),
        );
        assert_eq!(
            mount_args(&mp),
            vec![
                "devpts-live",
                "/srv/chroot/dev/pts",
                "-t",
                "devpts",
                "-o",
                "nodev,nosuid"
            ]
        );
    }

    #[test]
    fn test_mount_args_bind() {
        let mp = point(MountKind::Bind, "/srv/features", "/srv/chroot/mnt", None);
        assert_eq!(mount_args(&mp), vec!["--bind", "/srv/features", "/srv/chroot/mnt"]);
    }

    #[test]
    fn test_chroot_mounts_nesting_order() {
        // Parents must be mounted before their nested targets.
        let position = |t: &str| {
            CHROOT_MOUNTS
                .iter()
                .position(|s| s.target == t)
                .unwrap_or_else(|| panic!("missing mount spec for {t}"))
        };
        assert!(position("/dev") < position("/dev/pts"));
        assert!(position("/sys") < position("/sys/kernel/security"));
        assert!(position("/sys") < position("/sys/fs/cgroup"));
    }

    #[test]
    fn test_release_is_noop_on_empty_set() {
        let manager = MountManager::new();
        let mut mounts = Vec::new();
        manager.release(&mut mounts).unwrap();
    }

    #[test]
    fn test_release_skips_pre_existing() {
        // Pre-existing entries must never be unmounted; with only those in
        // the set, release performs no external commands and succeeds.
        let manager = MountManager::new();
        let mut mounts = vec![MountPoint {
            pre_existing: true,
            ..point(MountKind::Proc, "proc-live", "/srv/chroot/proc", None)
        }];
        manager.release(&mut mounts).unwrap();
        assert!(mounts.is_empty());
    }
}
