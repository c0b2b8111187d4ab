//! Default configuration values

/// Mount table consulted for pre-existing mount detection
pub const MOUNT_TABLE_PATH: &str = "/proc/self/mounts";

/// Environment for subprocesses running inside the chroot.
///
/// The environment is never inherited from the caller; these entries plus
/// nothing else are what in-chroot tools see.
pub const CHROOT_BASE_ENV: &[(&str, &str)] = &[
    (
        "PATH",
        "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
    ),
    ("DEBIAN_FRONTEND", "noninteractive"),
];

/// Prefix shared by all removable kernel packages
pub const KERNEL_PACKAGE_PREFIX: &str = "linux-";

/// Host tools required before a run starts
pub const REQUIRED_HOST_TOOLS: &[&str] = &["chroot", "mount", "umount"];

/// Number of stderr lines carried in subprocess failure errors
pub const STDERR_TAIL_LINES: usize = 20;

/// Prefix for temporary files staged inside the chroot
pub const CHROOT_TMP_PREFIX: &str = "chimg_";

/// File mode applied to created files when the action requests none.
///
/// Temporary files are created 0600; without this the persisted file would
/// keep that mode instead of the open(2) default the original tool produced.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
