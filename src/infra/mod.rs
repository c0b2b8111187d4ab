//! Infrastructure layer
//!
//! Handles all I/O against the host: the mount table, mount(8)/umount(8),
//! and subprocess execution in and around the chroot. This module is the
//! only place where side effects on the host occur.

pub mod chroot;
pub mod guards;
pub mod mount;
