//! chimg - declarative chroot customizer
//!
//! This library applies an ordered list of customization actions (package
//! installation, kernel replacement, file creation, command execution) to
//! an already-prepared chroot filesystem tree, so image-build pipelines
//! can mutate a root filesystem reproducibly without re-creating it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Engine, dispatcher, action handlers and configuration
//! - [`infra`] - Infrastructure layer (mounts, chroot subprocesses)
//! - [`config`] - Compiled-in constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
