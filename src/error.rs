//! Error types for chimg
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Config file is not valid YAML or declares an unknown action kind
    #[error("Failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// An action failed structural validation
    #[error("Invalid action #{index} ({action}): {message}")]
    Validation {
        index: usize,
        action: String,
        message: String,
    },
}

/// Subprocess start failures
#[derive(Error, Debug)]
pub enum ExecError {
    /// Required host tool is not installed
    #[error("Required host tool '{tool}' not found in PATH")]
    ToolMissing { tool: String },

    /// Subprocess could not be spawned at all
    #[error("Failed to execute '{program}': {error}")]
    Spawn { program: String, error: String },

    /// In-chroot script file could not be staged
    #[error("Failed to stage script '{path}': {error}")]
    Script { path: PathBuf, error: String },
}

/// Mount environment errors
#[derive(Error, Debug)]
pub enum MountError {
    /// Chroot directory does not exist or is not a directory
    #[error("Chroot directory '{path}' does not exist or is not a directory")]
    RootMissing { path: PathBuf },

    /// Mount target directory is missing from the chroot tree
    #[error("Mount target '{target}' does not exist in the chroot")]
    TargetMissing { target: PathBuf },

    /// Mount table could not be read
    #[error("Failed to read mount table '{path}': {error}")]
    TableRead { path: PathBuf, error: String },

    /// mount(8) reported a failure
    #[error("Failed to mount '{target}': {stderr}")]
    MountFailed { target: PathBuf, stderr: String },

    /// umount(8) reported a failure
    #[error("Failed to unmount '{target}': {stderr}")]
    UnmountFailed { target: PathBuf, stderr: String },

    /// mount/umount binary could not be spawned
    #[error("Failed to execute '{program}': {error}")]
    Spawn { program: String, error: String },
}

/// Chroot environment preparation errors (guards, package index)
#[derive(Error, Debug)]
pub enum EnvError {
    /// A scoped environment guard could not be established
    #[error("Failed to set up chroot environment ({step}): {message}")]
    Guard { step: String, message: String },

    /// apt-get update failed inside the chroot
    #[error("Failed to refresh package index: {stderr}")]
    IndexRefresh { stderr: String },

    /// Subprocess start failure
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Package installation errors
#[derive(Error, Debug)]
pub enum PackageError {
    /// apt-get install exited non-zero
    #[error("Failed to install package '{package}': {stderr}")]
    InstallFailed { package: String, stderr: String },

    /// apt-mark hold exited non-zero
    #[error("Failed to hold package '{package}': {stderr}")]
    HoldFailed { package: String, stderr: String },

    /// Subprocess start failure
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Kernel replacement errors
#[derive(Error, Debug)]
pub enum KernelError {
    /// dpkg-query exited non-zero
    #[error("Failed to query installed packages: {stderr}")]
    QueryFailed { stderr: String },

    /// Removal of the previous kernel packages failed
    #[error("Failed to remove kernel packages [{packages}]: {stderr}")]
    RemoveFailed { packages: String, stderr: String },

    /// apt-get update failed inside the chroot
    #[error("Failed to refresh package index: {stderr}")]
    IndexRefresh { stderr: String },

    /// Installation of the requested kernel failed
    #[error("Failed to install kernel '{package}': {stderr}")]
    InstallFailed { package: String, stderr: String },

    /// Boot-loader regeneration failed
    #[error("Kernel boot setup failed ({step}): {stderr}")]
    BootSetup { step: String, stderr: String },

    /// Subprocess start failure
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// File creation errors
#[derive(Error, Debug)]
pub enum FileError {
    /// Destination path normalizes to a location outside the chroot
    #[error("Destination '{destination}' escapes the chroot root")]
    EscapesChroot { destination: String },

    /// Content source file does not exist
    #[error("Content source '{path}' does not exist")]
    MissingSource { path: PathBuf },

    /// I/O failure while writing the file
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// In-chroot command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command exited non-zero
    #[error("Command exited with code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },

    /// Subprocess start failure
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Any handler-level action failure
#[derive(Error, Debug)]
pub enum ActionError {
    /// Package installation error
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Kernel replacement error
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// File creation error
    #[error(transparent)]
    File(#[from] FileError),

    /// Command execution error
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Run output file errors (.manifest / .filelist)
#[derive(Error, Debug)]
pub enum OutputError {
    /// Output file already exists and --overwrite was not given
    #[error("Output file '{path}' already exists (use --overwrite)")]
    Exists { path: PathBuf },

    /// dpkg-query for the manifest failed
    #[error("Failed to query package manifest: {stderr}")]
    ManifestQuery { stderr: String },

    /// I/O failure while writing an output file
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Subprocess start failure
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Top-level chimg error type
#[derive(Error, Debug)]
pub enum ChimgError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Mount environment error
    #[error("Mount error: {0}")]
    Mount(#[from] MountError),

    /// Chroot environment preparation error
    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    /// An action failed during dispatch
    #[error("Action #{index} ({action}) failed: {source}")]
    Action {
        index: usize,
        action: String,
        source: ActionError,
    },

    /// Run output file error
    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}
