//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod chrootfs;

use std::path::PathBuf;

use clap::Subcommand;

use crate::error::ChimgError;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply a configuration to a chroot filesystem tree
    Chrootfs {
        /// Path to the chimg config file
        config: PathBuf,

        /// Path to the rootfs directory to work with
        rootfs_path: PathBuf,

        /// Base name for the .manifest/.filelist output files
        #[arg(long)]
        output_files_name: Option<PathBuf>,

        /// Overwrite existing output files
        #[arg(long)]
        overwrite: bool,
    },
}

impl Commands {
    /// Execute the command
    pub fn run(self, json: bool) -> Result<(), ChimgError> {
        match self {
            Commands::Chrootfs {
                config,
                rootfs_path,
                output_files_name,
                overwrite,
            } => chrootfs::execute(&chrootfs::ChrootfsOptions {
                config,
                rootfs_path,
                output_files_name,
                overwrite,
                json,
            }),
        }
    }
}
