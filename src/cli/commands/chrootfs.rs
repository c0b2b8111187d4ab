//! Chrootfs command implementation
//!
//! Implements `chimg chrootfs` to apply a configuration to a chroot tree.

use std::path::PathBuf;

use crate::cli::output::{self, status};
use crate::core::config::Config;
use crate::core::context::ExecutionContext;
use crate::core::engine::Engine;
use crate::core::outputs::OutputFiles;
use crate::error::ChimgError;
use crate::infra::chroot::ChrootExecutor;

/// Chrootfs options
#[derive(Debug)]
pub struct ChrootfsOptions {
    /// Path to the config file
    pub config: PathBuf,
    /// Path to the chroot tree
    pub rootfs_path: PathBuf,
    /// Base name for output files
    pub output_files_name: Option<PathBuf>,
    /// Overwrite existing output files
    pub overwrite: bool,
    /// Print the run report as JSON
    pub json: bool,
}

/// Execute the chrootfs command
pub fn execute(options: &ChrootfsOptions) -> Result<(), ChimgError> {
    let config = Config::load(&options.config)?;
    let engine = Engine::new(&options.rootfs_path);

    let spinner = (!options.json).then(|| output::create_spinner("Applying chroot actions"));
    let result = engine.apply(&config);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = result?;

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
        );
    } else {
        for result in &report.results {
            if result.success {
                println!("{} {} — {}", status::SUCCESS, result.action, result.summary);
            } else {
                println!(
                    "{} {} — {}",
                    status::ERROR,
                    result.action,
                    result.error.as_deref().unwrap_or("failed")
                );
            }
        }
    }

    if report.succeeded() {
        if let Some(base) = &options.output_files_name {
            write_output_files(&options.rootfs_path, base, options.overwrite)?;
        }
        if !options.json {
            println!(
                "{} Applied {} actions to {}",
                status::SUCCESS,
                report.results.len(),
                options.rootfs_path.display()
            );
        }
    }

    report.into_result().map(|_| ())
}

/// Emit the .manifest/.filelist pair against the (now unmounted) tree.
fn write_output_files(
    rootfs_path: &PathBuf,
    base: &PathBuf,
    overwrite: bool,
) -> Result<(), ChimgError> {
    let root = ExecutionContext::resolve(rootfs_path)?;
    let ctx = ExecutionContext::new(root, Vec::new());
    let executor = ChrootExecutor::new();
    OutputFiles::new(base, overwrite).write(&ctx, &executor)?;
    Ok(())
}
