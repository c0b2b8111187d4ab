//! chimg CLI - declarative chroot customizer
//!
//! Entry point for the chimg command-line application.

use std::sync::Arc;

use clap::Parser;

use chimg::cli::{exit_code, Cli};

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = cli.run() {
        eprintln!("✗ {e}");
        std::process::exit(exit_code(&e));
    }
}

/// Initialize the tracing subscriber from the CLI logging flags.
///
/// Without --log-console or --log-file only warnings and errors reach
/// stderr; the run report itself goes to stdout either way.
fn init_tracing(cli: &Cli) {
    let level: tracing::Level = if cli.log_console || cli.log_file.is_some() {
        cli.log_level.into()
    } else {
        tracing::Level::WARN
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if let Some(path) = &cli.log_file {
        match std::fs::File::create(path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .init();
            }
            Err(e) => {
                eprintln!("✗ Failed to open log file '{}': {e}", path.display());
                std::process::exit(1);
            }
        }
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
