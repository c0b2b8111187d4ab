//! Chroot subprocess execution
//!
//! Runs commands with their filesystem root reassigned to the target tree.
//! The reassignment happens in the spawned child via chroot(8); the calling
//! process never changes its own root.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::Command;

use crate::config::defaults;
use crate::core::context::ExecutionContext;
use crate::error::ExecError;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Exit code, or -1 if terminated by signal
    pub exit_code: i32,
    /// Captured stdout as a string
    pub stdout: String,
    /// Captured stderr as a string
    pub stderr: String,
}

impl ExecOutput {
    /// Returns true if the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get stdout, trimmed of surrounding whitespace
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// The tail of stderr carried into error values
    pub fn stderr_tail(&self) -> String {
        stderr_tail(&self.stderr)
    }
}

/// Last [`defaults::STDERR_TAIL_LINES`] lines of a stderr capture.
pub fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(defaults::STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Run a command on the host (outside the chroot) and capture its output.
pub fn run_host(program: &str, args: &[&str]) -> Result<ExecOutput, ExecError> {
    tracing::debug!("Running host command: {program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ExecError::Spawn {
            program: program.to_string(),
            error: e.to_string(),
        })?;
    Ok(capture(output))
}

fn capture(output: std::process::Output) -> ExecOutput {
    ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

/// Executes subprocesses with their root reassigned to the chroot tree.
#[derive(Debug)]
pub struct ChrootExecutor {
    chroot_bin: PathBuf,
}

impl ChrootExecutor {
    /// Create an executor, locating the chroot(8) binary.
    ///
    /// The hard availability check happens in the engine preflight; here a
    /// missing binary falls back to the conventional path so the spawn
    /// error surfaces with full context if it is ever reached.
    pub fn new() -> Self {
        let chroot_bin =
            which::which("chroot").unwrap_or_else(|_| PathBuf::from("/usr/sbin/chroot"));
        Self { chroot_bin }
    }

    /// Run a program inside the chroot with the engine-provided environment.
    pub fn run(
        &self,
        ctx: &ExecutionContext,
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput, ExecError> {
        self.run_with_env(ctx, program, args, &[])
    }

    /// Run a program inside the chroot with additional environment entries.
    pub fn run_with_env(
        &self,
        ctx: &ExecutionContext,
        program: &str,
        args: &[&str],
        extra_env: &[(&str, &str)],
    ) -> Result<ExecOutput, ExecError> {
        tracing::debug!(
            "Running in chroot {}: {program} {}",
            ctx.chroot_path().display(),
            args.join(" ")
        );

        let mut cmd = Command::new(&self.chroot_bin);
        cmd.arg(ctx.chroot_path()).arg(program).args(args);

        // The chroot'd process gets exactly the engine-provided environment,
        // never an inherited one.
        cmd.env_clear();
        for (key, value) in defaults::CHROOT_BASE_ENV {
            cmd.env(key, value);
        }
        for (key, value) in extra_env {
            cmd.env(key, value);
        }

        let output = cmd.output().map_err(|e| ExecError::Spawn {
            program: program.to_string(),
            error: e.to_string(),
        })?;

        let result = capture(output);
        if !result.success() {
            tracing::debug!(
                "chroot command '{program}' exited {}: {}",
                result.exit_code,
                result.stderr.trim_end()
            );
        }
        Ok(result)
    }

    /// Run a shell script body inside the chroot.
    ///
    /// The body is staged as an executable temporary file inside the chroot
    /// root and invoked by its in-chroot absolute path. The staged file is
    /// removed on every path, including failures.
    pub fn run_script(
        &self,
        ctx: &ExecutionContext,
        body: &str,
    ) -> Result<ExecOutput, ExecError> {
        let mut script = tempfile::Builder::new()
            .prefix(defaults::CHROOT_TMP_PREFIX)
            .tempfile_in(ctx.chroot_path())
            .map_err(|e| ExecError::Script {
                path: ctx.chroot_path().to_path_buf(),
                error: e.to_string(),
            })?;

        script
            .write_all(body.as_bytes())
            .and_then(|()| {
                script
                    .as_file()
                    .set_permissions(std::fs::Permissions::from_mode(0o700))
            })
            .map_err(|e| ExecError::Script {
                path: script.path().to_path_buf(),
                error: e.to_string(),
            })?;

        let name = script
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // The NamedTempFile stays alive (and on disk) until after the run.
        self.run(ctx, &format!("/{name}"), &[])
    }
}

impl Default for ChrootExecutor {
    fn default() -> Self {
        Self::new()
    }
}
