//! In-chroot command handler
//!
//! Runs a configured script body inside the chroot. The body is staged as
//! an executable file in the chroot root and invoked through the executor.

use super::ActionHandler;
use crate::core::context::ExecutionContext;
use crate::error::{ActionError, CommandError};
use crate::infra::chroot::ChrootExecutor;

/// Runs one configured command inside the chroot.
#[derive(Debug)]
pub struct CommandRunner<'a> {
    command: &'a str,
}

impl<'a> CommandRunner<'a> {
    pub fn new(command: &'a str) -> Self {
        Self { command }
    }
}

impl ActionHandler for CommandRunner<'_> {
    fn apply(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<String, ActionError> {
        let body = script_body(self.command);
        let out = executor
            .run_script(ctx, &body)
            .map_err(CommandError::from)?;
        if !out.success() {
            return Err(CommandError::Failed {
                exit_code: out.exit_code,
                stderr: out.stderr_tail(),
            }
            .into());
        }
        Ok(format!("command exited {}", out.exit_code))
    }
}

/// Ensure the staged script is executable by the kernel: bodies without an
/// interpreter line get the default shell.
pub(crate) fn script_body(command: &str) -> String {
    if command.starts_with("#!") {
        command.to_string()
    } else {
        format!("#!/bin/sh\n{command}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_body_adds_interpreter() {
        assert_eq!(script_body("apt-get clean"), "#!/bin/sh\napt-get clean\n");
    }

    #[test]
    fn test_script_body_keeps_existing_interpreter() {
        let body = "#!/bin/bash\nset -e\napt-get clean\n";
        assert_eq!(script_body(body), body);
    }
}
