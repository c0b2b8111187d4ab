//! Ordered action dispatch
//!
//! Walks the declared action list strictly in order and invokes the
//! matching handler for each entry. A failure stops the run: completed
//! actions are not rolled back, and no entry past the failing one is
//! attempted or reported.

use serde::Serialize;

use crate::core::action::Action;
use crate::core::actions::command::CommandRunner;
use crate::core::actions::files::FileWriter;
use crate::core::actions::kernel::KernelReplacer;
use crate::core::actions::packages::PackageInstaller;
use crate::core::actions::ActionHandler;
use crate::core::context::ExecutionContext;
use crate::error::{ActionError, ChimgError};
use crate::infra::chroot::ChrootExecutor;

/// Outcome of one dispatched action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// Position in the declared action list
    pub index: usize,
    /// Action identity string
    pub action: String,
    /// Whether the handler succeeded
    pub success: bool,
    /// Side-effects summary (empty on failure)
    pub summary: String,
    /// Rendered error (present on failure)
    pub error: Option<String>,
}

/// The typed error that stopped a run.
#[derive(Debug)]
pub struct ActionFailure {
    /// Position in the declared action list
    pub index: usize,
    /// Action identity string
    pub action: String,
    /// The handler error
    pub error: ActionError,
}

/// Ordered results of one run, truncated at the first failure.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// One entry per dispatched action, in declaration order
    pub results: Vec<ActionResult>,
    #[serde(skip)]
    failure: Option<ActionFailure>,
}

impl RunReport {
    /// True when every declared action succeeded.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// The failure that truncated the run, if any.
    pub fn failure(&self) -> Option<&ActionFailure> {
        self.failure.as_ref()
    }

    /// Convert into a plain result, surfacing the triggering error.
    pub fn into_result(self) -> Result<Vec<ActionResult>, ChimgError> {
        match self.failure {
            None => Ok(self.results),
            Some(failure) => Err(ChimgError::Action {
                index: failure.index,
                action: failure.action,
                source: failure.error,
            }),
        }
    }
}

/// Dispatches the declared actions through their handlers.
#[derive(Debug)]
pub struct ActionDispatcher<'a> {
    executor: &'a ChrootExecutor,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(executor: &'a ChrootExecutor) -> Self {
        Self { executor }
    }

    /// Apply the actions strictly in declaration order.
    pub fn run(&self, ctx: &ExecutionContext, actions: &[Action]) -> RunReport {
        let mut results = Vec::with_capacity(actions.len());

        for (index, action) in actions.iter().enumerate() {
            let identity = action.identity();
            tracing::info!("Applying action #{index}: {identity}");

            match self.apply(ctx, action) {
                Ok(summary) => {
                    results.push(ActionResult {
                        index,
                        action: identity,
                        success: true,
                        summary,
                        error: None,
                    });
                }
                Err(error) => {
                    tracing::error!("Action #{index} ({identity}) failed: {error}");
                    results.push(ActionResult {
                        index,
                        action: identity.clone(),
                        success: false,
                        summary: String::new(),
                        error: Some(error.to_string()),
                    });
                    return RunReport {
                        results,
                        failure: Some(ActionFailure {
                            index,
                            action: identity,
                            error,
                        }),
                    };
                }
            }
        }

        RunReport {
            results,
            failure: None,
        }
    }

    fn apply(&self, ctx: &ExecutionContext, action: &Action) -> Result<String, ActionError> {
        match action {
            Action::InstallPackages { packages, hold } => {
                PackageInstaller::new(packages, hold).apply(ctx, self.executor)
            }
            Action::ReplaceKernel { package, flavor } => {
                KernelReplacer::new(package, flavor.as_deref()).apply(ctx, self.executor)
            }
            Action::CreateFile {
                destination,
                content,
                source,
                mode,
                owner,
                group,
            } => FileWriter::new(
                destination,
                content.as_deref(),
                source.as_deref(),
                mode.as_deref(),
                *owner,
                *group,
            )
            .apply(ctx, self.executor),
            Action::RunCommand { command } => {
                CommandRunner::new(command).apply(ctx, self.executor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_results_only() {
        let report = RunReport {
            results: vec![ActionResult {
                index: 0,
                action: "create_file[/etc/hostname]".to_string(),
                success: true,
                summary: "wrote /etc/hostname (7 bytes)".to_string(),
                error: None,
            }],
            failure: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["index"], 0);
        assert!(json.get("failure").is_none());
    }

    #[test]
    fn test_into_result_surfaces_failure() {
        let report = RunReport {
            results: Vec::new(),
            failure: Some(ActionFailure {
                index: 2,
                action: "run_command[false]".to_string(),
                error: ActionError::Command(crate::error::CommandError::Failed {
                    exit_code: 1,
                    stderr: String::new(),
                }),
            }),
        };
        let err = report.into_result().unwrap_err();
        match err {
            ChimgError::Action { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error {other}"),
        }
    }
}
