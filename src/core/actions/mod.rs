//! Action handlers
//!
//! One handler per action kind, all implementing the common apply contract.
//! The dispatcher matches exhaustively over the action union and invokes
//! the matching handler.

pub mod command;
pub mod files;
pub mod kernel;
pub mod packages;

use crate::core::context::ExecutionContext;
use crate::error::ActionError;
use crate::infra::chroot::ChrootExecutor;

/// The contract every action handler implements.
///
/// On success, `apply` returns a short side-effects summary for the run
/// report. Handlers must be safe to re-apply: nothing persists between
/// runs, so idempotence comes from each handler (or the tool it drives),
/// not from recorded state.
pub trait ActionHandler {
    fn apply(
        &self,
        ctx: &ExecutionContext,
        executor: &ChrootExecutor,
    ) -> Result<String, ActionError>;
}
