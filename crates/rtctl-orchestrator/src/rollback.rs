//! Rollback of failed installations
//!
//! Rollback is a separate phase that starts once the forward sequence has
//! returned: [`classify`] decides whether the failure is compensated, and
//! [`compensate`] runs a forced uninstall. A compensation failure is logged
//! and summarized but never replaces the forward error.

use rtctl_core::{InstallationRequest, Operation, Report, SummaryEntry, UninstallRequest};

use crate::context::OperationContext;
use crate::error::Error;
use crate::sequencer::Sequencer;
use crate::uninstall::{UninstallRunner, uninstall_steps};

/// Why a failed installation is left as is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Pre-flight rejected the request, nothing was changed
    Validation,
    Cancelled,
    /// Disabled by the operator
    Disabled,
    /// Recovery installs never roll back
    Recovery,
    /// The runtime already synced
    PastPointOfNoReturn,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::Validation => "validation failed",
            SkipReason::Cancelled => "operation cancelled",
            SkipReason::Disabled => "rollback disabled",
            SkipReason::Recovery => "recovery install",
            SkipReason::PastPointOfNoReturn => "runtime already synced",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackDecision {
    Compensate,
    Skip(SkipReason),
}

/// Decide whether a failed installation is compensated
pub fn classify(error: &Error, request: &InstallationRequest, report: &Report) -> RollbackDecision {
    let reason = if error.is_validation() {
        SkipReason::Validation
    } else if error.is_cancelled() {
        SkipReason::Cancelled
    } else if request.flags.from_repo {
        SkipReason::Recovery
    } else if !request.rollback_enabled() {
        SkipReason::Disabled
    } else if report.past_point_of_no_return() {
        SkipReason::PastPointOfNoReturn
    } else {
        return RollbackDecision::Compensate;
    };
    RollbackDecision::Skip(reason)
}

/// Uninstall the runtime with force semantics.
///
/// Returns the uninstall report; its failures only reach the summary and
/// the log.
pub async fn compensate(ctx: &OperationContext, runtime: &str, error: &Error) -> Report {
    tracing::warn!(
        runtime,
        "installation failed due to error : {}, performing installation rollback",
        error
    );
    ctx.summary.info("----------Uninstalling runtime----------");

    let mut runner = UninstallRunner::new(ctx.clone(), UninstallRequest::forced(runtime));
    let mut report = Report::new(Operation::Uninstall, runtime);
    let result = Sequencer::new(&ctx.cancel, &ctx.summary)
        .forced(true)
        .run(&mut runner, &uninstall_steps(), &mut report)
        .await;

    match result {
        Ok(()) => ctx.summary.info("Uninstall phase finished after rollback"),
        Err(e) => {
            tracing::error!(runtime, error = %e, "installation rollback failed");
            ctx.summary.error(format!("installation rollback failed: {}", e));
        }
    }
    report
}

/// Flushes a summary when dropped, whichever way the operation ended
pub struct SummaryGuard<F: FnOnce(&[SummaryEntry])> {
    summary: rtctl_core::Summary,
    render: Option<F>,
}

impl<F: FnOnce(&[SummaryEntry])> SummaryGuard<F> {
    pub fn new(summary: rtctl_core::Summary, render: F) -> Self {
        Self {
            summary,
            render: Some(render),
        }
    }
}

impl<F: FnOnce(&[SummaryEntry])> Drop for SummaryGuard<F> {
    fn drop(&mut self) {
        if let Some(render) = self.render.take() {
            self.summary.flush(render);
        }
    }
}
