//! Step sequencer
//!
//! An operation is a fixed, ordered list of [`StepDescriptor`]s. The
//! [`Sequencer`] runs them one at a time against a [`StepRunner`], records an
//! outcome per step into the [`Report`] and stops at the first fatal failure.

use async_trait::async_trait;
use rtctl_core::{Report, StepOutcome, Summary};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Identifier of a step within an operation
pub trait StepId: Copy + std::fmt::Debug + Send + Sync + 'static {
    /// Stable machine name, as recorded in the report
    fn name(&self) -> &'static str;
}

/// Executes the body of each step of an operation
#[async_trait]
pub trait StepRunner: Send {
    type Step: StepId;

    async fn run_step(&mut self, step: Self::Step) -> Result<()>;
}

/// What a failing step does to the rest of the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the sequence
    #[default]
    Fatal,
    /// Record the failure and keep going
    Continue,
    /// Keep going only when the operation is forced
    ContinueWhenForced,
}

/// A step in an operation's catalog
pub struct StepDescriptor<R: StepRunner> {
    pub step: R::Step,
    /// Operator-facing label
    pub label: String,
    pub policy: FailurePolicy,
    /// Whether the outcome goes into the summary
    pub summarize: bool,
    /// Evaluated right before the step would run
    pub skip_if: Option<fn(&R) -> bool>,
    /// Remedial hint attached to a fatal failure
    pub hint: Option<String>,
    /// Once this step completes, failures are no longer compensated
    pub point_of_no_return: bool,
}

impl<R: StepRunner> StepDescriptor<R> {
    pub fn new(step: R::Step, label: impl Into<String>) -> Self {
        Self {
            step,
            label: label.into(),
            policy: FailurePolicy::Fatal,
            summarize: true,
            skip_if: None,
            hint: None,
            point_of_no_return: false,
        }
    }

    pub fn continue_on_failure(mut self) -> Self {
        self.policy = FailurePolicy::Continue;
        self
    }

    pub fn continue_when_forced(mut self) -> Self {
        self.policy = FailurePolicy::ContinueWhenForced;
        self
    }

    /// Keep the outcome out of the summary
    pub fn quiet(mut self) -> Self {
        self.summarize = false;
        self
    }

    pub fn skip_if(mut self, predicate: fn(&R) -> bool) -> Self {
        self.skip_if = Some(predicate);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn point_of_no_return(mut self) -> Self {
        self.point_of_no_return = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.step.name()
    }

    fn is_fatal(&self, error: &Error, forced: bool) -> bool {
        if error.is_cancelled() {
            return true;
        }
        match self.policy {
            FailurePolicy::Fatal => true,
            FailurePolicy::Continue => false,
            FailurePolicy::ContinueWhenForced => !forced,
        }
    }
}

/// Runs step catalogs strictly in order
pub struct Sequencer<'a> {
    cancel: &'a CancellationToken,
    summary: &'a Summary,
    forced: bool,
}

impl<'a> Sequencer<'a> {
    pub fn new(cancel: &'a CancellationToken, summary: &'a Summary) -> Self {
        Self {
            cancel,
            summary,
            forced: false,
        }
    }

    /// Let [`FailurePolicy::ContinueWhenForced`] steps continue past failures
    pub fn forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    /// Run `steps` in order.
    ///
    /// Every step that is reached gets exactly one outcome in `report`. The
    /// first fatal failure is returned as [`Error::Step`] and no later step
    /// runs. Cancellation is always fatal.
    pub async fn run<R: StepRunner>(
        &self,
        runner: &mut R,
        steps: &[StepDescriptor<R>],
        report: &mut Report,
    ) -> Result<()> {
        for desc in steps {
            let name = desc.name();

            if desc.skip_if.is_some_and(|skip| skip(&*runner)) {
                tracing::debug!(step = name, "skipping step");
                report.record(StepOutcome::skipped(name, &desc.label, desc.summarize));
                continue;
            }

            tracing::info!(step = name, "{}", desc.label);
            let started = Instant::now();
            let result = if self.cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(Error::Cancelled),
                    result = runner.run_step(desc.step) => result,
                }
            };
            let elapsed = started.elapsed();

            let error = match result {
                Ok(()) => {
                    report.record(
                        StepOutcome::succeeded(name, &desc.label, desc.summarize).with_duration(elapsed),
                    );
                    if desc.summarize {
                        self.summary.info(&desc.label);
                    }
                    if desc.point_of_no_return {
                        report.mark_point_of_no_return(name);
                    }
                    continue;
                }
                Err(error) => error,
            };

            let fatal = desc.is_fatal(&error, self.forced);
            report.record(
                StepOutcome::failed(name, &desc.label, error.to_string(), fatal, desc.summarize)
                    .with_duration(elapsed),
            );
            if desc.summarize {
                self.summary.error(format!("{}: {}", desc.label, error));
            }

            if fatal {
                tracing::warn!(step = name, error = %error, "step failed");
                if let Some(hint) = &desc.hint {
                    self.summary.info(hint);
                }
                return Err(Error::Step {
                    step: name.to_string(),
                    label: desc.label.clone(),
                    source: Box::new(error),
                    hint: desc.hint.clone(),
                });
            }

            tracing::warn!(step = name, error = %error, "step failed, continuing");
            if desc.point_of_no_return {
                report.mark_point_of_no_return(name);
            }
        }
        Ok(())
    }
}
