//! Step outcomes and the per-operation report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level operation a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Install,
    Uninstall,
    Upgrade,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Install => write!(f, "install"),
            Operation::Uninstall => write!(f, "uninstall"),
            Operation::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// What happened to a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    /// Stable step identifier
    pub name: String,

    /// Human readable label
    pub label: String,

    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the failure stopped the sequence
    pub fatal: bool,

    /// Whether the outcome belongs in the summary
    pub summarize: bool,

    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl StepOutcome {
    pub fn succeeded(name: impl Into<String>, label: impl Into<String>, summarize: bool) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            status: StepStatus::Succeeded,
            error: None,
            fatal: false,
            summarize,
            duration: Duration::ZERO,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        label: impl Into<String>,
        error: impl Into<String>,
        fatal: bool,
        summarize: bool,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            status: StepStatus::Failed,
            error: Some(error.into()),
            fatal,
            summarize,
            duration: Duration::ZERO,
        }
    }

    pub fn skipped(name: impl Into<String>, label: impl Into<String>, summarize: bool) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            status: StepStatus::Skipped,
            error: None,
            fatal: false,
            summarize,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Append-only record of step outcomes for one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub operation: Operation,

    pub runtime: String,

    pub started_at: DateTime<Utc>,

    outcomes: Vec<StepOutcome>,

    /// Set once a step marked as the point of no return has completed
    point_of_no_return: Option<String>,
}

impl Report {
    pub fn new(operation: Operation, runtime: impl Into<String>) -> Self {
        Self {
            operation,
            runtime: runtime.into(),
            started_at: Utc::now(),
            outcomes: Vec::new(),
            point_of_no_return: None,
        }
    }

    pub fn record(&mut self, outcome: StepOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Outcome that stopped the sequence, if any
    pub fn fatal_failure(&self) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.fatal)
    }

    /// Failures that did not stop the sequence
    pub fn soft_failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure() && !o.fatal)
    }

    pub fn has_soft_failures(&self) -> bool {
        self.soft_failures().next().is_some()
    }

    pub fn mark_point_of_no_return(&mut self, step: impl Into<String>) {
        if self.point_of_no_return.is_none() {
            self.point_of_no_return = Some(step.into());
        }
    }

    /// Whether a failure from now on must not be compensated
    pub fn past_point_of_no_return(&self) -> bool {
        self.point_of_no_return.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tracks_failures() {
        let mut report = Report::new(Operation::Install, "prod");
        report.record(StepOutcome::succeeded("create-runtime", "Creating runtime", true));
        report.record(StepOutcome::failed("wait-sync", "Waiting", "timed out", false, true));
        report.record(StepOutcome::failed("git-integration", "Creating", "boom", true, true));

        assert_eq!(report.len(), 3);
        assert_eq!(report.fatal_failure().map(|o| o.name.as_str()), Some("git-integration"));
        assert_eq!(report.soft_failures().count(), 1);
        assert!(report.has_soft_failures());
    }

    #[test]
    fn test_point_of_no_return_is_sticky() {
        let mut report = Report::new(Operation::Install, "prod");
        assert!(!report.past_point_of_no_return());
        report.mark_point_of_no_return("wait-sync");
        report.mark_point_of_no_return("other");
        assert!(report.past_point_of_no_return());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StepStatus::Skipped.to_string(), "skipped");
        assert_eq!(Operation::Uninstall.to_string(), "uninstall");
    }
}
