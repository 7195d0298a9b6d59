//! rtctl Core - Core types for the runtime installer
//!
//! This crate provides the types shared by every other rtctl crate:
//! - `RuntimeDefinition`: the versioned list of runtime components
//! - `InstallationRequest` / `UninstallRequest` / `UpgradeRequest`: operation inputs
//! - `Report`: append-only record of step outcomes
//! - `Summary`: operator-facing summary, flushed once per operation
//! - `Settings`: CLI settings with defaults

pub mod definition;
pub mod error;
pub mod report;
pub mod request;
pub mod settings;
pub mod summary;

pub use definition::{Bindings, ComponentDescriptor, RuntimeDefinition, RuntimeSpec};
pub use error::{CoreError, Result};
pub use report::{Operation, Report, StepOutcome, StepStatus};
pub use request::{
    IngressParams, InstallFlags, InstallationRequest, RepoLocation, UninstallRequest,
    UpgradeRequest, ingress_host_name, repo_host, validate_runtime_name,
};
pub use settings::{ClusterRequirements, DocLinks, PollSettings, Settings, WaitSettings, WellKnownNames};
pub use summary::{Severity, Summary, SummaryEntry, render_plain};
