//! rtctl Orchestrator - Install, uninstall and upgrade of rtctl runtimes
//!
//! This crate provides:
//! - **Preflight**: read-only checks before an installation changes anything
//! - **Sequencer**: ordered step execution with per-step failure policies
//! - **Poll**: bounded waits with cooperative cancellation
//! - **Rollback**: compensation of failed installations
//! - **Emitter**: runtime resources persisted into the installation repository
//! - **Orchestrator**: the facade tying them together
//!
//! Every operation takes a root [`CancellationToken`](tokio_util::sync::CancellationToken);
//! cancelling it stops polling and sequencing without rolling back.

pub mod context;
pub mod emitter;
pub mod error;
pub mod install;
pub mod orchestrator;
pub mod poll;
pub mod preflight;
pub mod prepare;
pub mod rollback;
pub mod sequencer;
pub mod status;
pub mod uninstall;
pub mod upgrade;

pub use context::OperationContext;
pub use emitter::{
    APP_PROXY_PATH, APP_PROXY_PORT, APP_PROXY_SERVICE, AppProxyIngress, AppProxyParams, BootstrapParams,
    ComponentApp, GitSourceParams, ManifestEmitter, MasterIngress, RepoEmitter, WorkflowsIngress,
    join_manifests,
};
pub use error::{Error, PreflightCheck, Result};
pub use install::{InstallRunner, InstallStep, install_steps};
pub use orchestrator::{Orchestrator, Outcome};
pub use poll::{Attempt, wait_until};
pub use preflight::{Preflight, Rebinding, Validated};
pub use prepare::{Prompter, ResolvedIngress, resolve_ingress, runtime_bindings};
pub use rollback::{RollbackDecision, SkipReason, SummaryGuard, classify, compensate};
pub use sequencer::{FailurePolicy, Sequencer, StepDescriptor, StepId, StepRunner};
pub use status::{ComponentSnapshot, ProgressMonitor, StatusCache, render_components};
pub use uninstall::{UninstallRunner, UninstallStep, uninstall_steps};
pub use upgrade::{UpgradeRunner, UpgradeStep, upgrade_steps};
