//! Orchestrator facade
//!
//! Entry point for install, uninstall, upgrade and list. Each operation
//! appends to the orchestrator's [`Summary`]; flushing it is up to the
//! caller, exactly once, after the operation returned.

use rtctl_core::{
    InstallationRequest, Operation, Report, Settings, Summary, UninstallRequest, UpgradeRequest,
};
use rtctl_kube::Cluster;
use rtctl_platform::{ControlPlane, Runtime};
use rtctl_repo::{DefinitionRegistry, GitRepository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::context::OperationContext;
use crate::emitter::{ManifestEmitter, RepoEmitter};
use crate::error::{Error, Result};
use crate::install::{InstallRunner, install_steps};
use crate::preflight::{Preflight, Rebinding};
use crate::prepare::Prompter;
use crate::rollback::{RollbackDecision, classify, compensate};
use crate::sequencer::Sequencer;
use crate::uninstall::{UninstallRunner, uninstall_steps};
use crate::upgrade::{UpgradeRunner, upgrade_steps};

/// Result of a top-level operation
#[derive(Debug)]
pub struct Outcome {
    /// Outcomes of the forward sequence
    pub report: Report,
    /// Outcomes of the compensating uninstall, when one ran
    pub rollback: Option<Report>,
    pub result: Result<()>,
}

impl Outcome {
    fn new(report: Report, result: Result<()>) -> Self {
        Self {
            report,
            rollback: None,
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }

    /// Whether the operation completed but some lenient step failed
    pub fn completed_with_issues(&self) -> bool {
        self.is_success() && self.report.has_soft_failures()
    }

    pub fn into_result(self) -> Result<Report> {
        self.result.map(|()| self.report)
    }
}

/// Runs runtime operations against a cluster, a control plane and a repository
pub struct Orchestrator {
    cluster: Arc<dyn Cluster>,
    platform: Arc<dyn ControlPlane>,
    emitter: Arc<dyn ManifestEmitter>,
    registry: Arc<dyn DefinitionRegistry>,
    settings: Arc<Settings>,
    summary: Summary,
    prompter: Option<Arc<dyn Prompter>>,
    show_progress: bool,
}

impl Orchestrator {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        platform: Arc<dyn ControlPlane>,
        repo: Arc<dyn GitRepository>,
        registry: Arc<dyn DefinitionRegistry>,
        settings: Settings,
    ) -> Self {
        let emitter = Arc::new(RepoEmitter::new(repo, settings.names.clone()));
        Self {
            cluster,
            platform,
            emitter,
            registry,
            settings: Arc::new(settings),
            summary: Summary::new(),
            prompter: None,
            show_progress: false,
        }
    }

    /// Use a custom manifest emitter
    pub fn with_emitter(mut self, emitter: Arc<dyn ManifestEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Ask `prompter` for ingress class choices and recovery approval
    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Print component statuses while waiting on the runtime
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn context(&self, cancel: &CancellationToken) -> OperationContext {
        OperationContext {
            cluster: self.cluster.clone(),
            platform: self.platform.clone(),
            emitter: self.emitter.clone(),
            registry: self.registry.clone(),
            settings: self.settings.clone(),
            cancel: cancel.clone(),
            summary: self.summary.clone(),
            show_progress: self.show_progress,
        }
    }

    fn summarize_rebinding(&self, rebinding: &Rebinding) {
        for (label, bindings) in [("Previous", &rebinding.previous), ("New", &rebinding.next)] {
            self.summary.info(format!(
                "{} cluster: {}, ingress host: {}, ingress class: {}, ingress controller: {}",
                label,
                bindings.cluster,
                bindings.ingress_host,
                bindings.ingress_class,
                bindings.ingress_controller
            ));
        }
    }

    /// Install a runtime.
    ///
    /// Pre-flight failures change nothing. A fatal step failure is followed
    /// by a forced uninstall unless rollback is disabled, the request is a
    /// recovery, the operation was cancelled or the runtime already synced.
    pub async fn install(&self, request: InstallationRequest, cancel: &CancellationToken) -> Outcome {
        let mut report = Report::new(Operation::Install, &request.name);
        let ctx = self.context(cancel);

        let preflight = Preflight::new(
            self.cluster.as_ref(),
            self.platform.as_ref(),
            self.registry.as_ref(),
            self.emitter.as_ref(),
            &self.settings,
        )
        .with_prompter(self.prompter.as_deref());
        let validated = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            validated = preflight.run(&request) => validated,
        };
        let validated = match validated {
            Ok(validated) => validated,
            Err(e) => {
                self.summary.error(e.to_string());
                if let Some(hint) = e.hint() {
                    self.summary.info(hint);
                }
                return Outcome::new(report, Err(e));
            }
        };

        if let Some(rebinding) = &validated.rebinding {
            self.summarize_rebinding(rebinding);
        }

        let name = request.name.clone();
        let mut runner = InstallRunner::new(ctx.clone(), request.clone(), validated.definition, validated.ingress);
        let result = Sequencer::new(cancel, &self.summary)
            .run(&mut runner, &install_steps(), &mut report)
            .await;

        let Err(error) = result else {
            if request.ingress.skip_ingress {
                for line in runner.skip_ingress_instructions() {
                    self.summary.info(line);
                }
            }
            if report.has_soft_failures() {
                self.summary.info(format!("Runtime \"{}\" installed with some issues", name));
            } else {
                self.summary.info(format!("Runtime \"{}\" installed successfully", name));
            }
            return Outcome::new(report, Ok(()));
        };

        let rollback = match classify(&error, &request, &report) {
            RollbackDecision::Compensate => Some(compensate(&ctx, &name, &error).await),
            RollbackDecision::Skip(reason) => {
                tracing::debug!(runtime = %name, %reason, "not rolling back");
                None
            }
        };
        Outcome {
            report,
            rollback,
            result: Err(error),
        }
    }

    /// Uninstall a runtime
    pub async fn uninstall(&self, request: UninstallRequest, cancel: &CancellationToken) -> Outcome {
        let mut report = Report::new(Operation::Uninstall, &request.name);
        let name = request.name.clone();
        let forced = request.force;

        let mut runner = UninstallRunner::new(self.context(cancel), request);
        let result = Sequencer::new(cancel, &self.summary)
            .forced(forced)
            .run(&mut runner, &uninstall_steps(), &mut report)
            .await;

        if result.is_ok() {
            self.summary.info(format!("Done uninstalling runtime \"{}\"", name));
        }
        Outcome::new(report, result)
    }

    /// Upgrade a runtime to a newer definition
    pub async fn upgrade(&self, request: UpgradeRequest, cancel: &CancellationToken) -> Outcome {
        let mut report = Report::new(Operation::Upgrade, &request.name);
        let name = request.name.clone();

        let mut runner = UpgradeRunner::new(self.context(cancel), request);
        let result = Sequencer::new(cancel, &self.summary)
            .run(&mut runner, &upgrade_steps(&self.settings.docs.download_cli), &mut report)
            .await;

        if result.is_ok() {
            if let Some(upgraded) = runner.upgraded() {
                self.summary.info(format!(
                    "Runtime \"{}\" upgraded to version v{}",
                    name,
                    upgraded.version()
                ));
            }
        }
        Outcome::new(report, result)
    }

    /// Runtimes known to the control plane
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Runtime>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            runtimes = self.platform.list_runtimes() => Ok(runtimes?),
        }
    }
}
