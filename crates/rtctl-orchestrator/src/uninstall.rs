//! Runtime uninstallation
//!
//! Also used by rollback, which runs it forced and without checks.

use async_trait::async_trait;
use rtctl_core::UninstallRequest;

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::poll::{Attempt, wait_until};
use crate::sequencer::{StepDescriptor, StepId, StepRunner};

const SKIP_CHECKS_HINT: &str = "you can attempt to uninstall again with the \"--skip-checks\" flag";
const FORCE_HINT: &str = "you can attempt to uninstall again with the \"--force\" flag";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallStep {
    CheckExists,
    RemoveGitIntegrations,
    RemoveFromSharedConfig,
    UninstallRepo,
    DeleteFromPlatform,
}

impl StepId for UninstallStep {
    fn name(&self) -> &'static str {
        match self {
            UninstallStep::CheckExists => "check-runtime-exists",
            UninstallStep::RemoveGitIntegrations => "remove-git-integrations",
            UninstallStep::RemoveFromSharedConfig => "remove-runtime-from-shared-config",
            UninstallStep::UninstallRepo => "uninstall-repo",
            UninstallStep::DeleteFromPlatform => "delete-runtime-from-platform",
        }
    }
}

/// The uninstall catalog
pub fn uninstall_steps() -> Vec<StepDescriptor<UninstallRunner>> {
    vec![
        StepDescriptor::new(UninstallStep::CheckExists, "Checking if runtime exists")
            .continue_when_forced()
            .skip_if(|r: &UninstallRunner| r.request.skip_checks)
            .with_hint(SKIP_CHECKS_HINT),
        StepDescriptor::new(UninstallStep::RemoveGitIntegrations, "Removing git integrations")
            .continue_when_forced()
            .with_hint(FORCE_HINT),
        StepDescriptor::new(
            UninstallStep::RemoveFromSharedConfig,
            "Removing runtime from shared config repo",
        )
        .continue_when_forced()
        .with_hint(FORCE_HINT),
        StepDescriptor::new(UninstallStep::UninstallRepo, "Uninstalling repo")
            .continue_when_forced()
            .with_hint(FORCE_HINT),
        StepDescriptor::new(UninstallStep::DeleteFromPlatform, "Deleting runtime from platform"),
    ]
}

/// Executes uninstall steps for one runtime
pub struct UninstallRunner {
    ctx: OperationContext,
    request: UninstallRequest,
}

impl UninstallRunner {
    pub fn new(ctx: OperationContext, request: UninstallRequest) -> Self {
        Self { ctx, request }
    }

    async fn check_exists(&mut self) -> Result<()> {
        self.ctx.platform.get_runtime(&self.request.name).await?;
        Ok(())
    }

    async fn remove_git_integrations(&mut self) -> Result<()> {
        match self.ctx.platform.remove_git_integrations(&self.request.name).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => Ok(other?),
        }
    }

    /// Accounts without a shared config repo have nothing to remove
    async fn remove_from_shared_config(&mut self) -> Result<()> {
        let runtime = self.request.name.as_str();
        if self.ctx.platform.shared_config_repo().await?.is_none() {
            tracing::info!(runtime, "shared config repo not defined, skipping removal");
            return Ok(());
        }
        match self.ctx.platform.remove_runtime_from_shared_config(runtime).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => Ok(other?),
        }
    }

    async fn uninstall_repo(&mut self) -> Result<()> {
        let monitor = self.ctx.progress(&self.request.name);
        let result = self.remove_runtime_resources().await;
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        result
    }

    async fn remove_runtime_resources(&self) -> Result<()> {
        let runtime = self.request.name.as_str();
        self.ctx.emitter.remove_runtime(runtime).await?;
        self.ctx.cluster.delete_namespace(runtime).await?;

        let cluster = self.ctx.cluster.clone();
        wait_until(
            "runtime namespace to be deleted",
            self.ctx.settings.wait.uninstall,
            &self.ctx.cancel,
            || {
                let cluster = cluster.clone();
                async move {
                    Ok::<_, Error>(if cluster.namespace_exists(runtime).await? {
                        Attempt::Pending
                    } else {
                        Attempt::Done(())
                    })
                }
            },
        )
        .await
    }

    async fn delete_from_platform(&mut self) -> Result<()> {
        match self.ctx.platform.delete_runtime(&self.request.name).await {
            Err(e) if e.is_not_found() && self.request.force => {
                tracing::debug!(runtime = %self.request.name, "runtime already gone from platform");
                Ok(())
            }
            other => Ok(other?),
        }
    }
}

#[async_trait]
impl StepRunner for UninstallRunner {
    type Step = UninstallStep;

    async fn run_step(&mut self, step: UninstallStep) -> Result<()> {
        match step {
            UninstallStep::CheckExists => self.check_exists().await,
            UninstallStep::RemoveGitIntegrations => self.remove_git_integrations().await,
            UninstallStep::RemoveFromSharedConfig => self.remove_from_shared_config().await,
            UninstallStep::UninstallRepo => self.uninstall_repo().await,
            UninstallStep::DeleteFromPlatform => self.delete_from_platform().await,
        }
    }
}
