//! Runtime upgrade
//!
//! Nothing is written before the versions have been compared, so a rejected
//! upgrade leaves the repository untouched.

use async_trait::async_trait;
use rtctl_core::{ComponentDescriptor, RuntimeDefinition, UpgradeRequest};
use rtctl_repo::RepoError;

use crate::context::OperationContext;
use crate::emitter::ComponentApp;
use crate::error::{Error, Result};
use crate::sequencer::{StepDescriptor, StepId, StepRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStep {
    Download,
    LoadCurrent,
    CompareVersions,
    PushDefinition,
    InstallComponents,
}

impl StepId for UpgradeStep {
    fn name(&self) -> &'static str {
        match self {
            UpgradeStep::Download => "download-definition",
            UpgradeStep::LoadCurrent => "load-definition",
            UpgradeStep::CompareVersions => "compare-versions",
            UpgradeStep::PushDefinition => "push-definition",
            UpgradeStep::InstallComponents => "install-new-components",
        }
    }
}

/// The upgrade catalog
pub fn upgrade_steps(download_cli: &str) -> Vec<StepDescriptor<UpgradeRunner>> {
    vec![
        StepDescriptor::new(UpgradeStep::Download, "Downloading runtime definition")
            .with_hint(format!("Download the latest version from {}", download_cli)),
        StepDescriptor::new(UpgradeStep::LoadCurrent, "Loading runtime definition"),
        StepDescriptor::new(UpgradeStep::CompareVersions, "Comparing runtime versions"),
        StepDescriptor::new(UpgradeStep::PushDefinition, "Pushing new runtime definition"),
        StepDescriptor::new(UpgradeStep::InstallComponents, "Install new components").continue_on_failure(),
    ]
}

/// Executes upgrade steps for one runtime
pub struct UpgradeRunner {
    ctx: OperationContext,
    request: UpgradeRequest,
    newer: Option<RuntimeDefinition>,
    current: Option<RuntimeDefinition>,
    upgraded: Option<RuntimeDefinition>,
    new_components: Vec<ComponentDescriptor>,
}

impl UpgradeRunner {
    pub fn new(ctx: OperationContext, request: UpgradeRequest) -> Self {
        Self {
            ctx,
            request,
            newer: None,
            current: None,
            upgraded: None,
            new_components: Vec::new(),
        }
    }

    /// The definition pushed by the upgrade
    pub fn upgraded(&self) -> Option<&RuntimeDefinition> {
        self.upgraded.as_ref()
    }

    fn target(&self) -> String {
        self.request
            .version
            .as_ref()
            .map(|v| format!("v{v}"))
            .unwrap_or_else(|| "the latest version".to_string())
    }

    async fn download(&mut self) -> Result<()> {
        let out_of_date = || {
            Error::Failed(format!(
                "your cli version is out of date. please upgrade your CLI before upgrading to {}",
                self.target()
            ))
        };

        let newer = match self
            .ctx
            .registry
            .download(&self.request.name, self.request.version.as_ref())
            .await
        {
            Ok(newer) => newer,
            Err(RepoError::UnsupportedDefinition { .. }) => return Err(out_of_date()),
            Err(e) => return Err(e.into()),
        };
        if !newer.is_supported_by(&self.ctx.settings.max_def_version) {
            return Err(out_of_date());
        }
        self.newer = Some(newer);
        Ok(())
    }

    async fn load_current(&mut self) -> Result<()> {
        self.current = Some(self.ctx.emitter.load_definition(&self.request.name).await?);
        Ok(())
    }

    fn compare_versions(&mut self) -> Result<()> {
        let (Some(current), Some(newer)) = (&self.current, &self.newer) else {
            return Err(Error::Failed("runtime definitions are not loaded".to_string()));
        };
        let (upgraded, new_components) = current.upgrade_to(newer)?;
        tracing::info!(
            runtime = %self.request.name,
            from = %current.version(),
            to = %upgraded.version(),
            new_components = new_components.len(),
            "upgrading runtime"
        );
        self.upgraded = Some(upgraded);
        self.new_components = new_components;
        Ok(())
    }

    async fn push_definition(&mut self) -> Result<()> {
        let upgraded = self
            .upgraded
            .as_ref()
            .ok_or_else(|| Error::Failed("upgraded definition is missing".to_string()))?;
        self.ctx
            .emitter
            .persist_definition(upgraded, &format!("Upgraded to {}", upgraded.version()))
            .await
    }

    async fn install_components(&mut self) -> Result<()> {
        let Some(upgraded) = &self.upgraded else {
            return Ok(());
        };
        if self.new_components.is_empty() {
            return Ok(());
        }
        let components: Vec<ComponentApp> = self
            .new_components
            .iter()
            .map(|c| ComponentApp {
                name: c.name.clone(),
                source: upgraded.component_specifier(c),
            })
            .collect();
        self.ctx
            .emitter
            .create_components(&self.request.name, &components)
            .await
    }
}

#[async_trait]
impl StepRunner for UpgradeRunner {
    type Step = UpgradeStep;

    async fn run_step(&mut self, step: UpgradeStep) -> Result<()> {
        match step {
            UpgradeStep::Download => self.download().await,
            UpgradeStep::LoadCurrent => self.load_current().await,
            UpgradeStep::CompareVersions => self.compare_versions(),
            UpgradeStep::PushDefinition => self.push_definition().await,
            UpgradeStep::InstallComponents => self.install_components().await,
        }
    }
}
