//! Runtime installation
//!
//! [`install_steps`] is the forward catalog; [`InstallRunner`] carries the
//! state that flows between steps (the runtime token, the definition as its
//! bindings resolve).

use async_trait::async_trait;
use rtctl_core::{Bindings, InstallationRequest, RuntimeDefinition, ingress_host_name};
use rtctl_kube::IngressController;
use rtctl_platform::{GitIntegrationArgs, RuntimeInstallationArgs};
use std::collections::BTreeMap;

use crate::context::OperationContext;
use crate::emitter::{
    AppProxyIngress, AppProxyParams, BootstrapParams, ComponentApp, GitSourceParams, MasterIngress,
    WorkflowsIngress,
};
use crate::error::{Error, Result};
use crate::poll::{Attempt, wait_until};
use crate::prepare::{ResolvedIngress, runtime_bindings};
use crate::sequencer::{StepDescriptor, StepId, StepRunner};

/// Git providers whose accounts can host the marketplace git source
const MARKETPLACE_PROVIDERS: &[&str] = &["github"];

/// Installation steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    CreateRuntime,
    BootstrapRepo,
    PrepareCluster,
    CreateProject,
    PersistConfig,
    ApplySecrets,
    CreateComponents,
    CreateReporters,
    CreateGitSources,
    WaitForSync,
    CreateGitIntegration,
}

impl StepId for InstallStep {
    fn name(&self) -> &'static str {
        match self {
            InstallStep::CreateRuntime => "create-runtime",
            InstallStep::BootstrapRepo => "bootstrap-repository",
            InstallStep::PrepareCluster => "prepare-cluster-environment",
            InstallStep::CreateProject => "create-project",
            InstallStep::PersistConfig => "persist-runtime-config",
            InstallStep::ApplySecrets => "apply-cluster-secrets",
            InstallStep::CreateComponents => "create-components",
            InstallStep::CreateReporters => "create-reporters",
            InstallStep::CreateGitSources => "create-git-sources",
            InstallStep::WaitForSync => "wait-for-runtime-sync",
            InstallStep::CreateGitIntegration => "create-git-integration",
        }
    }
}

/// The forward installation catalog
pub fn install_steps() -> Vec<StepDescriptor<InstallRunner>> {
    vec![
        StepDescriptor::new(InstallStep::CreateRuntime, "Creating runtime on platform"),
        StepDescriptor::new(InstallStep::BootstrapRepo, "Bootstrapping repository"),
        StepDescriptor::new(InstallStep::PrepareCluster, "Preparing cluster environment").quiet(),
        StepDescriptor::new(InstallStep::CreateProject, "Creating Project").skip_if(InstallRunner::recovering),
        StepDescriptor::new(InstallStep::PersistConfig, "Creating/Updating runtime config"),
        StepDescriptor::new(InstallStep::ApplySecrets, "Applying secrets to cluster"),
        StepDescriptor::new(InstallStep::CreateComponents, "Creating components")
            .skip_if(InstallRunner::recovering),
        StepDescriptor::new(InstallStep::CreateReporters, "Creating reporters")
            .skip_if(InstallRunner::recovering),
        StepDescriptor::new(InstallStep::CreateGitSources, "Creating git sources")
            .skip_if(InstallRunner::recovering),
        StepDescriptor::new(InstallStep::WaitForSync, "Wait for runtime sync")
            .continue_on_failure()
            .point_of_no_return(),
        StepDescriptor::new(InstallStep::CreateGitIntegration, "Creating a default git integration")
            .skip_if(|r: &InstallRunner| {
                r.request.ingress.skip_ingress || r.request.flags.skip_git_integration
            }),
    ]
}

/// Executes installation steps for one runtime
pub struct InstallRunner {
    ctx: OperationContext,
    request: InstallationRequest,
    definition: RuntimeDefinition,
    ingress: ResolvedIngress,
    /// Token issued by the control plane at creation
    token: Option<String>,
}

impl InstallRunner {
    pub fn new(
        ctx: OperationContext,
        request: InstallationRequest,
        definition: RuntimeDefinition,
        ingress: ResolvedIngress,
    ) -> Self {
        Self {
            ctx,
            request,
            definition,
            ingress,
            token: None,
        }
    }

    fn recovering(&self) -> bool {
        self.request.flags.from_repo
    }

    fn runtime(&self) -> &str {
        &self.request.name
    }

    /// The definition as persisted, once bound
    pub fn definition(&self) -> &RuntimeDefinition {
        &self.definition
    }

    /// Component names the control plane tracks for this runtime
    pub fn component_names(&self) -> Vec<String> {
        let runtime = self.runtime();
        let names = &self.ctx.settings.names;
        self.definition
            .spec
            .components
            .iter()
            .map(|c| c.name.as_str())
            .chain(names.reporters())
            .map(|c| format!("{runtime}-{c}"))
            .chain(std::iter::once(names.argocd_component.clone()))
            .collect()
    }

    fn bindings(&self) -> Bindings {
        runtime_bindings(self.ctx.cluster.server_address(), &self.request, &self.ingress)
    }

    fn git_provider(&self) -> String {
        self.request.repo.provider.clone().unwrap_or_else(|| {
            let host = ingress_host_name(&self.request.repo.url);
            host.split('.').next().unwrap_or_default().to_string()
        })
    }

    async fn create_runtime(&mut self) -> Result<()> {
        let skip_ingress = self.request.ingress.skip_ingress;
        let optional = |value: &str| (!skip_ingress && !value.is_empty()).then(|| value.to_string());

        let args = RuntimeInstallationArgs {
            runtime_name: self.runtime().to_string(),
            cluster: self.ctx.cluster.server_address().to_string(),
            runtime_version: self.definition.version().to_string(),
            ingress_host: optional(&self.request.ingress.host),
            internal_ingress_host: optional(self.request.internal_host()),
            ingress_class: self.ingress.class_name().map(str::to_string),
            ingress_controller: self.ingress.controller().map(|c| c.name().to_string()),
            component_names: self.component_names(),
            repo: self.request.repo.url.clone(),
            recover: self.recovering(),
        };

        let created = self.ctx.platform.create_runtime(&args).await?;
        self.token = Some(created.new_access_token);
        Ok(())
    }

    async fn bootstrap(&mut self) -> Result<()> {
        let names = &self.ctx.settings.names;
        let app_specifier = if self.recovering() {
            format!(
                "{}/{}/{}",
                self.request.repo.url.trim_end_matches('/'),
                names.bootstrap_dir,
                names.argocd_component
            )
        } else {
            self.definition.full_specifier()
        };

        let manifest = self
            .ctx
            .emitter
            .bootstrap(&BootstrapParams {
                runtime: self.runtime().to_string(),
                app_specifier,
                namespace_labels: self.request.namespace_labels.clone(),
                recover: self.recovering(),
            })
            .await?;
        self.ctx.cluster.apply(self.runtime(), &manifest).await?;
        Ok(())
    }

    async fn prepare_cluster(&mut self) -> Result<()> {
        let group = &self.ctx.settings.names.openshift_security_group;
        if !self.ctx.cluster.has_api_group(group).await? {
            return Ok(());
        }
        tracing::info!(runtime = %self.runtime(), "OpenShift cluster detected, granting security context");
        let manifest = self.ctx.emitter.openshift_grant(self.runtime()).await?;
        self.ctx.cluster.apply(self.runtime(), &manifest).await?;
        Ok(())
    }

    async fn persist_config(&mut self) -> Result<()> {
        let bindings = self.bindings();

        if self.recovering() {
            let mut existing = self.ctx.emitter.load_definition(self.runtime()).await?;
            existing.bind(&bindings);
            self.ctx
                .emitter
                .persist_definition(&existing, "Updated runtime config")
                .await?;
            self.definition = existing;
            return Ok(());
        }

        self.definition.bind(&bindings);
        self.ctx
            .emitter
            .persist_definition(&self.definition, "Persisted runtime data")
            .await
    }

    async fn apply_secrets(&mut self) -> Result<()> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| Error::Failed("runtime token is missing".to_string()))?;
        let iv = hex::encode(rand::random::<[u8; 16]>());

        let manifest = self.ctx.emitter.token_secret(self.runtime(), token, &iv)?;
        self.ctx.cluster.apply(self.runtime(), &manifest).await?;
        Ok(())
    }

    async fn create_components(&mut self) -> Result<()> {
        let components: Vec<ComponentApp> = self
            .definition
            .external_components()
            .map(|c| ComponentApp {
                name: c.name.clone(),
                source: self.definition.component_specifier(c),
            })
            .collect();
        self.ctx
            .emitter
            .create_components(self.runtime(), &components)
            .await?;

        let class = self
            .ingress
            .class_name()
            .filter(|_| !self.request.ingress.skip_ingress)
            .map(str::to_string);

        if let Some(class) = &class {
            if self.ingress.creates_workflows_ingress() {
                self.ctx
                    .emitter
                    .create_ingress(
                        self.runtime(),
                        &WorkflowsIngress {
                            host: self.ingress.host.clone(),
                            class: class.clone(),
                            annotations: self.decorated(&self.request.ingress.external_annotations),
                        },
                    )
                    .await?;
            }
        }

        self.ctx
            .emitter
            .configure_app_proxy(self.runtime(), &self.app_proxy_params(class.as_deref()))
            .await?;

        let Some(class) = class else {
            return Ok(());
        };
        if !self.ingress.controller().is_some_and(IngressController::needs_master_ingress) {
            return Ok(());
        }
        self.ctx
            .emitter
            .create_master_ingress(
                self.runtime(),
                &MasterIngress {
                    host: self.ingress.host.clone(),
                    class,
                    annotations: self.request.ingress.external_annotations.clone(),
                },
            )
            .await
    }

    /// `annotations` plus whatever the selected controller requires on minion ingresses
    fn decorated(&self, annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut annotations = annotations.clone();
        if let Some(controller) = self.ingress.controller() {
            for (key, value) in controller.decorations() {
                annotations.insert(key.to_string(), value.to_string());
            }
        }
        annotations
    }

    fn app_proxy_params(&self, class: Option<&str>) -> AppProxyParams {
        let ingress = class.map(|class| AppProxyIngress {
            host: self.ingress.internal_host.clone(),
            class: class.to_string(),
            annotations: self.decorated(&self.request.ingress.internal_annotations),
        });
        AppProxyParams {
            control_plane_url: self.ctx.settings.control_plane_url.clone(),
            ingress,
        }
    }

    async fn create_git_sources(&mut self) -> Result<()> {
        let names = &self.ctx.settings.names;
        let runtime = self.runtime();

        self.ctx
            .emitter
            .create_git_source(
                runtime,
                &GitSourceParams {
                    name: names.git_source.clone(),
                    repo_url: self.request.repo.url.clone(),
                    path: format!("{}/{}/resources", runtime, names.git_source),
                    include: None,
                    exclude: None,
                    demo_resources: self.request.flags.demo_resources,
                },
            )
            .await?;

        let provider = self.git_provider();
        if !MARKETPLACE_PROVIDERS.contains(&provider.as_str()) {
            self.ctx.summary.info(format!(
                "Skipping {} with git provider {}",
                names.marketplace_git_source, provider
            ));
            return Ok(());
        }
        self.ctx
            .emitter
            .create_git_source(
                runtime,
                &GitSourceParams {
                    name: names.marketplace_git_source.clone(),
                    repo_url: names.marketplace_repo.clone(),
                    path: String::new(),
                    include: Some("**/workflowtemplate.yaml".to_string()),
                    exclude: None,
                    demo_resources: false,
                },
            )
            .await
    }

    async fn wait_for_sync(&mut self) -> Result<()> {
        let monitor = self.ctx.progress(self.runtime());
        let platform = self.ctx.platform.clone();
        let runtime = self.runtime().to_string();

        let result = wait_until(
            "runtime to sync",
            self.ctx.settings.wait.runtime_sync,
            &self.ctx.cancel,
            || {
                let platform = platform.clone();
                let runtime = runtime.clone();
                async move {
                    let rt = platform.get_runtime(&runtime).await?;
                    tracing::debug!(runtime = %runtime, status = %rt.installation_status, "runtime status");
                    Ok::<_, Error>(if rt.installation_status.is_completed() {
                        Attempt::Done(())
                    } else {
                        Attempt::Pending
                    })
                }
            },
        )
        .await;

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        result
    }

    async fn create_git_integration(&mut self) -> Result<()> {
        let platform = self.ctx.platform.clone();
        let runtime = self.runtime().to_string();
        let args = GitIntegrationArgs {
            name: None,
            provider: self.request.repo.provider.clone(),
            api_url: self.request.repo.api_url.clone(),
        };

        wait_until(
            "git integration to be created",
            self.ctx.settings.wait.git_integration,
            &self.ctx.cancel,
            || {
                let platform = platform.clone();
                let runtime = runtime.clone();
                let args = args.clone();
                async move {
                    match platform.add_git_integration(&runtime, &args).await {
                        Ok(()) => Ok(Attempt::Done(())),
                        Err(e) if e.is_already_exists() => Ok(Attempt::Done(())),
                        Err(e) => Err(Error::from(e)),
                    }
                }
            },
        )
        .await?;

        match self.request.repo.token.as_deref() {
            Some(token) => {
                self.ctx
                    .platform
                    .register_git_integration(&runtime, token)
                    .await?
            }
            None => self.ctx.summary.info(format!(
                "To register your git user run: rtctl integration git register default --runtime {} --token <AUTHENTICATION_TOKEN>",
                runtime
            )),
        }
        Ok(())
    }

    /// Manual git integration instructions for runtimes installed without ingress
    pub fn skip_ingress_instructions(&self) -> Vec<String> {
        let mut add = format!(
            "rtctl integration git add default --runtime {} --provider {}",
            self.runtime(),
            self.git_provider()
        );
        if let Some(api_url) = &self.request.repo.api_url {
            add.push_str(&format!(" --api-url {}", api_url));
        }
        vec![
            "To complete the installation:".to_string(),
            "1. Configure your cluster's routing service with path to '/app-proxy' and '/workflows'".to_string(),
            format!("2. Create and register the default git integration using: {}", add),
            format!(
                "   rtctl integration git register default --runtime {} --token <AUTHENTICATION_TOKEN>",
                self.runtime()
            ),
        ]
    }
}

#[async_trait]
impl StepRunner for InstallRunner {
    type Step = InstallStep;

    async fn run_step(&mut self, step: InstallStep) -> Result<()> {
        match step {
            InstallStep::CreateRuntime => self.create_runtime().await,
            InstallStep::BootstrapRepo => self.bootstrap().await,
            InstallStep::PrepareCluster => self.prepare_cluster().await,
            InstallStep::CreateProject => self.ctx.emitter.create_project(&self.request.name).await,
            InstallStep::PersistConfig => self.persist_config().await,
            InstallStep::ApplySecrets => self.apply_secrets().await,
            InstallStep::CreateComponents => self.create_components().await,
            InstallStep::CreateReporters => self.ctx.emitter.create_reporters(&self.request.name).await,
            InstallStep::CreateGitSources => self.create_git_sources().await,
            InstallStep::WaitForSync => self.wait_for_sync().await,
            InstallStep::CreateGitIntegration => self.create_git_integration().await,
        }
    }
}
