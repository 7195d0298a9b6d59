//! Pre-flight validation
//!
//! Read-only checks run before an installation changes anything. Checks run
//! in a fixed order and the first failure is returned as
//! [`Error::Validation`] naming the check.

use rtctl_core::{Bindings, InstallationRequest, RuntimeDefinition, Settings, repo_host};
use rtctl_kube::{Cluster, ensure_requirements};
use rtctl_platform::ControlPlane;
use rtctl_repo::{DefinitionRegistry, RepoError};

use crate::emitter::ManifestEmitter;
use crate::error::{Error, PreflightCheck, Result};
use crate::prepare::{Prompter, ResolvedIngress, resolve_ingress, runtime_bindings};

/// What a successful pre-flight hands to the installer
#[derive(Debug, Clone)]
pub struct Validated {
    /// Downloaded definition, named after the runtime
    pub definition: RuntimeDefinition,
    pub ingress: ResolvedIngress,
    /// Set when recovering from the repository
    pub rebinding: Option<Rebinding>,
}

/// Bindings a recovery replaces, and their replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebinding {
    pub previous: Bindings,
    pub next: Bindings,
}

/// Runs the installation pre-flight checks
pub struct Preflight<'a> {
    cluster: &'a dyn Cluster,
    platform: &'a dyn ControlPlane,
    registry: &'a dyn DefinitionRegistry,
    emitter: &'a dyn ManifestEmitter,
    settings: &'a Settings,
    prompter: Option<&'a dyn Prompter>,
}

impl<'a> Preflight<'a> {
    pub fn new(
        cluster: &'a dyn Cluster,
        platform: &'a dyn ControlPlane,
        registry: &'a dyn DefinitionRegistry,
        emitter: &'a dyn ManifestEmitter,
        settings: &'a Settings,
    ) -> Self {
        Self {
            cluster,
            platform,
            registry,
            emitter,
            settings,
            prompter: None,
        }
    }

    pub fn with_prompter(mut self, prompter: Option<&'a dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Run every check in order
    pub async fn run(&self, request: &InstallationRequest) -> Result<Validated> {
        request
            .validate()
            .map_err(|e| Error::validation(PreflightCheck::Request, e.to_string()))?;

        self.check_git_provider(request).await?;
        let definition = self.download_definition(request).await?;
        self.check_collision(&request.name).await?;

        if request.flags.from_repo {
            tracing::debug!(runtime = %request.name, "recovering, skipping existing runtime check");
        } else {
            self.check_existing_runtime(&request.name).await?;
        }

        if request.flags.skip_cluster_checks {
            tracing::debug!("skipping cluster requirements check");
        } else {
            self.check_requirements().await?;
        }

        let ingress = resolve_ingress(self.cluster, request, self.settings, self.prompter).await?;

        let rebinding = if request.flags.from_repo {
            Some(self.approve_recovery(request, &ingress).await?)
        } else {
            None
        };
        Ok(Validated {
            definition,
            ingress,
            rebinding,
        })
    }

    /// The installation repository must live on the account's git provider
    pub async fn check_git_provider(&self, request: &InstallationRequest) -> Result<()> {
        let shared = self
            .platform
            .shared_config_repo()
            .await
            .map_err(|e| check_failed(PreflightCheck::GitProvider, e))?;
        let Some(shared) = shared else {
            return Ok(());
        };

        let account_host = repo_host(&shared);
        let install_host = repo_host(&request.repo.url);
        if account_host != install_host {
            return Err(Error::validation(
                PreflightCheck::GitProvider,
                format!(
                    "cannot install runtime in \"{}\" when Account git provider is in \"{}\"",
                    install_host, account_host
                ),
            ));
        }
        Ok(())
    }

    /// Download the definition and make sure this client understands it
    pub async fn download_definition(&self, request: &InstallationRequest) -> Result<RuntimeDefinition> {
        let definition = match self.registry.download(&request.name, request.version.as_ref()).await {
            Ok(definition) => definition,
            Err(RepoError::UnsupportedDefinition { .. }) => return Err(self.cli_out_of_date()),
            Err(e) => {
                return Err(Error::validation(
                    PreflightCheck::Definition,
                    format!("failed to download runtime definition: {}", e),
                ));
            }
        };

        if !definition.is_supported_by(&self.settings.max_def_version) {
            return Err(self.cli_out_of_date());
        }
        tracing::debug!(version = %definition.version(), "downloaded runtime definition");
        Ok(definition)
    }

    fn cli_out_of_date(&self) -> Error {
        Error::validation(
            PreflightCheck::CliVersion,
            "your cli version is out of date. please upgrade to the latest version before installing",
        )
        .with_hint(format!(
            "Download the latest version from {}",
            self.settings.docs.download_cli
        ))
    }

    /// A GitOps server bound to another namespace means another runtime owns
    /// the cluster; one bound to the runtime's own namespace is overwritten
    pub async fn check_collision(&self, runtime: &str) -> Result<()> {
        let server = &self.settings.names.argocd_server;
        let binding = match self.cluster.cluster_role_binding(server).await {
            Ok(binding) => binding,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(check_failed(PreflightCheck::Collision, e)),
        };

        let Some(namespace) = binding
            .subjects
            .as_ref()
            .and_then(|s| s.first())
            .and_then(|s| s.namespace.clone())
        else {
            return Ok(());
        };
        if namespace == runtime {
            tracing::debug!(namespace = %namespace, "existing GitOps server will be overwritten");
            return Ok(());
        }

        match self.cluster.deployment(&namespace, server).await {
            Ok(_) => Err(Error::validation(
                PreflightCheck::Collision,
                format!("argo-cd is already installed on this cluster in namespace \"{}\"", namespace),
            )
            .with_hint(format!(
                "you can uninstall it by running 'rtctl uninstall {} --skip-checks --force'",
                namespace
            ))),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(check_failed(PreflightCheck::Collision, e)),
        }
    }

    pub async fn check_existing_runtime(&self, runtime: &str) -> Result<()> {
        match self.platform.get_runtime(runtime).await {
            Ok(_) => Err(Error::validation(
                PreflightCheck::ExistingRuntime,
                format!("runtime \"{}\" already exists", runtime),
            )),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(check_failed(PreflightCheck::ExistingRuntime, e)),
        }
    }

    /// Recovery rebinds the definition persisted in the repository; the
    /// operator approves the new bindings unless the request is silent
    pub async fn approve_recovery(
        &self,
        request: &InstallationRequest,
        ingress: &ResolvedIngress,
    ) -> Result<Rebinding> {
        let existing = self
            .emitter
            .load_definition(&request.name)
            .await
            .map_err(|e| check_failed(PreflightCheck::RecoveryApproval, e))?;
        let rebinding = Rebinding {
            previous: existing.bindings(),
            next: runtime_bindings(self.cluster.server_address(), request, ingress),
        };
        tracing::info!(
            previous_cluster = %rebinding.previous.cluster,
            next_cluster = %rebinding.next.cluster,
            "recovering runtime from repository"
        );

        if request.flags.silent {
            return Ok(rebinding);
        }
        let Some(prompter) = self.prompter else {
            return Err(Error::validation(
                PreflightCheck::RecoveryApproval,
                "installing from an existing repository needs approval",
            )
            .with_hint("run again with --silent to install without prompting"));
        };
        if !prompter.approve_recovery(&rebinding.previous, &rebinding.next) {
            return Err(Error::validation(
                PreflightCheck::RecoveryApproval,
                "installation from existing repository was not approved",
            ));
        }
        Ok(rebinding)
    }

    pub async fn check_requirements(&self) -> Result<()> {
        ensure_requirements(self.cluster, &self.settings.requirements)
            .await
            .map_err(|e| {
                Error::validation(
                    PreflightCheck::ClusterRequirements,
                    format!("validation of minimum cluster requirements failed: {}", e),
                )
                .with_hint(format!("See {}", self.settings.docs.requirements))
            })
    }
}

/// Report a collaborator failure as a failure of `check`
pub(crate) fn check_failed(check: PreflightCheck, err: impl Into<Error>) -> Error {
    let err = err.into();
    if err.is_cancelled() || err.is_validation() {
        return err;
    }
    Error::validation(check, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RepoEmitter;
    use rtctl_kube::{IngressClassInfo, MockCluster, node};
    use rtctl_platform::{MockControlPlane, Op, Runtime};
    use rtctl_repo::{MemoryRepository, StaticRegistry};
    use semver::Version;
    use std::sync::{Arc, Mutex};

    fn definition(version: &str, def_version: &str) -> RuntimeDefinition {
        RuntimeDefinition::from_yaml(&format!(
            "kind: Runtime\nspec:\n  defVersion: {def_version}\n  version: {version}\n  bootstrapSpecifier: github.com/rtctl/runtime/manifests/argo-cd\n"
        ))
        .unwrap()
    }

    struct Fixture {
        cluster: MockCluster,
        platform: MockControlPlane,
        registry: StaticRegistry,
        repo: MemoryRepository,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                cluster: MockCluster::new().with_ingress_class("nginx", "k8s.io/ingress-nginx"),
                platform: MockControlPlane::new(),
                registry: StaticRegistry::new(vec![definition("0.1.5", "1.0.0")], Version::new(99, 0, 0)),
                repo: MemoryRepository::new("https://github.com/acme/isc"),
                settings: Settings::default(),
            }
        }

        /// Repository holding a runtime installed on another cluster
        fn with_installed_runtime(mut self) -> Self {
            let mut installed = definition("0.1.5", "1.0.0").named("prod");
            installed.bind(&Bindings {
                cluster: "https://old.acme.io:6443".to_string(),
                ingress_host: "https://old.acme.io".to_string(),
                ingress_class: "traefik".to_string(),
                ..Default::default()
            });
            self.repo = MemoryRepository::with_files(
                "https://github.com/acme/isc",
                [("bootstrap/prod.yaml", installed.to_yaml().unwrap())],
            );
            self
        }

        async fn run(&self, request: &InstallationRequest) -> Result<Validated> {
            self.run_with(request, None).await
        }

        async fn run_with(&self, request: &InstallationRequest, prompter: Option<&dyn Prompter>) -> Result<Validated> {
            let emitter = RepoEmitter::new(Arc::new(self.repo.clone()), self.settings.names.clone());
            Preflight::new(&self.cluster, &self.platform, &self.registry, &emitter, &self.settings)
                .with_prompter(prompter)
                .run(request)
                .await
        }
    }

    /// Answers recovery prompts with a fixed decision and records what it was shown
    struct Answer {
        approve: bool,
        shown: Mutex<Vec<(Bindings, Bindings)>>,
    }

    impl Answer {
        fn new(approve: bool) -> Self {
            Self {
                approve,
                shown: Mutex::new(Vec::new()),
            }
        }
    }

    impl Prompter for Answer {
        fn choose_ingress_class(&self, _candidates: &[IngressClassInfo]) -> Option<String> {
            None
        }

        fn approve_recovery(&self, previous: &Bindings, next: &Bindings) -> bool {
            self.shown.lock().unwrap().push((previous.clone(), next.clone()));
            self.approve
        }
    }

    fn request() -> InstallationRequest {
        InstallationRequest::new("prod", "https://github.com/acme/isc").with_ingress("prod.acme.io", None)
    }

    fn failed_check(err: &Error) -> Option<PreflightCheck> {
        match err {
            Error::Validation { check, .. } => Some(*check),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_all_checks_pass() {
        let fx = Fixture::new();
        let validated = fx.run(&request()).await.unwrap();
        assert_eq!(validated.definition.name(), "prod");
        assert_eq!(validated.ingress.class_name(), Some("nginx"));
    }

    #[tokio::test]
    async fn test_invalid_name_fails_before_remote_calls() {
        let fx = Fixture::new();
        let err = fx
            .run(&InstallationRequest::new("Prod_1", "https://github.com/acme/isc"))
            .await
            .unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::Request));
        assert!(fx.platform.calls().is_empty());
        assert_eq!(fx.registry.download_count(), 0);
    }

    #[tokio::test]
    async fn test_git_provider_mismatch() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().with_shared_config_repo("https://gitlab.com/acme/shared-config");

        let err = fx.run(&request()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::GitProvider));
        assert!(err.to_string().contains(
            "cannot install runtime in \"github.com\" when Account git provider is in \"gitlab.com\""
        ));
        assert_eq!(fx.registry.download_count(), 0);
    }

    #[tokio::test]
    async fn test_git_provider_compares_ports() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().with_shared_config_repo("https://git.acme.io/acme/shared-config");
        let req = InstallationRequest::new("prod", "https://git.acme.io:8443/acme/isc")
            .with_ingress("prod.acme.io", None);

        let err = fx.run(&req).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::GitProvider));
        assert!(err.to_string().contains("\"git.acme.io:8443\""));

        fx.platform =
            MockControlPlane::new().with_shared_config_repo("https://git.acme.io:8443/acme/shared-config");
        assert!(fx.run(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_shared_config_failure_fails_git_provider_check() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().failing(Op::SharedConfigRepo);

        let err = fx.run(&request()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::GitProvider));
        assert!(err.to_string().contains("injected SharedConfigRepo failure"));
        assert_eq!(fx.registry.download_count(), 0);
    }

    #[tokio::test]
    async fn test_runtime_lookup_failure_fails_existing_runtime_check() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().failing(Op::GetRuntime);

        let err = fx.run(&request()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(failed_check(&err), Some(PreflightCheck::ExistingRuntime));
        assert_eq!(fx.cluster.operation_counts().lists, 0);
    }

    #[tokio::test]
    async fn test_ingress_listing_failure_fails_ingress_check() {
        let mut fx = Fixture::new();
        fx.cluster = MockCluster::new().failing_ingress_classes("forbidden");

        let err = fx.run(&request()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::Ingress));
        assert!(err.to_string().contains("forbidden"));
    }

    #[test]
    fn test_check_failed_passes_cancellation_through() {
        assert!(check_failed(PreflightCheck::Collision, Error::Cancelled).is_cancelled());
    }

    #[tokio::test]
    async fn test_unsupported_schema_asks_for_cli_upgrade() {
        let mut fx = Fixture::new();
        fx.settings.max_def_version = Version::new(0, 5, 0);

        let err = fx.run(&request()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::CliVersion));
        assert!(err.hint().unwrap().contains(&fx.settings.docs.download_cli));
    }

    #[tokio::test]
    async fn test_collision_in_other_namespace() {
        let mut fx = Fixture::new();
        fx.cluster = MockCluster::new()
            .with_cluster_role_binding("argocd-server", Some("argocd"))
            .with_deployment("argocd", "argocd-server");

        let err = fx.run(&request()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::Collision));
        assert!(err.hint().unwrap().contains("rtctl uninstall argocd --skip-checks --force"));
        assert_eq!(fx.platform.call_count(Op::GetRuntime), 0);
    }

    #[tokio::test]
    async fn test_same_namespace_binding_is_not_a_collision() {
        let mut fx = Fixture::new();
        fx.cluster = MockCluster::new()
            .with_ingress_class("nginx", "k8s.io/ingress-nginx")
            .with_cluster_role_binding("argocd-server", Some("prod"))
            .with_deployment("prod", "argocd-server");

        assert!(fx.run(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_binding_without_deployment_is_ignored() {
        let mut fx = Fixture::new();
        fx.cluster = MockCluster::new()
            .with_ingress_class("nginx", "k8s.io/ingress-nginx")
            .with_cluster_role_binding("argocd-server", Some("argocd"));

        assert!(fx.run(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_existing_runtime_rejected_unless_recovering() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().with_runtime(Runtime {
            name: "prod".to_string(),
            ..Default::default()
        });

        let err = fx.run(&request()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::ExistingRuntime));
        assert!(err.to_string().contains("runtime \"prod\" already exists"));

        let fx = Fixture { platform: fx.platform, ..Fixture::new().with_installed_runtime() };
        assert!(fx.run(&request().from_repo().silent()).await.is_ok());
    }

    #[tokio::test]
    async fn test_recovery_shows_previous_and_new_bindings() {
        let fx = Fixture::new().with_installed_runtime();
        let answer = Answer::new(true);

        let validated = fx.run_with(&request().from_repo(), Some(&answer)).await.unwrap();

        let rebinding = validated.rebinding.unwrap();
        assert_eq!(rebinding.previous.cluster, "https://old.acme.io:6443");
        assert_eq!(rebinding.previous.ingress_class, "traefik");
        assert_eq!(rebinding.next.cluster, fx.cluster.server_address());
        assert_eq!(rebinding.next.ingress_class, "nginx");

        let shown = answer.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0], (rebinding.previous.clone(), rebinding.next.clone()));
    }

    #[tokio::test]
    async fn test_declined_recovery_is_rejected() {
        let fx = Fixture::new().with_installed_runtime();

        let err = fx
            .run_with(&request().from_repo(), Some(&Answer::new(false)))
            .await
            .unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::RecoveryApproval));
        assert!(err.to_string().contains("was not approved"));
        assert_eq!(fx.repo.operation_counts().writes, 0);
    }

    #[tokio::test]
    async fn test_silent_recovery_never_prompts() {
        let fx = Fixture::new().with_installed_runtime();
        let answer = Answer::new(false);

        let validated = fx
            .run_with(&request().from_repo().silent(), Some(&answer))
            .await
            .unwrap();
        assert!(validated.rebinding.is_some());
        assert!(answer.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_without_prompter_needs_silent() {
        let fx = Fixture::new().with_installed_runtime();

        let err = fx.run(&request().from_repo()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::RecoveryApproval));
        assert!(err.hint().unwrap().contains("--silent"));
    }

    #[tokio::test]
    async fn test_recovery_without_persisted_definition_fails() {
        let fx = Fixture::new();

        let err = fx.run(&request().from_repo().silent()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::RecoveryApproval));
    }

    #[tokio::test]
    async fn test_requirements_are_skippable() {
        let mut fx = Fixture::new();
        fx.cluster = MockCluster::new()
            .with_ingress_class("nginx", "k8s.io/ingress-nginx")
            .with_nodes(vec![node("tiny", "500m", "1Gi")]);

        let err = fx.run(&request()).await.unwrap_err();
        assert_eq!(failed_check(&err), Some(PreflightCheck::ClusterRequirements));
        assert!(err.to_string().contains("validation of minimum cluster requirements failed"));

        assert!(fx.run(&request().skip_cluster_checks()).await.is_ok());
    }
}
