//! End-to-end operation scenarios against in-memory collaborators

use async_trait::async_trait;
use rtctl_core::{
    Bindings, InstallationRequest, PollSettings, RuntimeDefinition, Settings, StepStatus,
    UninstallRequest, UpgradeRequest,
};
use rtctl_kube::{IngressClassInfo, MockCluster};
use rtctl_orchestrator::{
    AppProxyParams, BootstrapParams, ComponentApp, Error, GitSourceParams, ManifestEmitter,
    MasterIngress, Orchestrator, PreflightCheck, Prompter, RepoEmitter, Result, WorkflowsIngress,
};
use rtctl_platform::{MockControlPlane, Op, Runtime};
use rtctl_repo::{MemoryRepository, StaticRegistry};
use semver::Version;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const REPO_URL: &str = "https://github.com/acme/isc";

fn definition(version: &str, components: &[&str]) -> RuntimeDefinition {
    let mut yaml = format!(
        "kind: Runtime\nspec:\n  defVersion: 1.0.0\n  version: {version}\n  bootstrapSpecifier: github.com/rtctl/runtime/manifests/argo-cd\n  components:\n"
    );
    for c in components {
        yaml.push_str(&format!("    - name: {c}\n      url: github.com/rtctl/runtime/manifests/{c}\n"));
    }
    RuntimeDefinition::from_yaml(&yaml).unwrap()
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.wait.runtime_sync = PollSettings::new(Duration::from_secs(10), 3).unwrap();
    settings.wait.git_integration = PollSettings::new(Duration::from_secs(10), 2).unwrap();
    settings.wait.uninstall = PollSettings::new(Duration::from_secs(5), 4).unwrap();
    settings
}

/// Emitter that fails one operation and delegates the rest
struct FailingEmitter {
    inner: RepoEmitter,
    fail: &'static str,
}

impl FailingEmitter {
    fn check(&self, op: &'static str) -> Result<()> {
        if op == self.fail {
            return Err(Error::Failed(format!("{op} rejected by remote")));
        }
        Ok(())
    }
}

#[async_trait]
impl ManifestEmitter for FailingEmitter {
    async fn bootstrap(&self, params: &BootstrapParams) -> Result<String> {
        self.check("bootstrap")?;
        self.inner.bootstrap(params).await
    }

    async fn create_project(&self, runtime: &str) -> Result<()> {
        self.check("create_project")?;
        self.inner.create_project(runtime).await
    }

    async fn persist_definition(&self, definition: &RuntimeDefinition, message: &str) -> Result<()> {
        self.check("persist_definition")?;
        self.inner.persist_definition(definition, message).await
    }

    async fn load_definition(&self, runtime: &str) -> Result<RuntimeDefinition> {
        self.inner.load_definition(runtime).await
    }

    async fn create_components(&self, runtime: &str, components: &[ComponentApp]) -> Result<()> {
        self.check("create_components")?;
        self.inner.create_components(runtime, components).await
    }

    async fn create_ingress(&self, runtime: &str, ingress: &WorkflowsIngress) -> Result<()> {
        self.inner.create_ingress(runtime, ingress).await
    }

    async fn create_master_ingress(&self, runtime: &str, ingress: &MasterIngress) -> Result<()> {
        self.inner.create_master_ingress(runtime, ingress).await
    }

    async fn configure_app_proxy(&self, runtime: &str, params: &AppProxyParams) -> Result<()> {
        self.check("configure_app_proxy")?;
        self.inner.configure_app_proxy(runtime, params).await
    }

    async fn create_reporters(&self, runtime: &str) -> Result<()> {
        self.inner.create_reporters(runtime).await
    }

    async fn create_git_source(&self, runtime: &str, source: &GitSourceParams) -> Result<()> {
        self.inner.create_git_source(runtime, source).await
    }

    async fn openshift_grant(&self, runtime: &str) -> Result<String> {
        self.inner.openshift_grant(runtime).await
    }

    fn token_secret(&self, runtime: &str, token: &str, iv: &str) -> Result<String> {
        self.inner.token_secret(runtime, token, iv)
    }

    async fn remove_runtime(&self, runtime: &str) -> Result<()> {
        self.check("remove_runtime")?;
        self.inner.remove_runtime(runtime).await
    }
}

struct Fixture {
    cluster: MockCluster,
    platform: MockControlPlane,
    repo: MemoryRepository,
    registry: StaticRegistry,
    settings: Settings,
    fail_emitter: Option<&'static str>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            cluster: MockCluster::new().with_ingress_class("nginx", "k8s.io/ingress-nginx"),
            platform: MockControlPlane::new(),
            repo: MemoryRepository::new(REPO_URL),
            registry: StaticRegistry::new(
                vec![definition("0.1.5", &["argo-events", "argo-workflows"])],
                Version::new(2, 0, 0),
            ),
            settings: settings(),
            fail_emitter: None,
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        let orchestrator = Orchestrator::new(
            Arc::new(self.cluster.clone()),
            Arc::new(self.platform.clone()),
            Arc::new(self.repo.clone()),
            Arc::new(self.registry.clone()),
            self.settings.clone(),
        );
        match self.fail_emitter {
            Some(fail) => orchestrator.with_emitter(Arc::new(FailingEmitter {
                inner: RepoEmitter::new(Arc::new(self.repo.clone()), self.settings.names.clone()),
                fail,
            })),
            None => orchestrator,
        }
    }
}

fn request() -> InstallationRequest {
    InstallationRequest::new("prod", REPO_URL).with_ingress("https://prod.acme.io", None)
}

fn existing(name: &str) -> Runtime {
    Runtime {
        name: name.to_string(),
        ..Default::default()
    }
}

mod install {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_install_runs_every_step() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator();
        let mut req = request();
        req.repo.token = Some("ghp_secret".to_string());

        let outcome = orchestrator.install(req, &CancellationToken::new()).await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(outcome.report.len(), 11);
        assert!(outcome.report.outcomes().iter().all(|o| o.status == StepStatus::Succeeded));
        assert!(outcome.report.past_point_of_no_return());
        assert!(orchestrator.summary().contains("Runtime \"prod\" installed successfully"));

        let args = fx.platform.last_installation_args().unwrap();
        assert!(args.component_names.contains(&"prod-argo-events".to_string()));
        assert!(args.component_names.contains(&"prod-events-reporter".to_string()));
        assert!(args.component_names.contains(&"argo-cd".to_string()));
        assert_eq!(args.ingress_class.as_deref(), Some("nginx"));

        assert!(fx.cluster.applied_contains("kind: Secret"));
        assert!(fx.cluster.applied_contains("prod-token"));
        assert!(fx.repo.pushed_file("bootstrap/prod.yaml").unwrap().contains("ingressHost: https://prod.acme.io"));
        assert!(fx.repo.pushed_file("apps/argo-events/prod/config.yaml").is_some());
        assert_eq!(fx.platform.git_integrations("prod").len(), 1);
        assert_eq!(fx.platform.registered_tokens(), vec!["ghp_secret"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_rolls_back() {
        let mut fx = Fixture::new();
        fx.fail_emitter = Some("create_project");
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

        let err = outcome.error().unwrap();
        assert_eq!(err.step(), Some("create-project"));
        assert_eq!(outcome.report.len(), 4);
        assert!(outcome.report.get("persist-runtime-config").is_none());

        let rollback = outcome.rollback.as_ref().expect("rollback ran");
        assert_eq!(rollback.len(), 5);
        assert!(!fx.platform.has_runtime("prod"));
        assert!(fx.repo.pushed_paths().is_empty());

        let summary = orchestrator.summary();
        assert!(summary.contains("Creating Project: create_project rejected by remote"));
        assert!(summary.contains("----------Uninstalling runtime----------"));
        assert!(summary.contains("Uninstall phase finished after rollback"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_failure_keeps_forward_error() {
        let mut fx = Fixture::new();
        fx.cluster = fx.cluster.failing_apply("admission webhook denied the request");
        fx.platform = MockControlPlane::new().failing(Op::DeleteRuntime);
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.error().unwrap().step(), Some("bootstrap-repository"));
        assert!(outcome.rollback.is_some());
        assert!(orchestrator.summary().contains("installation rollback failed"));
    }

    fn persisted(fx: &mut Fixture) {
        let mut installed = definition("0.1.5", &["argo-events"]).named("prod");
        installed.bind(&Bindings {
            cluster: "https://old.acme.io:6443".to_string(),
            ingress_host: "https://old.acme.io".to_string(),
            ingress_class: "traefik".to_string(),
            repo: REPO_URL.to_string(),
            ..Default::default()
        });
        fx.repo = MemoryRepository::with_files(
            REPO_URL,
            [("bootstrap/prod.yaml", installed.to_yaml().unwrap())],
        );
    }

    /// Answers every recovery prompt the same way
    struct Approve(bool);

    impl Prompter for Approve {
        fn choose_ingress_class(&self, _candidates: &[IngressClassInfo]) -> Option<String> {
            None
        }

        fn approve_recovery(&self, _previous: &Bindings, _next: &Bindings) -> bool {
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_never_rolls_back() {
        let mut fx = Fixture::new();
        persisted(&mut fx);
        fx.cluster = fx.cluster.failing_apply("connection refused");
        fx.platform = MockControlPlane::new().with_runtime(existing("prod"));
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .install(request().from_repo().silent(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.error().unwrap().step(), Some("bootstrap-repository"));
        assert_eq!(outcome.report.len(), 2);
        assert!(outcome.rollback.is_none());
        assert!(fx.platform.has_runtime("prod"));

        let summary = orchestrator.summary();
        assert!(summary.contains("Bootstrapping repository"));
        assert!(!summary.contains("Uninstalling runtime"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_bindings_are_summarized_before_any_change() {
        let mut fx = Fixture::new();
        persisted(&mut fx);
        fx.platform = MockControlPlane::new().with_runtime(existing("prod"));
        let orchestrator = fx.orchestrator().with_prompter(Arc::new(Approve(true)));

        let outcome = orchestrator
            .install(request().from_repo(), &CancellationToken::new())
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        let messages: Vec<String> = orchestrator
            .summary()
            .entries()
            .into_iter()
            .map(|e| e.message)
            .collect();
        let position = |needle: &str| messages.iter().position(|m| m.contains(needle)).unwrap();
        assert!(messages[position("Previous cluster")].contains("https://old.acme.io:6443"));
        assert!(messages[position("New cluster")].contains("ingress class: nginx"));
        assert!(position("New cluster") < position("Creating runtime on platform"));
        assert_eq!(fx.repo.commits()[0], "Updated runtime config");
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_recovery_changes_nothing() {
        let mut fx = Fixture::new();
        persisted(&mut fx);
        fx.platform = MockControlPlane::new().with_runtime(existing("prod"));
        let orchestrator = fx.orchestrator().with_prompter(Arc::new(Approve(false)));

        let outcome = orchestrator
            .install(request().from_repo(), &CancellationToken::new())
            .await;

        let err = outcome.error().unwrap();
        assert_eq!(err.failed_check(), Some(PreflightCheck::RecoveryApproval));
        assert!(outcome.report.is_empty());
        assert_eq!(fx.platform.call_count(Op::CreateRuntime), 0);
        assert!(fx.cluster.applied().is_empty());
        assert!(fx.repo.commits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_rollback_leaves_runtime() {
        let mut fx = Fixture::new();
        fx.fail_emitter = Some("persist_definition");
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .install(request().without_rollback(), &CancellationToken::new())
            .await;

        assert!(outcome.error().is_some());
        assert!(outcome.rollback.is_none());
        assert!(fx.platform.has_runtime("prod"));
        assert_eq!(fx.platform.call_count(Op::DeleteRuntime), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_timeout_is_soft() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().never_complete();
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert!(outcome.completed_with_issues());
        let sync = outcome.report.get("wait-for-runtime-sync").unwrap();
        assert_eq!(sync.status, StepStatus::Failed);
        assert!(!sync.fatal);
        // one lookup during pre-flight, then every sync attempt
        assert_eq!(fx.platform.call_count(Op::GetRuntime), 4);
        assert!(outcome.report.get("create-git-integration").is_some());
        assert!(orchestrator.summary().contains("Runtime \"prod\" installed with some issues"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_git_integration_timeout_is_fatal_without_rollback() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().failing(Op::AddGitIntegration);
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

        let err = outcome.error().unwrap();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("git integration to be created"));
        assert_eq!(fx.platform.call_count(Op::AddGitIntegration), 2);
        assert!(outcome.rollback.is_none());
        assert!(fx.platform.has_runtime("prod"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sync_wait() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().never_complete();
        fx.settings.wait.runtime_sync = PollSettings::new(Duration::from_secs(10), 48).unwrap();
        let orchestrator = fx.orchestrator();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let outcome = orchestrator.install(request(), &cancel).await;

        let err = outcome.error().unwrap();
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(35));
        assert_eq!(outcome.report.len(), 10);
        assert!(outcome.rollback.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preflight_rejection_changes_nothing() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().with_runtime(existing("prod"));
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

        assert!(outcome.error().unwrap().is_validation());
        assert!(outcome.report.is_empty());
        assert!(outcome.rollback.is_none());
        assert_eq!(fx.platform.call_count(Op::CreateRuntime), 0);
        assert!(fx.cluster.applied().is_empty());
        assert!(fx.repo.commits().is_empty());
        assert!(orchestrator.summary().contains("runtime \"prod\" already exists"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collaborator_failures_during_preflight_are_validation_errors() {
        let cases = [
            (
                MockControlPlane::new().failing(Op::SharedConfigRepo),
                MockCluster::new().with_ingress_class("nginx", "k8s.io/ingress-nginx"),
                PreflightCheck::GitProvider,
            ),
            (
                MockControlPlane::new().failing(Op::GetRuntime),
                MockCluster::new().with_ingress_class("nginx", "k8s.io/ingress-nginx"),
                PreflightCheck::ExistingRuntime,
            ),
            (
                MockControlPlane::new(),
                MockCluster::new().failing_ingress_classes("connection refused"),
                PreflightCheck::Ingress,
            ),
        ];

        for (platform, cluster, check) in cases {
            let mut fx = Fixture::new();
            fx.platform = platform;
            fx.cluster = cluster;
            let orchestrator = fx.orchestrator();

            let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

            let err = outcome.error().unwrap();
            assert!(err.is_validation(), "{check}: {err:?}");
            assert_eq!(err.failed_check(), Some(check));
            assert!(outcome.report.is_empty());
            assert!(outcome.rollback.is_none());
            assert_eq!(fx.platform.call_count(Op::CreateRuntime), 0);
            assert!(fx.cluster.applied().is_empty());
            assert!(fx.repo.commits().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_nginx_enterprise_gets_master_ingress() {
        let mut fx = Fixture::new();
        fx.cluster = MockCluster::new().with_ingress_class("nginx-plus", "nginx.org/ingress-controller");
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        let master = fx
            .repo
            .pushed_file("bootstrap/cluster-resources/in-cluster/master-ingress.yaml")
            .unwrap();
        assert!(master.contains("nginx.org/mergeable-ingress-type: master"));
        assert!(master.contains("host: prod.acme.io"));

        let workflows = fx.repo.pushed_file("apps/workflows/prod/resources/ingress.yaml").unwrap();
        assert!(workflows.contains("nginx.org/mergeable-ingress-type: minion"));
        let app_proxy = fx.repo.pushed_file("apps/app-proxy/prod/resources/ingress.yaml").unwrap();
        assert!(app_proxy.contains("nginx.org/mergeable-ingress-type: minion"));
        assert!(app_proxy.contains("ingressClassName: nginx-plus"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_community_nginx_has_no_master_ingress() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert!(fx.repo.pushed_file("bootstrap/cluster-resources/in-cluster/master-ingress.yaml").is_none());
        assert!(fx.repo.pushed_file("apps/app-proxy/prod/resources/config.yaml").is_some());
        assert!(fx.repo.pushed_file("apps/app-proxy/prod/resources/ingress.yaml").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_proxy_failure_fails_components_step() {
        let mut fx = Fixture::new();
        fx.fail_emitter = Some("configure_app_proxy");
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator.install(request(), &CancellationToken::new()).await;

        let err = outcome.error().unwrap();
        assert_eq!(err.step(), Some("create-components"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_ingress_prints_manual_steps() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator();
        let req = InstallationRequest::new("prod", REPO_URL).without_ingress();

        let outcome = orchestrator.install(req, &CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert_eq!(
            outcome.report.get("create-git-integration").unwrap().status,
            StepStatus::Skipped
        );
        assert_eq!(fx.platform.call_count(Op::AddGitIntegration), 0);
        assert!(fx.repo.pushed_file("apps/app-proxy/prod/resources/config.yaml").is_some());
        assert!(fx.repo.pushed_file("apps/app-proxy/prod/resources/ingress.yaml").is_none());
        assert!(
            orchestrator
                .summary()
                .contains("rtctl integration git add default --runtime prod --provider github")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_marketplace_source_only_for_supported_providers() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .install(request().with_provider("gitlab"), &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert!(
            orchestrator
                .summary()
                .contains("Skipping marketplace-git-source with git provider gitlab")
        );
        assert!(fx.repo.pushed_file("apps/default-git-source/prod/config.yaml").is_some());
        assert!(fx.repo.pushed_file("apps/marketplace-git-source/prod/config.yaml").is_none());
    }
}

mod uninstall {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_forced_uninstall_runs_every_step() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new()
            .with_runtime(existing("prod"))
            .failing(Op::RemoveGitIntegrations);
        fx.cluster = fx.cluster.with_namespace("prod").with_namespace_linger(2);
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .uninstall(UninstallRequest::new("prod").with_force(), &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.report.len(), 5);
        assert_eq!(outcome.report.soft_failures().count(), 1);
        assert!(!fx.platform.has_runtime("prod"));
        assert!(orchestrator.summary().contains("Done uninstalling runtime \"prod\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unforced_uninstall_stops_with_hint() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new()
            .with_runtime(existing("prod"))
            .failing(Op::RemoveGitIntegrations);
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .uninstall(UninstallRequest::new("prod"), &CancellationToken::new())
            .await;

        assert_eq!(outcome.error().unwrap().step(), Some("remove-git-integrations"));
        assert_eq!(outcome.report.len(), 2);
        assert!(fx.platform.has_runtime("prod"));
        assert!(orchestrator.summary().contains("--force"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_config_removal_failure_is_swallowed_when_forced() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new()
            .with_runtime(existing("prod"))
            .with_shared_config_repo("https://github.com/acme/shared-config")
            .failing(Op::RemoveFromSharedConfig);
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .uninstall(UninstallRequest::new("prod").with_force(), &CancellationToken::new())
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        let step = outcome.report.get("remove-runtime-from-shared-config").unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert!(!step.fatal);
        assert!(!fx.platform.has_runtime("prod"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_config_removal_failure_stops_unforced_uninstall() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new()
            .with_runtime(existing("prod"))
            .with_shared_config_repo("https://github.com/acme/shared-config")
            .failing(Op::RemoveFromSharedConfig);
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .uninstall(UninstallRequest::new("prod"), &CancellationToken::new())
            .await;

        let err = outcome.error().unwrap();
        assert_eq!(err.step(), Some("remove-runtime-from-shared-config"));
        assert!(err.hint().unwrap().contains("--force"));
        assert_eq!(outcome.report.len(), 3);
        assert!(fx.platform.has_runtime("prod"));
        assert!(fx.repo.commits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uninstall_removes_runtime_from_shared_config() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new()
            .with_runtime(existing("prod"))
            .with_shared_config_repo("https://github.com/acme/shared-config");
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .uninstall(UninstallRequest::new("prod"), &CancellationToken::new())
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(fx.platform.removed_from_shared_config(), vec!["prod"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_runtime_suggests_skip_checks() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .uninstall(UninstallRequest::new("ghost"), &CancellationToken::new())
            .await;

        let err = outcome.error().unwrap();
        assert_eq!(err.step(), Some("check-runtime-exists"));
        assert!(err.hint().unwrap().contains("--skip-checks"));
        assert_eq!(outcome.report.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespace_teardown_timeout() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new().with_runtime(existing("prod"));
        fx.cluster = fx.cluster.with_namespace("prod").with_namespace_linger(100);
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .uninstall(UninstallRequest::new("prod"), &CancellationToken::new())
            .await;

        let err = outcome.error().unwrap();
        assert_eq!(err.step(), Some("uninstall-repo"));
        assert!(err.is_timeout());
        assert!(fx.platform.has_runtime("prod"));
    }
}

mod upgrade {
    use super::*;

    fn installed(fx: &mut Fixture, version: &str) {
        let current = definition(version, &["argo-events"]).named("prod");
        fx.repo = MemoryRepository::with_files(
            REPO_URL,
            [("bootstrap/prod.yaml", current.to_yaml().unwrap())],
        );
    }

    #[tokio::test]
    async fn test_upgrade_pushes_definition_and_new_components() {
        let mut fx = Fixture::new();
        installed(&mut fx, "0.1.5");
        fx.registry = StaticRegistry::new(
            vec![definition("0.2.0", &["argo-events", "argo-rollouts"])],
            Version::new(2, 0, 0),
        );
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .upgrade(UpgradeRequest::new("prod"), &CancellationToken::new())
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(outcome.report.len(), 5);
        assert_eq!(fx.repo.commits()[0], "Upgraded to 0.2.0");
        assert!(fx.repo.pushed_file("apps/argo-rollouts/prod/config.yaml").is_some());
        assert!(fx.repo.pushed_file("apps/argo-events/prod/config.yaml").is_none());
        assert!(
            orchestrator
                .summary()
                .contains("Runtime \"prod\" upgraded to version v0.2.0")
        );
    }

    #[tokio::test]
    async fn test_upgrade_to_same_or_older_version_is_rejected() {
        let mut fx = Fixture::new();
        installed(&mut fx, "0.1.5");
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .upgrade(UpgradeRequest::new("prod"), &CancellationToken::new())
            .await;

        let err = outcome.error().unwrap();
        assert_eq!(err.step(), Some("compare-versions"));
        assert!(err.to_string().contains(
            "current runtime version (0.1.5) is greater than or equal to the specified version (0.1.5)"
        ));
        assert_eq!(outcome.report.len(), 3);
        assert!(fx.repo.commits().is_empty());
        assert_eq!(fx.repo.operation_counts().writes, 0);
    }

    #[tokio::test]
    async fn test_component_failure_does_not_fail_upgrade() {
        let mut fx = Fixture::new();
        installed(&mut fx, "0.1.5");
        fx.registry = StaticRegistry::new(
            vec![definition("0.2.0", &["argo-events", "argo-rollouts"])],
            Version::new(2, 0, 0),
        );
        fx.fail_emitter = Some("create_components");
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .upgrade(UpgradeRequest::new("prod"), &CancellationToken::new())
            .await;

        assert!(outcome.completed_with_issues());
        assert_eq!(
            outcome.report.get("install-new-components").unwrap().status,
            StepStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_unsupported_schema_asks_for_cli_upgrade() {
        let mut fx = Fixture::new();
        installed(&mut fx, "0.1.5");
        fx.settings.max_def_version = Version::new(0, 9, 0);
        let orchestrator = fx.orchestrator();

        let outcome = orchestrator
            .upgrade(
                UpgradeRequest::new("prod").with_version(Version::new(0, 1, 5)),
                &CancellationToken::new(),
            )
            .await;

        let err = outcome.error().unwrap();
        assert_eq!(err.step(), Some("download-definition"));
        assert!(err.to_string().contains("upgrading to v0.1.5"));
        assert!(err.hint().unwrap().contains("Download the latest version"));
    }
}

mod list {
    use super::*;

    #[tokio::test]
    async fn test_list_runtimes() {
        let mut fx = Fixture::new();
        fx.platform = MockControlPlane::new()
            .with_runtime(existing("staging"))
            .with_runtime(existing("prod"));

        let runtimes = fx.orchestrator().list(&CancellationToken::new()).await.unwrap();
        let names: Vec<_> = runtimes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["prod", "staging"]);
    }
}
