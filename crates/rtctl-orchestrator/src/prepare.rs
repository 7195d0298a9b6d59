//! Ingress resolution
//!
//! Decides which ingress class and controller the runtime is installed with,
//! and derives the host names the control plane and the emitted ingress use.

use rtctl_core::{Bindings, InstallationRequest, Settings, ingress_host_name};
use rtctl_kube::{Cluster, IngressClassInfo, IngressController, IngressSelection, select_ingress_class};

use crate::error::{Error, PreflightCheck, Result};
use crate::preflight::check_failed;

/// Operator decisions taken during pre-flight. Silent requests never ask.
pub trait Prompter: Send + Sync {
    /// Pick an ingress class when several are usable; `None` aborts
    fn choose_ingress_class(&self, candidates: &[IngressClassInfo]) -> Option<String>;

    /// Approve rebinding a runtime recovered from its repository
    fn approve_recovery(&self, previous: &Bindings, next: &Bindings) -> bool;
}

/// Ingress settings resolved against the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedIngress {
    /// Selected class; `None` when ingress is skipped
    pub class: Option<IngressClassInfo>,
    pub host: String,
    pub internal_host: String,
}

impl ResolvedIngress {
    pub fn class_name(&self) -> Option<&str> {
        self.class.as_ref().map(|c| c.name.as_str())
    }

    pub fn controller(&self) -> Option<&IngressController> {
        self.class.as_ref().map(|c| &c.controller)
    }

    /// Whether a workflows ingress has to be emitted for this runtime
    pub fn creates_workflows_ingress(&self) -> bool {
        self.controller().is_some_and(IngressController::creates_workflows_ingress)
    }
}

/// Values persisted into the runtime definition for `request` on `cluster`
pub fn runtime_bindings(cluster: &str, request: &InstallationRequest, ingress: &ResolvedIngress) -> Bindings {
    Bindings {
        cluster: cluster.to_string(),
        ingress_host: request.ingress.host.clone(),
        internal_ingress_host: request.internal_host().to_string(),
        ingress_class: ingress.class_name().unwrap_or_default().to_string(),
        ingress_controller: ingress
            .controller()
            .map(|c| c.name().to_string())
            .unwrap_or_default(),
        repo: request.repo.url.clone(),
    }
}

/// Resolve the ingress class and hosts for `request`.
///
/// With `skip_ingress` nothing is looked up on the cluster. Several usable
/// classes require a prompter; silent requests never prompt.
pub async fn resolve_ingress(
    cluster: &dyn Cluster,
    request: &InstallationRequest,
    settings: &Settings,
    prompter: Option<&dyn Prompter>,
) -> Result<ResolvedIngress> {
    if request.ingress.skip_ingress {
        tracing::debug!(runtime = %request.name, "skipping ingress resolution");
        return Ok(ResolvedIngress::default());
    }

    let classes = cluster
        .ingress_classes()
        .await
        .map_err(|e| check_failed(PreflightCheck::Ingress, e))?;
    let selection = select_ingress_class(
        &classes,
        request.ingress.class.as_deref(),
        settings.bypass_ingress_class_check,
    )
    .map_err(|e| Error::validation(PreflightCheck::Ingress, e.to_string()))?;

    let class = match selection {
        IngressSelection::Selected(class) => class,
        IngressSelection::Ambiguous(candidates) => {
            let chosen = prompter
                .filter(|_| !request.flags.silent)
                .and_then(|p| p.choose_ingress_class(&candidates));
            chosen
                .and_then(|name| candidates.into_iter().find(|c| c.name == name))
                .ok_or_else(|| {
                    Error::validation(
                        PreflightCheck::Ingress,
                        "there are multiple ingress controllers on your cluster, please add the --ingress-class flag and define its value",
                    )
                })?
        }
    };

    tracing::info!(class = %class.name, controller = %class.controller, "using ingress class");

    Ok(ResolvedIngress {
        class: Some(class),
        host: ingress_host_name(&request.ingress.host),
        internal_host: ingress_host_name(request.internal_host()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtctl_kube::MockCluster;

    struct Pick(&'static str);

    impl Prompter for Pick {
        fn choose_ingress_class(&self, _candidates: &[IngressClassInfo]) -> Option<String> {
            Some(self.0.to_string())
        }

        fn approve_recovery(&self, _previous: &Bindings, _next: &Bindings) -> bool {
            true
        }
    }

    fn request() -> InstallationRequest {
        InstallationRequest::new("prod", "https://github.com/acme/isc")
            .with_ingress("https://prod.acme.io:8443/path", None)
    }

    #[tokio::test]
    async fn test_single_class_is_picked() {
        let cluster = MockCluster::new().with_ingress_class("nginx", "k8s.io/ingress-nginx");

        let resolved = resolve_ingress(&cluster, &request(), &Settings::default(), None)
            .await
            .unwrap();

        assert_eq!(resolved.class_name(), Some("nginx"));
        assert_eq!(resolved.host, "prod.acme.io");
        assert_eq!(resolved.internal_host, "prod.acme.io");
        assert!(resolved.creates_workflows_ingress());
    }

    #[tokio::test]
    async fn test_multiple_classes_need_a_choice() {
        let cluster = MockCluster::new()
            .with_ingress_class("nginx", "k8s.io/ingress-nginx")
            .with_ingress_class("alb", "ingress.k8s.aws/alb");

        let err = resolve_ingress(&cluster, &request(), &Settings::default(), None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("--ingress-class"));

        let resolved = resolve_ingress(&cluster, &request(), &Settings::default(), Some(&Pick("alb")))
            .await
            .unwrap();
        assert_eq!(resolved.class_name(), Some("alb"));
        assert!(!resolved.creates_workflows_ingress());
    }

    #[tokio::test]
    async fn test_silent_request_never_prompts() {
        let cluster = MockCluster::new()
            .with_ingress_class("nginx", "k8s.io/ingress-nginx")
            .with_ingress_class("traefik", "traefik.io/ingress-controller");

        let result =
            resolve_ingress(&cluster, &request().silent(), &Settings::default(), Some(&Pick("nginx"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_class_is_rejected_unless_bypassed() {
        let cluster = MockCluster::new().with_ingress_class("custom", "example.com/custom");
        let req = request().with_ingress("prod.acme.io", Some("custom".to_string()));

        let err = resolve_ingress(&cluster, &req, &Settings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { check: PreflightCheck::Ingress, .. }));

        let settings = Settings {
            bypass_ingress_class_check: true,
            ..Default::default()
        };
        let resolved = resolve_ingress(&cluster, &req, &settings, None).await.unwrap();
        assert_eq!(resolved.class_name(), Some("custom"));
    }

    #[tokio::test]
    async fn test_runtime_bindings() {
        let cluster = MockCluster::new().with_ingress_class("nginx", "nginx.org/ingress-controller");
        let req = request().with_ingress("https://prod.acme.io", None);
        let resolved = resolve_ingress(&cluster, &req, &Settings::default(), None)
            .await
            .unwrap();

        let bindings = runtime_bindings("https://10.0.0.1:6443", &req, &resolved);
        assert_eq!(bindings.cluster, "https://10.0.0.1:6443");
        assert_eq!(bindings.ingress_host, "https://prod.acme.io");
        assert_eq!(bindings.ingress_class, "nginx");
        assert_eq!(bindings.ingress_controller, "nginx.org/ingress-controller");
        assert_eq!(bindings.repo, "https://github.com/acme/isc");
    }

    #[tokio::test]
    async fn test_skip_ingress_does_not_touch_cluster() {
        let cluster = MockCluster::new();
        let req = InstallationRequest::new("prod", "https://github.com/acme/isc").without_ingress();

        let resolved = resolve_ingress(&cluster, &req, &Settings::default(), None)
            .await
            .unwrap();
        assert_eq!(resolved, ResolvedIngress::default());
        assert_eq!(cluster.operation_counts().lists, 0);
    }
}
