//! Manifest emission
//!
//! The [`ManifestEmitter`] turns declarative parameters into resource
//! descriptions and persists them into the installation repository. Resources
//! that have to exist in the cluster before GitOps takes over are returned
//! as manifests for the caller to apply.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use rtctl_core::{RuntimeDefinition, WellKnownNames};
use rtctl_kube::MERGEABLE_INGRESS_TYPE;
use rtctl_repo::GitRepository;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Label marking resources managed by the runtime
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label carrying the runtime a resource belongs to
pub const LABEL_RUNTIME: &str = "rtctl.io/runtime";

const MANAGER: &str = "rtctl";

/// Parameters of the repository bootstrap
#[derive(Debug, Clone)]
pub struct BootstrapParams {
    pub runtime: String,
    /// Source of the GitOps engine manifests
    pub app_specifier: String,
    pub namespace_labels: BTreeMap<String, String>,
    /// Recovering from an already bootstrapped repository
    pub recover: bool,
}

/// An application to create for a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentApp {
    pub name: String,
    pub source: String,
}

/// A git source to create
#[derive(Debug, Clone)]
pub struct GitSourceParams {
    pub name: String,
    pub repo_url: String,
    /// Directory within `repo_url` the source syncs
    pub path: String,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub demo_resources: bool,
}

/// Ingress exposing the runtime's workflows endpoint
#[derive(Debug, Clone)]
pub struct WorkflowsIngress {
    pub host: String,
    pub class: String,
    pub annotations: BTreeMap<String, String>,
}

/// Master ingress the NGINX enterprise controller merges the runtime's
/// minion ingresses into
#[derive(Debug, Clone)]
pub struct MasterIngress {
    pub host: String,
    pub class: String,
    /// Merged over the mergeable-ingress-type annotation
    pub annotations: BTreeMap<String, String>,
}

/// App-proxy configuration, and its ingress unless ingress is skipped
#[derive(Debug, Clone)]
pub struct AppProxyParams {
    /// Control plane url the app-proxy reports to and accepts requests from
    pub control_plane_url: String,
    /// `None` skips the ingress
    pub ingress: Option<AppProxyIngress>,
}

#[derive(Debug, Clone)]
pub struct AppProxyIngress {
    /// Internal host when one is set
    pub host: String,
    pub class: String,
    /// Internal annotations followed by the controller's decorations
    pub annotations: BTreeMap<String, String>,
}

/// Service the app-proxy ingress routes to
pub const APP_PROXY_SERVICE: &str = "app-proxy";
pub const APP_PROXY_PORT: i32 = 3017;
pub const APP_PROXY_PATH: &str = "/app-proxy";

/// Builds and persists runtime resources
#[async_trait]
pub trait ManifestEmitter: Send + Sync {
    /// Persist the bootstrap and return the in-cluster manifest
    async fn bootstrap(&self, params: &BootstrapParams) -> Result<String>;

    async fn create_project(&self, runtime: &str) -> Result<()>;

    /// Write the runtime definition and push it with `message`
    async fn persist_definition(&self, definition: &RuntimeDefinition, message: &str) -> Result<()>;

    async fn load_definition(&self, runtime: &str) -> Result<RuntimeDefinition>;

    async fn create_components(&self, runtime: &str, components: &[ComponentApp]) -> Result<()>;

    async fn create_ingress(&self, runtime: &str, ingress: &WorkflowsIngress) -> Result<()>;

    async fn create_master_ingress(&self, runtime: &str, ingress: &MasterIngress) -> Result<()>;

    async fn configure_app_proxy(&self, runtime: &str, params: &AppProxyParams) -> Result<()>;

    async fn create_reporters(&self, runtime: &str) -> Result<()>;

    async fn create_git_source(&self, runtime: &str, source: &GitSourceParams) -> Result<()>;

    /// Persist the OpenShift security context grant and return it
    async fn openshift_grant(&self, runtime: &str) -> Result<String>;

    /// Manifest of the secret holding the runtime token; never persisted
    fn token_secret(&self, runtime: &str, token: &str, iv: &str) -> Result<String>;

    /// Remove everything the runtime owns from the repository and push
    async fn remove_runtime(&self, runtime: &str) -> Result<()>;
}

/// Emitter writing into a [`GitRepository`]
pub struct RepoEmitter {
    repo: Arc<dyn GitRepository>,
    names: WellKnownNames,
}

impl RepoEmitter {
    pub fn new(repo: Arc<dyn GitRepository>, names: WellKnownNames) -> Self {
        Self { repo, names }
    }

    pub fn definition_path(&self, runtime: &str) -> String {
        format!("{}/{}.yaml", self.names.bootstrap_dir, runtime)
    }

    fn app_path(&self, app: &str, runtime: &str) -> String {
        format!("{}/{}/{}/config.yaml", self.names.apps_dir, app, runtime)
    }

    async fn write_docs(&self, path: &str, docs: &[Value]) -> Result<()> {
        let content = join_manifests(docs)?;
        Ok(self.repo.write_file(path, content.as_bytes()).await?)
    }

    /// Write a typed resource, keeping its field order
    async fn write_resource<T: serde::Serialize>(&self, path: &str, resource: &T) -> Result<()> {
        let content = serde_yaml::to_string(resource)?;
        Ok(self.repo.write_file(path, content.as_bytes()).await?)
    }

    pub fn master_ingress_path(&self) -> String {
        format!("{}/cluster-resources/in-cluster/master-ingress.yaml", self.names.bootstrap_dir)
    }

    pub fn app_proxy_resources(&self, runtime: &str) -> String {
        format!("{}/{}/{}/resources", self.names.apps_dir, APP_PROXY_SERVICE, runtime)
    }
}

#[async_trait]
impl ManifestEmitter for RepoEmitter {
    async fn bootstrap(&self, params: &BootstrapParams) -> Result<String> {
        let runtime = &params.runtime;
        let dir = &self.names.bootstrap_dir;
        let engine = &self.names.argocd_component;

        if !params.recover {
            self.write_docs(
                &format!("{dir}/{engine}/kustomization.yaml"),
                &[json!({
                    "apiVersion": "kustomize.config.k8s.io/v1beta1",
                    "kind": "Kustomization",
                    "namespace": runtime,
                    "resources": [params.app_specifier],
                })],
            )
            .await?;
            self.write_docs(
                &format!("{dir}/root.yaml"),
                &[application(runtime, "root", self.repo.url(), &self.names.projects_dir)],
            )
            .await?;
            self.repo.commit_and_push("Bootstrapped runtime repository").await?;
        }

        let mut labels = params.namespace_labels.clone();
        labels.insert(LABEL_MANAGED_BY.to_string(), MANAGER.to_string());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(runtime.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        };

        join_manifests(&[
            serde_json::to_value(&namespace)?,
            application(runtime, engine, &params.app_specifier, ""),
        ])
    }

    async fn create_project(&self, runtime: &str) -> Result<()> {
        let project = json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "AppProject",
            "metadata": {"name": runtime, "namespace": runtime, "labels": {LABEL_RUNTIME: runtime}},
            "spec": {
                "sourceRepos": ["*"],
                "destinations": [{"namespace": "*", "server": "*"}],
                "clusterResourceWhitelist": [{"group": "*", "kind": "*"}],
            },
        });
        let app_set = json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "ApplicationSet",
            "metadata": {"name": runtime, "namespace": runtime},
            "spec": {
                "generators": [{"git": {
                    "repoURL": self.repo.url(),
                    "files": [{"path": format!("{}/**/{}/config.yaml", self.names.apps_dir, runtime)}],
                }}],
                "template": {
                    "metadata": {"name": format!("{runtime}-{{{{ appName }}}}"), "labels": {LABEL_RUNTIME: runtime}},
                    "spec": {
                        "project": runtime,
                        "source": {"repoURL": "{{ srcRepoURL }}", "path": "{{ srcPath }}", "targetRevision": "{{ srcTargetRevision }}"},
                        "destination": {"namespace": "{{ destNamespace }}", "server": "{{ destServer }}"},
                    },
                },
            },
        });
        self.write_docs(
            &format!("{}/{}.yaml", self.names.projects_dir, runtime),
            &[project, app_set],
        )
        .await?;
        Ok(self.repo.commit_and_push(&format!("Added project '{runtime}'")).await?)
    }

    async fn persist_definition(&self, definition: &RuntimeDefinition, message: &str) -> Result<()> {
        let path = self.definition_path(definition.name());
        let content = definition.to_yaml()?;
        self.repo.write_file(&path, content.as_bytes()).await?;
        Ok(self.repo.commit_and_push(message).await?)
    }

    async fn load_definition(&self, runtime: &str) -> Result<RuntimeDefinition> {
        let path = self.definition_path(runtime);
        let bytes = self.repo.read_file(&path).await?;
        let content = String::from_utf8(bytes)
            .map_err(|_| Error::Failed(format!("'{}' is not valid UTF-8", path)))?;
        Ok(RuntimeDefinition::from_yaml(&content)?)
    }

    async fn create_components(&self, runtime: &str, components: &[ComponentApp]) -> Result<()> {
        for component in components {
            tracing::info!(component = %component.name, "creating component");
            self.write_docs(
                &self.app_path(&component.name, runtime),
                &[app_config(runtime, &component.name, &component.source)],
            )
            .await?;
        }
        Ok(self.repo.commit_and_push("Created runtime components").await?)
    }

    async fn create_ingress(&self, runtime: &str, ingress: &WorkflowsIngress) -> Result<()> {
        let name = format!("{runtime}-workflows-ingress");
        let manifest = json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": {"name": name, "namespace": runtime, "annotations": ingress.annotations},
            "spec": {
                "ingressClassName": ingress.class,
                "rules": [{"host": ingress.host, "http": {"paths": [{
                    "path": "/workflows/",
                    "pathType": "ImplementationSpecific",
                    "backend": {"service": {"name": "argo-server", "port": {"number": 2746}}},
                }]}}],
            },
        });
        self.write_docs(
            &format!("{}/{}/{}/resources/ingress.yaml", self.names.apps_dir, "workflows", runtime),
            &[manifest],
        )
        .await?;
        Ok(self.repo.commit_and_push("Created workflows ingress").await?)
    }

    async fn create_master_ingress(&self, runtime: &str, ingress: &MasterIngress) -> Result<()> {
        let mut annotations =
            BTreeMap::from([(MERGEABLE_INGRESS_TYPE.to_string(), "master".to_string())]);
        annotations.extend(ingress.annotations.clone());

        let master = ingress_resource(
            &format!("{runtime}-master"),
            runtime,
            &ingress.class,
            &ingress.host,
            annotations,
            None,
        );
        self.write_resource(&self.master_ingress_path(), &master).await?;
        tracing::info!(runtime, "pushing master ingress manifest");
        Ok(self.repo.commit_and_push("Created master ingress resource").await?)
    }

    async fn configure_app_proxy(&self, runtime: &str, params: &AppProxyParams) -> Result<()> {
        let resources = self.app_proxy_resources(runtime);
        let config = ConfigMap {
            metadata: ObjectMeta {
                name: Some(format!("{APP_PROXY_SERVICE}-cm")),
                namespace: Some(runtime.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                ("argoWorkflowsInsecure".to_string(), "true".to_string()),
                ("controlPlaneHost".to_string(), params.control_plane_url.clone()),
                ("cors".to_string(), params.control_plane_url.clone()),
                ("env".to_string(), "production".to_string()),
            ])),
            ..Default::default()
        };
        self.write_resource(&format!("{resources}/config.yaml"), &config).await?;

        if let Some(ingress) = &params.ingress {
            let path = HTTPIngressPath {
                path: Some(APP_PROXY_PATH.to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: APP_PROXY_SERVICE.to_string(),
                        port: Some(ServiceBackendPort {
                            number: Some(APP_PROXY_PORT),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            };
            let resource = ingress_resource(
                &format!("{runtime}-{APP_PROXY_SERVICE}"),
                runtime,
                &ingress.class,
                &ingress.host,
                ingress.annotations.clone(),
                Some(vec![path]),
            );
            self.write_resource(&format!("{resources}/ingress.yaml"), &resource).await?;
        }

        tracing::info!(runtime, "pushing app-proxy manifests");
        Ok(self.repo.commit_and_push("Created App-Proxy Ingress").await?)
    }

    async fn create_reporters(&self, runtime: &str) -> Result<()> {
        for reporter in self.names.reporters() {
            let resources = format!("{}/{}/{}/resources", self.names.apps_dir, reporter, runtime);
            self.write_docs(
                &self.app_path(reporter, runtime),
                &[app_config(runtime, reporter, &format!("{}/{}", self.repo.url(), resources))],
            )
            .await?;
            self.write_docs(
                &format!("{resources}/sensor.yaml"),
                &[json!({
                    "apiVersion": "argoproj.io/v1alpha1",
                    "kind": "Sensor",
                    "metadata": {"name": reporter, "namespace": runtime, "labels": {LABEL_RUNTIME: runtime}},
                    "spec": {"dependencies": [{"name": reporter, "eventSourceName": reporter, "eventName": reporter}]},
                })],
            )
            .await?;
        }
        Ok(self.repo.commit_and_push("Created reporters").await?)
    }

    async fn create_git_source(&self, runtime: &str, source: &GitSourceParams) -> Result<()> {
        let mut directory = serde_json::Map::new();
        directory.insert("recurse".to_string(), json!(true));
        if let Some(include) = &source.include {
            directory.insert("include".to_string(), json!(include));
        }
        if let Some(exclude) = &source.exclude {
            directory.insert("exclude".to_string(), json!(exclude));
        }

        let mut app = application(runtime, &source.name, &source.repo_url, &source.path);
        app["spec"]["source"]["directory"] = Value::Object(directory);
        self.write_docs(&self.app_path(&source.name, runtime), &[app]).await?;

        if source.demo_resources {
            self.write_docs(
                &format!("{}/demo-workflow-template.yaml", source.path),
                &[json!({
                    "apiVersion": "argoproj.io/v1alpha1",
                    "kind": "WorkflowTemplate",
                    "metadata": {"name": "demo-workflow-template", "namespace": runtime},
                    "spec": {"entrypoint": "whalesay", "templates": [{
                        "name": "whalesay",
                        "container": {"image": "docker/whalesay", "command": ["cowsay"], "args": ["hello world"]},
                    }]},
                })],
            )
            .await?;
        }
        Ok(self
            .repo
            .commit_and_push(&format!("Created git source '{}'", source.name))
            .await?)
    }

    async fn openshift_grant(&self, runtime: &str) -> Result<String> {
        let grant = json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRoleBinding",
            "metadata": {"name": format!("{runtime}-anyuid"), "labels": {LABEL_RUNTIME: runtime}},
            "roleRef": {
                "apiGroup": "rbac.authorization.k8s.io",
                "kind": "ClusterRole",
                "name": "system:openshift:scc:anyuid",
            },
            "subjects": [{"kind": "Group", "apiGroup": "rbac.authorization.k8s.io", "name": format!("system:serviceaccounts:{runtime}")}],
        });
        let manifest = join_manifests(&[grant])?;
        self.repo
            .write_file(
                &format!("{}/openshift/{}/scc.yaml", self.names.bootstrap_dir, runtime),
                manifest.as_bytes(),
            )
            .await?;
        self.repo.commit_and_push("Added OpenShift security context grant").await?;
        Ok(manifest)
    }

    fn token_secret(&self, runtime: &str, token: &str, iv: &str) -> Result<String> {
        let mut data = BTreeMap::new();
        data.insert(self.names.token_secret_key.clone(), token.to_string());
        data.insert(self.names.store_iv_secret_key.clone(), iv.to_string());

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(self.names.token_secret.clone()),
                namespace: Some(runtime.to_string()),
                labels: Some(BTreeMap::from([(
                    LABEL_MANAGED_BY.to_string(),
                    MANAGER.to_string(),
                )])),
                ..Default::default()
            },
            string_data: Some(data),
            ..Default::default()
        };
        join_manifests(&[serde_json::to_value(&secret)?])
    }

    async fn remove_runtime(&self, runtime: &str) -> Result<()> {
        for app in self.repo.list_dir(&self.names.apps_dir).await? {
            self.repo
                .remove_path(&format!("{}/{}/{}", self.names.apps_dir, app, runtime))
                .await?;
        }
        self.repo
            .remove_path(&format!("{}/{}.yaml", self.names.projects_dir, runtime))
            .await?;
        self.repo.remove_path(runtime).await?;
        self.repo.remove_path(&self.names.bootstrap_dir).await?;
        Ok(self
            .repo
            .commit_and_push(&format!("Uninstalled runtime '{runtime}'"))
            .await?)
    }
}

/// Single-host ingress; a master ingress has no paths of its own
fn ingress_resource(
    name: &str,
    namespace: &str,
    class: &str,
    host: &str,
    annotations: BTreeMap<String, String>,
    paths: Option<Vec<HTTPIngressPath>>,
) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: (!annotations.is_empty()).then_some(annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(class.to_string()),
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: paths.map(|paths| HTTPIngressRuleValue { paths }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn application(namespace: &str, name: &str, repo_url: &str, path: &str) -> Value {
    json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "Application",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": {LABEL_MANAGED_BY: MANAGER, LABEL_RUNTIME: namespace},
        },
        "spec": {
            "project": "default",
            "source": {"repoURL": repo_url, "path": path, "targetRevision": "HEAD"},
            "destination": {"namespace": namespace, "server": "https://kubernetes.default.svc"},
            "syncPolicy": {"automated": {"prune": true, "selfHeal": true, "allowEmpty": true}},
        },
    })
}

fn app_config(runtime: &str, app: &str, source: &str) -> Value {
    let (location, query) = source.split_once('?').unwrap_or((source, ""));
    let revision = query
        .split('&')
        .find_map(|kv| kv.strip_prefix("ref="))
        .unwrap_or("HEAD");
    let location = location
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    // host/org/repo[/path]
    let mut parts = location.splitn(4, '/');
    let repo: Vec<&str> = parts.by_ref().take(3).collect();
    let path = parts.next().unwrap_or_default();

    json!({
        "appName": app,
        "userGivenName": app,
        "destNamespace": runtime,
        "destServer": "https://kubernetes.default.svc",
        "srcRepoURL": format!("https://{}", repo.join("/")),
        "srcPath": path,
        "srcTargetRevision": revision,
    })
}

/// Join documents into one multi-document manifest
pub fn join_manifests(docs: &[Value]) -> Result<String> {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        out.push_str(&serde_yaml::to_string(doc)?);
    }
    Ok(out)
}
