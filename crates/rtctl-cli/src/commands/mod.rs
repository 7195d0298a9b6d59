//! CLI commands

pub mod install;
pub mod list;
pub mod uninstall;
pub mod upgrade;

use console::style;
use rtctl_core::Settings;
use rtctl_kube::KubeCluster;
use rtctl_orchestrator::{Orchestrator, Outcome, SummaryGuard};
use rtctl_platform::{ControlPlane, HttpControlPlane};
use rtctl_repo::{CloneOptions, Git2Repository, HttpRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::display;
use crate::error::{CliError, Result};

/// State shared by every command
pub struct Session {
    pub settings: Settings,
    /// Control plane API token
    pub token: Option<String>,
    /// Root cancellation, fired on ctrl-c
    pub cancel: CancellationToken,
}

impl Session {
    pub fn platform(&self) -> Result<HttpControlPlane> {
        let token = self.token.as_deref().ok_or_else(|| {
            CliError::usage(
                "missing control plane token",
                "set RTCTL_TOKEN or pass --token",
            )
        })?;
        Ok(HttpControlPlane::new(&self.settings.control_plane_url, token)?)
    }

    pub fn registry(&self) -> Result<HttpRegistry> {
        Ok(HttpRegistry::new(
            &self.settings.registry_url,
            self.settings.max_def_version.clone(),
        )?)
    }

    pub async fn cluster(&self, context: Option<&str>) -> Result<KubeCluster> {
        Ok(KubeCluster::connect(context).await?)
    }

    /// Clone the installation repository into the local cache
    pub async fn repository(
        &self,
        runtime: &str,
        url: &str,
        git_token: Option<&str>,
    ) -> Result<Git2Repository> {
        let workdir = repo_cache_dir().join(runtime);
        tracing::debug!(%url, workdir = %workdir.display(), "opening installation repository");

        let mut opts = CloneOptions::new(url, workdir);
        if let Some(token) = git_token {
            opts = opts.with_token(token);
        }
        Ok(Git2Repository::clone_or_open(opts).await?)
    }

    /// Repository url of an installed runtime, unless given explicitly
    pub async fn repo_url(
        &self,
        platform: &dyn ControlPlane,
        runtime: &str,
        explicit: Option<String>,
    ) -> Result<String> {
        if let Some(url) = explicit {
            return Ok(url);
        }
        platform
            .get_runtime(runtime)
            .await?
            .repo
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                CliError::usage(
                    format!("runtime \"{}\" has no known installation repository", runtime),
                    "pass the repository with --repo",
                )
            })
    }
}

fn repo_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rtctl")
        .join("repos")
}

/// Run one orchestrator operation and print its summary exactly once
pub async fn run_operation(
    orchestrator: &Orchestrator,
    operation: impl Future<Output = Outcome>,
) -> Result<()> {
    let outcome = {
        let _guard = SummaryGuard::new(orchestrator.summary().clone(), display::print_summary);
        operation.await
    };

    if let Some(rollback) = &outcome.rollback {
        tracing::debug!(steps = rollback.len(), "rollback finished");
    }
    if outcome.completed_with_issues() {
        let issues = outcome.report.soft_failures().count();
        eprintln!(
            "{} completed with {}",
            style("⚠").yellow(),
            display::pluralize(issues, "issue", "issues")
        );
    }
    outcome.result.map_err(CliError::from)
}

/// Build an orchestrator around live collaborators
pub fn orchestrator(
    session: &Session,
    cluster: KubeCluster,
    platform: HttpControlPlane,
    repo: Git2Repository,
) -> Result<Orchestrator> {
    Ok(Orchestrator::new(
        Arc::new(cluster),
        Arc::new(platform),
        Arc::new(repo),
        Arc::new(session.registry()?),
        session.settings.clone(),
    ))
}
