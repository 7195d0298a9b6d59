//! Uninstall command - remove a runtime from the cluster, the repository and the platform

use console::style;
use rtctl_core::UninstallRequest;

use super::Session;
use crate::error::Result;

/// Run the uninstall command
pub async fn run(
    session: &Session,
    name: &str,
    repo: Option<String>,
    git_token: Option<String>,
    context: Option<String>,
    force: bool,
    skip_checks: bool,
) -> Result<()> {
    let mut request = UninstallRequest::new(name);
    request.force = force;
    request.skip_checks = skip_checks;
    request.kube_context = context;

    println!(
        "{} Uninstalling runtime {}",
        style("→").blue().bold(),
        style(name).cyan()
    );
    if force {
        println!(
            "{} Failures will not stop the uninstall (--force)",
            style("⚠").yellow()
        );
    }

    let platform = session.platform()?;
    let url = session.repo_url(&platform, name, repo).await?;
    let cluster = session.cluster(request.kube_context.as_deref()).await?;
    let repo = session.repository(name, &url, git_token.as_deref()).await?;

    let orchestrator = super::orchestrator(session, cluster, platform, repo)?.with_progress(true);
    let cancel = session.cancel.clone();
    super::run_operation(&orchestrator, orchestrator.uninstall(request, &cancel)).await
}
