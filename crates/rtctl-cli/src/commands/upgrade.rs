//! Upgrade command - move a runtime to a newer definition

use console::style;
use rtctl_core::UpgradeRequest;
use semver::Version;

use super::Session;
use crate::error::Result;

/// Run the upgrade command
pub async fn run(
    session: &Session,
    name: &str,
    version: Option<Version>,
    repo: Option<String>,
    git_token: Option<String>,
    context: Option<String>,
) -> Result<()> {
    let mut request = UpgradeRequest::new(name);
    request.version = version;

    println!(
        "{} Upgrading runtime {} to {}",
        style("→").blue().bold(),
        style(name).cyan(),
        style(
            request
                .version
                .as_ref()
                .map(|v| format!("v{v}"))
                .unwrap_or_else(|| "the latest version".to_string())
        )
        .yellow()
    );

    let platform = session.platform()?;
    let url = session.repo_url(&platform, name, repo).await?;
    let cluster = session.cluster(context.as_deref()).await?;
    let repo = session.repository(name, &url, git_token.as_deref()).await?;

    let orchestrator = super::orchestrator(session, cluster, platform, repo)?;
    let cancel = session.cancel.clone();
    super::run_operation(&orchestrator, orchestrator.upgrade(request, &cancel)).await
}
