//! Install command - install a runtime on the current cluster

use console::{Term, style};
use rtctl_core::{Bindings, InstallationRequest};
use rtctl_kube::IngressClassInfo;
use rtctl_orchestrator::Prompter;
use semver::Version;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::Session;
use crate::error::{CliError, Result};

/// Install command arguments, as parsed from the command line
#[derive(Debug, Default)]
pub struct InstallArgs {
    pub name: String,
    pub repo: String,
    pub git_token: Option<String>,
    pub provider: Option<String>,
    pub provider_api_url: Option<String>,
    pub version: Option<Version>,
    pub ingress_host: Option<String>,
    pub internal_ingress_host: Option<String>,
    pub ingress_class: Option<String>,
    pub skip_ingress: bool,
    pub context: Option<String>,
    pub skip_cluster_checks: bool,
    pub disable_rollback: bool,
    pub from_repo: bool,
    pub demo_resources: bool,
    pub skip_git_integration: bool,
    pub silent: bool,
    pub namespace_labels: Vec<String>,
    pub ingress_annotations: Vec<String>,
    pub internal_ingress_annotations: Vec<String>,
}

/// Asks the operator on the terminal
struct TermPrompter;

impl Prompter for TermPrompter {
    fn choose_ingress_class(&self, candidates: &[IngressClassInfo]) -> Option<String> {
        let term = Term::stderr();
        if !term.is_term() {
            return None;
        }

        term.write_line(&format!(
            "{} Select an ingress class:",
            style("?").yellow().bold()
        ))
        .ok()?;
        for (i, class) in candidates.iter().enumerate() {
            term.write_line(&format!("  {}) {} ({})", i + 1, class.name, class.controller))
                .ok()?;
        }

        let answer = term.read_line().ok()?;
        let index: usize = answer.trim().parse().ok()?;
        candidates
            .get(index.checked_sub(1)?)
            .map(|class| class.name.clone())
    }

    fn approve_recovery(&self, previous: &Bindings, next: &Bindings) -> bool {
        let term = Term::stderr();
        if !term.is_term() {
            return false;
        }

        for line in recovery_lines(previous, next) {
            if term.write_line(&line).is_err() {
                return false;
            }
        }
        if term
            .write_str(&format!("{} Do you wish to proceed? [y/N] ", style("?").yellow().bold()))
            .is_err()
        {
            return false;
        }
        term.read_line()
            .map(|answer| is_yes(&answer))
            .unwrap_or(false)
    }
}

/// Previous and new bindings, side by side
fn recovery_lines(previous: &Bindings, next: &Bindings) -> Vec<String> {
    let rows = [
        ("Cluster server", &previous.cluster, &next.cluster),
        ("Ingress class", &previous.ingress_class, &next.ingress_class),
        ("Ingress controller", &previous.ingress_controller, &next.ingress_controller),
        ("Ingress host", &previous.ingress_host, &next.ingress_host),
    ];
    let mut lines = vec![format!(
        "{:<20} {:<40} {}",
        "",
        style("PREVIOUS").bold(),
        style("NEW").bold()
    )];
    for (label, before, after) in rows {
        let after = if before == after {
            style(after.as_str())
        } else {
            style(after.as_str()).yellow()
        };
        lines.push(format!("{:<20} {:<40} {}", label, before, after));
    }
    lines
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Parse repeated `key=value` flags
pub fn parse_pairs(flag: &str, values: &[String]) -> Result<BTreeMap<String, String>> {
    values
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(CliError::usage(
                format!("invalid {} value \"{}\"", flag, pair),
                format!("use --{} key=value", flag),
            )),
        })
        .collect()
}

/// Build the installation request from the command line
pub fn build_request(args: &InstallArgs, skip_ingress_default: bool) -> Result<InstallationRequest> {
    let mut request = InstallationRequest::new(&args.name, &args.repo);
    request.version = args.version.clone();
    request.kube_context = args.context.clone();

    request.repo.token = args.git_token.clone();
    request.repo.provider = args.provider.clone();
    request.repo.api_url = args.provider_api_url.clone();

    request.ingress.skip_ingress =
        args.skip_ingress || (skip_ingress_default && args.ingress_host.is_none());
    request.ingress.host = args.ingress_host.clone().unwrap_or_default();
    request.ingress.internal_host = args.internal_ingress_host.clone();
    request.ingress.class = args.ingress_class.clone();
    request.ingress.external_annotations = parse_pairs("ingress-annotation", &args.ingress_annotations)?;
    request.ingress.internal_annotations =
        parse_pairs("internal-ingress-annotation", &args.internal_ingress_annotations)?;

    request.flags.skip_cluster_checks = args.skip_cluster_checks;
    request.flags.disable_rollback = args.disable_rollback;
    request.flags.demo_resources = args.demo_resources;
    request.flags.skip_git_integration = args.skip_git_integration;
    request.flags.silent = args.silent;
    if args.from_repo {
        request = request.from_repo();
    }

    request.namespace_labels = parse_pairs("namespace-labels", &args.namespace_labels)?;
    Ok(request)
}

/// Run the install command
pub async fn run(session: &Session, args: InstallArgs) -> Result<()> {
    let request = build_request(&args, session.settings.skip_ingress)?;

    println!(
        "{} Installing runtime {} from {}",
        style("→").blue().bold(),
        style(&request.name).cyan(),
        style(&request.repo.url).yellow()
    );

    let platform = session.platform()?;
    let cluster = session.cluster(request.kube_context.as_deref()).await?;
    let repo = session
        .repository(&request.name, &request.repo.url, request.repo.token.as_deref())
        .await?;

    let orchestrator = super::orchestrator(session, cluster, platform, repo)?
        .with_prompter(Arc::new(TermPrompter))
        .with_progress(!request.flags.silent);

    let cancel = session.cancel.clone();
    super::run_operation(&orchestrator, orchestrator.install(request, &cancel)).await
}
