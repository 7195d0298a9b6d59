//! rtctl CLI - Install, uninstall and upgrade GitOps runtimes

use clap::{Parser, Subcommand};
use semver::Version;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rtctl_core::Settings;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::Session;
use commands::install::InstallArgs;
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "rtctl")]
#[command(author = "rtctl Contributors")]
#[command(version)]
#[command(about = "Install, uninstall and upgrade GitOps runtimes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Settings file (default: <config dir>/rtctl/config.yaml)
    #[arg(long, global = true, env = "RTCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Control plane API token
    #[arg(long, global = true, env = "RTCTL_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a runtime on the current cluster
    Install {
        /// Runtime name
        name: String,

        /// Installation repository clone url
        #[arg(long)]
        repo: String,

        /// Git token used to push to the installation repository
        #[arg(long, env = "GIT_TOKEN", hide_env_values = true)]
        git_token: Option<String>,

        /// Git provider kind (github, gitlab, bitbucket, ...)
        #[arg(long)]
        provider: Option<String>,

        /// Git provider API url, for self-hosted providers
        #[arg(long)]
        provider_api_url: Option<String>,

        /// Runtime version (default: latest)
        #[arg(long)]
        version: Option<Version>,

        /// External ingress url of the runtime
        #[arg(long)]
        ingress_host: Option<String>,

        /// Ingress url the platform reaches the runtime on
        #[arg(long)]
        internal_ingress_host: Option<String>,

        /// Ingress class to use
        #[arg(long)]
        ingress_class: Option<String>,

        /// Install without ingress resources
        #[arg(long)]
        skip_ingress: bool,

        /// Kubeconfig context (default: current context)
        #[arg(long)]
        context: Option<String>,

        /// Skip the cluster requirements check
        #[arg(long)]
        skip_cluster_checks: bool,

        /// Keep what was created when the installation fails
        #[arg(long)]
        disable_rollback: bool,

        /// Re-install a runtime from its existing repository
        #[arg(long)]
        from_repo: bool,

        /// Add demo workflow resources to the git source
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        demo_resources: bool,

        /// Do not create the default git integration
        #[arg(long)]
        skip_git_integration: bool,

        /// Never prompt
        #[arg(long)]
        silent: bool,

        /// Labels of the runtime namespace (key=value)
        #[arg(long = "namespace-labels")]
        namespace_labels: Vec<String>,

        /// Annotations of the workflows ingress (key=value)
        #[arg(long = "ingress-annotation")]
        ingress_annotations: Vec<String>,

        /// Annotations of the app-proxy ingress (key=value)
        #[arg(long = "internal-ingress-annotation")]
        internal_ingress_annotations: Vec<String>,
    },

    /// Uninstall a runtime
    Uninstall {
        /// Runtime name
        name: String,

        /// Installation repository (default: as registered on the platform)
        #[arg(long)]
        repo: Option<String>,

        /// Git token used to push to the installation repository
        #[arg(long, env = "GIT_TOKEN", hide_env_values = true)]
        git_token: Option<String>,

        /// Kubeconfig context (default: current context)
        #[arg(long)]
        context: Option<String>,

        /// Keep going when a step fails
        #[arg(long)]
        force: bool,

        /// Do not check that the runtime exists
        #[arg(long)]
        skip_checks: bool,
    },

    /// Upgrade a runtime to a newer version
    Upgrade {
        /// Runtime name
        name: String,

        /// Target version (default: latest)
        #[arg(long)]
        version: Option<Version>,

        /// Installation repository (default: as registered on the platform)
        #[arg(long)]
        repo: Option<String>,

        /// Git token used to push to the installation repository
        #[arg(long, env = "GIT_TOKEN", hide_env_values = true)]
        git_token: Option<String>,

        /// Kubeconfig context (default: current context)
        #[arg(long)]
        context: Option<String>,
    },

    /// List runtimes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("RTCTL_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    settings.map_err(|e| CliError::usage(format!("failed to load settings: {}", e), "check the settings file"))
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_ref())?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let session = Session {
        settings,
        token: cli.token,
        cancel,
    };

    match cli.command {
        Commands::Install {
            name,
            repo,
            git_token,
            provider,
            provider_api_url,
            version,
            ingress_host,
            internal_ingress_host,
            ingress_class,
            skip_ingress,
            context,
            skip_cluster_checks,
            disable_rollback,
            from_repo,
            demo_resources,
            skip_git_integration,
            silent,
            namespace_labels,
            ingress_annotations,
            internal_ingress_annotations,
        } => {
            commands::install::run(
                &session,
                InstallArgs {
                    name,
                    repo,
                    git_token,
                    provider,
                    provider_api_url,
                    version,
                    ingress_host,
                    internal_ingress_host,
                    ingress_class,
                    skip_ingress,
                    context,
                    skip_cluster_checks,
                    disable_rollback,
                    from_repo,
                    demo_resources,
                    skip_git_integration,
                    silent,
                    namespace_labels,
                    ingress_annotations,
                    internal_ingress_annotations,
                },
            )
            .await
        }

        Commands::Uninstall {
            name,
            repo,
            git_token,
            context,
            force,
            skip_checks,
        } => commands::uninstall::run(&session, &name, repo, git_token, context, force, skip_checks).await,

        Commands::Upgrade {
            name,
            version,
            repo,
            git_token,
            context,
        } => commands::upgrade::run(&session, &name, version, repo, git_token, context).await,

        Commands::List { json } => commands::list::run(&session, json).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // help and version are printed to stdout and are not failures
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code)
        }
    }
}
