//! Codebundle triage CLI
//!
//! Runs one diagnostic bundle against Azure or Kubernetes/Istio resources
//! and writes `<bundle>_issues.json`, `<bundle>_report.txt` and
//! `<bundle>_metrics.prom` into the output directory.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{bundles, run};

/// Codebundle triage CLI
#[derive(Parser)]
#[command(name = "triage")]
#[command(author, version, about = "Triage Azure and Kubernetes/Istio resources through their CLIs", long_about = None)]
pub struct Cli {
    /// Directory for the issue feed, report and metrics files
    #[arg(long, env = "OUTPUT_DIR", default_value = ".", global = true)]
    pub output_dir: PathBuf,

    /// Output format for the terminal summary
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Write an informational record when no issues are found
    #[arg(long, global = true)]
    pub emit_healthy_issue: bool,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// App Service Plan health and cost checks
    AppServicePlan(AzureScope),

    /// AKS cluster and node pool checks
    Aks {
        #[command(flatten)]
        azure: AzureScope,

        /// AKS cluster name
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Azure DevOps agent pool and license checks
    DevopsAgents {
        /// Organization URL, e.g. https://dev.azure.com/contoso
        #[arg(long)]
        org: Option<String>,
    },

    /// GKE ingress backend health
    GceIngress(KubeScope),

    /// Istio control plane and sidecar checks
    Istio {
        #[command(flatten)]
        kube: KubeScope,

        /// Namespace of the Istio control plane
        #[arg(long)]
        istio_namespace: Option<String>,
    },

    /// Failed operations from the Azure activity log
    ActivityLog(AzureScope),

    /// List available bundles
    Bundles,
}

/// Azure scope flags; override the matching environment variables
#[derive(Args, Debug, Clone, Default)]
pub struct AzureScope {
    /// Resource group to inspect
    #[arg(long, short = 'g')]
    pub resource_group: Option<String>,

    /// Subscription id
    #[arg(long)]
    pub subscription: Option<String>,
}

/// Kubernetes scope flags; override the matching environment variables
#[derive(Args, Debug, Clone, Default)]
pub struct KubeScope {
    /// Namespace to inspect
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// kubectl context
    #[arg(long)]
    pub context: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = execute(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let Some(kind) = cli.command.bundle_kind() else {
        bundles::list_bundles(cli.format);
        return Ok(());
    };

    let settings = config::load_settings(&cli)?;
    let options = triage_lib::RunOptions {
        emit_healthy_issue: cli.emit_healthy_issue || settings.emit_healthy_issue,
    };
    run::run_bundle(kind, &settings, &cli.output_dir, &options, cli.format).await
}
