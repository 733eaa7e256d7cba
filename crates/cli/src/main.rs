//! kddctl - Kubernetes workload dashboard CLI
//!
//! Queries the kdd REST API for namespaces, nodes, workloads and
//! downsampled container metrics.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cluster, metrics, workloads};

/// Kubernetes workload dashboard CLI
#[derive(Parser)]
#[command(name = "kddctl")]
#[command(author, version, about = "CLI for the Kubernetes workload dashboard", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via KDD_API_URL env var)
    #[arg(long, env = "KDD_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List namespaces
    Namespaces,

    /// Show a namespace with its workloads and events
    Namespace {
        /// Namespace name
        name: String,
    },

    /// List nodes
    Nodes,

    /// List workloads
    Workloads {
        /// Only this kind (deployments, daemonsets, statefulsets, pods, jobs, cronjobs)
        #[arg(long, short)]
        kind: Option<String>,

        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Show a workload with its pods and metrics
    Workload {
        /// Plural kind, e.g. deployments
        kind: String,

        /// Namespace of the workload
        namespace: String,

        /// Workload name
        name: String,

        /// Downsampling window for metrics (e.g. 30s, 5m, 1h)
        #[arg(long, default_value = "5m")]
        rate: String,
    },

    /// Show container metrics
    Metrics {
        /// Downsampling window (e.g. 30s, 5m, 1h)
        #[arg(long, default_value = "5m")]
        rate: String,

        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let client = client::ApiClient::new(&config.api_url(cli.api_url.as_deref()))?;
    let format = config.format(cli.format);

    match cli.command {
        Commands::Namespaces => {
            cluster::list_namespaces(&client, format).await?;
        }
        Commands::Namespace { name } => {
            cluster::show_namespace(&client, &name, format).await?;
        }
        Commands::Nodes => {
            cluster::list_nodes(&client, format).await?;
        }
        Commands::Workloads { kind, namespace } => {
            workloads::list_workloads(&client, kind, config.namespace(namespace), format).await?;
        }
        Commands::Workload {
            kind,
            namespace,
            name,
            rate,
        } => {
            workloads::show_workload(&client, &kind, &namespace, &name, &rate, format).await?;
        }
        Commands::Metrics { rate, namespace } => {
            metrics::show_metrics(&client, &rate, config.namespace(namespace), format).await?;
        }
    }

    Ok(())
}
