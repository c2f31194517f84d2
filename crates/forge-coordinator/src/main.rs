//! cluster-forge: create and destroy managed OpenShift clusters
//!
//! Hosted-control-plane clusters get their network stack provisioned first;
//! any failure while creating rolls back everything created so far.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use forge_common::defaults::DEFAULT_INSTALL_DATA_DIR;
use forge_coordinator::config::{self, load_clusters_file};
use forge_coordinator::descriptor::{RawDescriptor, parse_cluster_arg};
use forge_coordinator::error::LifecycleError;
use forge_coordinator::orchestrator::{self, Action};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cluster-forge")]
#[command(about = "Create and destroy managed OpenShift clusters")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Options shared by create and destroy
#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Cluster descriptor, e.g. "name=c1;platform=hypershift;region=us-east-2;version=4.14"
    #[arg(long = "cluster")]
    clusters: Vec<String>,

    /// YAML file with a list of cluster descriptors
    #[arg(long)]
    clusters_file: Option<PathBuf>,

    /// OCM offline token
    #[arg(long, env = "OCM_TOKEN", hide_env_values = true)]
    ocm_token: Option<String>,

    /// Base directory for per-cluster install data
    #[arg(long, default_value = DEFAULT_INSTALL_DATA_DIR)]
    clusters_install_data_directory: PathBuf,

    /// Drive all clusters concurrently
    #[arg(long)]
    parallel: bool,

    /// GCP service account installed while GCP clusters are processed
    #[arg(long)]
    gcp_service_account_file: Option<PathBuf>,

    /// Print what would run without invoking any mutating tool
    #[arg(long)]
    dry_run: bool,

    /// Path to the rosa binary
    #[arg(long, default_value = "rosa")]
    rosa_bin: PathBuf,

    /// Path to the ocm binary
    #[arg(long, default_value = "ocm")]
    ocm_bin: PathBuf,

    /// Path to the oc binary
    #[arg(long, default_value = "oc")]
    oc_bin: PathBuf,

    /// Path to the terraform binary
    #[arg(long, default_value = "terraform")]
    terraform_bin: PathBuf,
}

/// Arguments for the create command
#[derive(clap::Args, Debug)]
struct CreateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Provisioning manifest template for hosted-control-plane network stacks
    #[arg(long)]
    vpc_manifest: Option<PathBuf>,

    /// JSON version catalog (queried from rosa when omitted)
    #[arg(long)]
    versions_file: Option<PathBuf>,
}

/// Arguments for the destroy command
#[derive(clap::Args, Debug)]
struct DestroyArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Record written by a previous create (`<install-dir>/cluster_data.yaml`)
    #[arg(long = "cluster-data-file")]
    cluster_data_files: Vec<PathBuf>,
}

impl CommonArgs {
    fn raw_descriptors(&self) -> Result<Vec<RawDescriptor>> {
        let mut raw = self
            .clusters
            .iter()
            .map(String::as_str)
            .map(parse_cluster_arg)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(path) = &self.clusters_file {
            raw.extend(load_clusters_file(path)?);
        }
        Ok(raw)
    }

    fn into_config(
        self,
        clusters: Vec<RawDescriptor>,
        vpc_manifest: Option<PathBuf>,
        versions_file: Option<PathBuf>,
        cluster_data_files: Vec<PathBuf>,
    ) -> config::RunConfig {
        config::RunConfig {
            ocm: config::OcmConfig {
                token: self.ocm_token,
                environment: Default::default(),
            },
            paths: config::PathsConfig {
                install_data_dir: self.clusters_install_data_directory,
                vpc_manifest,
                versions_file,
                gcp_service_account_file: self.gcp_service_account_file,
                cluster_data_files,
            },
            tools: config::ToolsConfig {
                rosa: self.rosa_bin,
                ocm: self.ocm_bin,
                oc: self.oc_bin,
                terraform: self.terraform_bin,
            },
            flags: config::RuntimeFlags {
                parallel: self.parallel,
                dry_run: self.dry_run,
            },
            clusters,
        }
    }
}

impl TryFrom<CreateArgs> for config::RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CreateArgs) -> Result<Self> {
        let clusters = args.common.raw_descriptors()?;
        Ok(args
            .common
            .into_config(clusters, args.vpc_manifest, args.versions_file, Vec::new()))
    }
}

impl TryFrom<DestroyArgs> for config::RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: DestroyArgs) -> Result<Self> {
        let clusters = args.common.raw_descriptors()?;
        Ok(args
            .common
            .into_config(clusters, None, None, args.cluster_data_files))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create clusters, rolling back on failure
    Create(Box<CreateArgs>),

    /// Destroy clusters and the infrastructure created for them
    Destroy(Box<DestroyArgs>),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print a failed run: the error chain, anything rollback left behind, and a hint
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "\n\x1b[1;31mcluster-forge failed:\x1b[0m {e}");
    for cause in e.chain().skip(1) {
        let _ = writeln!(stderr, "  \x1b[33mcause:\x1b[0m {cause}");
    }

    let Some(lifecycle) = LifecycleError::find_in(e) else {
        return;
    };
    if let LifecycleError::RolledBack {
        rollback_failures, ..
    } = lifecycle
    {
        for failure in rollback_failures {
            let _ = writeln!(stderr, "  \x1b[31mnot rolled back:\x1b[0m {failure}");
        }
    }
    if let Some(hint) = lifecycle.suggestion() {
        let _ = writeln!(stderr, "\n\x1b[36mhint:\x1b[0m {hint}");
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let (action, config): (Action, config::RunConfig) = match args.command {
        Command::Create(create_args) => (Action::Create, (*create_args).try_into()?),
        Command::Destroy(destroy_args) => (Action::Destroy, (*destroy_args).try_into()?),
    };

    info!(
        action = %action,
        clusters = config.clusters.len() + config.paths.cluster_data_files.len(),
        parallel = config.flags.parallel,
        dry_run = config.flags.dry_run,
        "Starting cluster-forge"
    );

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel_on_signal.cancel();
        }
    });

    if let Some(summary) = orchestrator::run_from_config(config, action, cancel).await? {
        println!("{}", summary.render());
        summary.into_result()?;
    }

    Ok(())
}
