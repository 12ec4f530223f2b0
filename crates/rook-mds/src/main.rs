//! rook-mds - provisions the Ceph metadata server for a Rook cluster

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rook_common::k8s::{ADMIN_SECRET_KEY, MON_SECRET_NAME};
use rook_common::kube_utils::{create_client, get_secret_string};
use rook_common::retry::{retry_with_backoff, RetryConfig};
use rook_common::ClusterTopology;
use rook_mds::admin::{CephCliConnector, DEFAULT_COMMAND_TIMEOUT};
use rook_mds::client::MdsKubeClientImpl;
use rook_mds::config::{DEFAULT_NAMESPACE, MDS_DAEMON_ID};
use rook_mds::controller::require_membership;
use rook_mds::{ClusterController, DeploymentTarget, Identity, MdsError, WorkloadComposer};

/// Provision and reconcile the metadata server of a Rook storage cluster
#[derive(Parser, Debug)]
#[command(name = "rook-mds", version, about, long_about = None)]
struct Cli {
    /// Path to a kubeconfig (in-cluster config when unset)
    #[arg(long, env = "KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "ROOK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ensure the MDS keyring secret and deployment exist, then exit
    Start(StartArgs),
    /// Print the MDS deployment that `start` would create, without contacting anything
    Render(ClusterArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Where the MDS goes and which cluster it serves
#[derive(Args, Debug)]
struct ClusterArgs {
    /// Namespace for the MDS secret and deployment
    #[arg(long, env = "ROOK_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Daemon image tag
    #[arg(long, env = "ROOK_VERSION", default_value = "latest")]
    image_version: String,

    /// MDS replica count
    #[arg(long, default_value_t = 1)]
    replicas: i32,

    /// Storage cluster name
    #[arg(long, env = "ROOK_CLUSTER_NAME")]
    cluster_name: String,

    /// Monitor endpoints, comma separated, in order (e.g. 10.0.0.1:6789,10.0.0.2:6789)
    #[arg(long, env = "ROOK_MON_ENDPOINTS", default_value = "")]
    mon_endpoints: String,
}

impl ClusterArgs {
    fn target(&self) -> DeploymentTarget {
        DeploymentTarget::new(self.namespace.as_str(), self.image_version.as_str())
            .with_replicas(self.replicas)
    }

    fn topology(&self) -> ClusterTopology {
        ClusterTopology::from_endpoint_list(self.cluster_name.as_str(), &self.mon_endpoints)
    }
}

#[derive(Args, Debug)]
struct StartArgs {
    #[command(flatten)]
    cluster: ClusterArgs,

    /// `client.admin` key; read from the `mon` secret when unset
    #[arg(long, env = "ROOK_ADMIN_SECRET", hide_env_values = true)]
    admin_secret: Option<String>,

    /// `ceph` binary used for the admin session
    #[arg(long, env = "ROOK_CEPH_BIN", default_value = "ceph")]
    ceph_bin: PathBuf,

    /// Timeout in seconds for each `ceph` command
    #[arg(long, default_value_t = DEFAULT_COMMAND_TIMEOUT.as_secs())]
    command_timeout: u64,

    /// Attempts before giving up on transient failures (0 = keep trying)
    #[arg(long, default_value_t = 1)]
    max_attempts: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Start(args) => run_start(cli.kubeconfig, args).await,
        Commands::Render(args) => run_render(&args),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn run_start(kubeconfig: Option<PathBuf>, args: StartArgs) -> anyhow::Result<()> {
    let target = args.cluster.target();
    let topology = args.cluster.topology();
    require_membership(Some(&topology))?;

    let client = create_client(kubeconfig.as_deref()).await?;

    let admin_secret = match args.admin_secret {
        Some(secret) => secret,
        None => {
            get_secret_string(&client, &target.namespace, MON_SECRET_NAME, ADMIN_SECRET_KEY)
                .await?
        }
    };

    let connector = CephCliConnector::new(args.ceph_bin, admin_secret)
        .with_command_timeout(Duration::from_secs(args.command_timeout));
    let controller = ClusterController::new(
        Arc::new(MdsKubeClientImpl::new(client)),
        Arc::new(connector),
    );

    let report = retry_with_backoff(
        &RetryConfig::with_max_attempts(args.max_attempts),
        "mds_start",
        MdsError::is_retryable,
        || controller.start(&target, Some(&topology)),
    )
    .await?;

    info!(
        namespace = %target.namespace,
        cluster = %topology.name,
        keyring = ?report.keyring,
        deployment = ?report.deployment,
        "mds reconciled"
    );
    Ok(())
}

fn run_render(args: &ClusterArgs) -> anyhow::Result<()> {
    let topology = args.topology();
    require_membership(Some(&topology))?;

    let deployment =
        WorkloadComposer.build(&topology, &args.target(), &Identity::existing(MDS_DAEMON_ID));
    let yaml = serde_yaml::to_string(&deployment)
        .map_err(|e| anyhow::anyhow!("failed to serialize deployment: {}", e))?;
    print!("{yaml}");
    Ok(())
}
