//! Toolchain host operator

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use host_operator::config::{Configuration, OsEnv};
use host_operator::controller_runner::{
    build_cluster_controller, build_mur_controller, build_registration_controller,
};
use host_operator::startup::{
    ensure_crds_installed, print_crds, run_counter_publisher, synchronize_counter,
};
use toolchain_cluster::{ClusterContext, ClusterRegistry, MemberClusterCache};
use toolchain_common::kube_utils::create_client;
use toolchain_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use toolchain_common::HOST_OPERATOR_NAMESPACE;
use toolchain_counter::{AccountCounter, KubeCountsSource};
use toolchain_mur::MurContext;
use toolchain_registration::{
    create_or_update_resources, KubeRegistrationClient, RegistrationContext,
};

/// Provisions user accounts on member clusters from MasterUserRecords
#[derive(Parser, Debug)]
#[command(name = "host-operator", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// YAML file with host operator settings
    #[arg(long, env = "HOST_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Namespace the operator watches and writes to
    #[arg(long, env = "WATCH_NAMESPACE", default_value = HOST_OPERATOR_NAMESPACE)]
    namespace: String,

    /// Name of the host cluster as seen by member clusters
    #[arg(long, env = "HOST_CLUSTER_NAME", default_value = "host")]
    cluster_name: String,

    /// Kubeconfig of the host cluster, in-cluster config when omitted
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Log line format: json or pretty
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print!("{}", print_crds()?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        log_format: cli.log_format,
        ..Default::default()
    })?;

    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!(namespace = %cli.namespace, cluster = %cli.cluster_name, "host operator starting");

    let config = Configuration::load(cli.config.as_deref(), Arc::new(OsEnv))?;
    let client = create_client(cli.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {e}"))?;

    ensure_crds_installed(&client).await?;

    let counts_source = Arc::new(KubeCountsSource::new(client.clone(), &cli.namespace));
    let counter = Arc::new(AccountCounter::new());
    synchronize_counter(&counter, counts_source.as_ref()).await?;

    let registration_client = KubeRegistrationClient::new(client.clone());
    create_or_update_resources(
        &registration_client,
        &cli.namespace,
        config.registration_service_spec()?,
    )
    .await?;

    let registry = Arc::new(MemberClusterCache::new());
    let cluster_ctx = Arc::new(
        ClusterContext::new(client.clone(), Arc::clone(&registry), &cli.cluster_name)
            .with_health_interval(config.cluster_health_interval()?),
    );
    let mut mur_ctx = MurContext::new(
        client.clone(),
        Arc::clone(&registry) as Arc<dyn ClusterRegistry>,
        Arc::clone(&counter),
    );
    mur_ctx.provisioning_requeue = config.provisioning_requeue()?;
    let registration_ctx = Arc::new(RegistrationContext::new(client.clone())?);

    info!("starting controllers");
    let cluster_controller = build_cluster_controller(client.clone(), &cli.namespace, cluster_ctx);
    let mur_controller = build_mur_controller(client.clone(), &cli.namespace, Arc::new(mur_ctx));
    let registration_controller =
        build_registration_controller(client, &cli.namespace, registration_ctx);
    let publish_interval = config.counter_publish_interval()?;
    let publisher = run_counter_publisher(&counter, counts_source.as_ref(), publish_interval);

    tokio::select! {
        _ = cluster_controller => info!("ToolchainCluster controller completed"),
        _ = mur_controller => info!("MasterUserRecord controller completed"),
        _ = registration_controller => info!("RegistrationService controller completed"),
        _ = publisher => warn!("account counter publisher stopped"),
    }

    if let Err(e) = toolchain_counter::publish(&counter, counts_source.as_ref()).await {
        warn!(error = %e, "failed to publish account counts on shutdown");
    }
    info!("host operator shutting down");
    Ok(())
}
