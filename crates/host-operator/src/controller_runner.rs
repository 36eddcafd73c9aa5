//! Controller construction
//!
//! Each `build_*` function returns a boxed future running one controller
//! until the process receives a shutdown signal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tracing::info;

use toolchain_cluster::controller as cluster_ctrl;
use toolchain_cluster::ClusterContext;
use toolchain_common::crd::{MasterUserRecord, RegistrationService, ToolchainCluster};
use toolchain_mur::MurContext;
use toolchain_registration::RegistrationContext;

/// Watch timeout in seconds, below the client read timeout so idle watches
/// are closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A controller running until shutdown
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// ToolchainCluster controller keeping the member cluster registry current
pub fn build_cluster_controller(
    client: Client,
    namespace: &str,
    ctx: Arc<ClusterContext>,
) -> ControllerFuture {
    let clusters: Api<ToolchainCluster> = Api::namespaced(client, namespace);
    info!("- ToolchainCluster controller");
    Box::pin(
        Controller::new(clusters, watcher_config())
            .shutdown_on_signal()
            .run(cluster_ctrl::reconcile, cluster_ctrl::error_policy, ctx)
            .for_each(log_reconcile_result("ToolchainCluster")),
    )
}

/// MasterUserRecord controller provisioning UserAccounts
pub fn build_mur_controller(
    client: Client,
    namespace: &str,
    ctx: Arc<MurContext>,
) -> ControllerFuture {
    let records: Api<MasterUserRecord> = Api::namespaced(client, namespace);
    info!("- MasterUserRecord controller");
    Box::pin(
        Controller::new(records, watcher_config())
            .shutdown_on_signal()
            .run(toolchain_mur::reconcile, toolchain_mur::error_policy, ctx)
            .for_each(log_reconcile_result("MasterUserRecord")),
    )
}

/// RegistrationService controller, also woken by changes to its Deployment
pub fn build_registration_controller(
    client: Client,
    namespace: &str,
    ctx: Arc<RegistrationContext>,
) -> ControllerFuture {
    let services: Api<RegistrationService> = Api::namespaced(client.clone(), namespace);
    let deployments: Api<Deployment> = Api::namespaced(client, namespace);
    info!("- RegistrationService controller");
    Box::pin(
        Controller::new(services, watcher_config())
            .owns(deployments, watcher_config())
            .shutdown_on_signal()
            .run(
                toolchain_registration::reconcile,
                toolchain_registration::error_policy,
                ctx,
            )
            .for_each(log_reconcile_result("RegistrationService")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(object) => tracing::debug!(?object, "{} reconciliation completed", controller_name),
            Err(e) => tracing::warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
